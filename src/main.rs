use clap::Parser;
use env_logger::Env;
use log::error;

use certfetch::cli::{self, Arguments};
use certfetch::flow::IssuanceFlow;
use certfetch::providers::ProviderRegistry;
use certfetch::storage::PemStorage;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let args = Arguments::parse();
    if let Err(err) = run(&args) {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(args: &Arguments) -> anyhow::Result<()> {
    let registry = ProviderRegistry::with_builtins();
    cli::validate(args, &registry)?;

    let mut flow = IssuanceFlow::bootstrap(args, registry)?;
    flow.attach_storage(PemStorage::new(&args.output_dir));
    flow.request_certificate()
}
