use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};

use crate::providers::{ProviderRegistry, DEFAULT_PROVIDER};

#[derive(Debug, Parser)]
#[command(name = "certfetch", about = "ACME DNS-01 certificate issuance", version)]
pub struct Arguments {
    /// Contact email addresses for the ACME account
    #[arg(short, long, required = true, num_args = 1..)]
    pub contacts: Vec<String>,

    /// Domain names to certify; the first becomes the certificate subject
    #[arg(short, long, required = true, num_args = 1..)]
    pub domains: Vec<String>,

    /// ACME environment to issue against
    #[arg(short, long, value_enum)]
    pub environment: Environment,

    /// DNS validation provider; omit to publish the TXT record by hand
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Wait for DNS propagation automatically instead of pausing for input
    #[arg(long)]
    pub auto: bool,

    /// Directory holding the <provider>.json configuration files
    #[arg(long, default_value = "conf")]
    pub config_dir: PathBuf,

    /// Directory the keys, CSR and certificate are written to
    #[arg(long, default_value = "data")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Production,
    Staging,
}

impl Environment {
    pub fn directory_url(&self) -> &'static str {
        match self {
            Environment::Production => "https://acme-v02.api.letsencrypt.org/directory",
            Environment::Staging => "https://acme-staging-v02.api.letsencrypt.org/directory",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
        }
    }
}

/// Validate what clap cannot: contact shape, domain names, provider names.
pub fn validate(args: &Arguments, registry: &ProviderRegistry) -> Result<()> {
    for contact in &args.contacts {
        if !looks_like_email(contact) {
            bail!("invalid contact address '{contact}'");
        }
    }
    for domain in &args.domains {
        validate_domain(domain)?;
    }
    if let Some(provider) = args.provider.as_deref() {
        if provider == DEFAULT_PROVIDER {
            bail!("'{provider}' is the built-in manual provider; omit --provider to use it");
        }
        if !registry.contains(provider) {
            bail!(
                "unknown DNS provider '{provider}'; registered providers: {}",
                registry.names().join(", ")
            );
        }
    }
    Ok(())
}

fn looks_like_email(contact: &str) -> bool {
    match contact.split_once('@') {
        Some((local, host)) => !local.is_empty() && host.contains('.') && !host.ends_with('.'),
        None => false,
    }
}

fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() || domain.starts_with('.') || domain.ends_with('.') {
        bail!("invalid domain name '{domain}'");
    }
    if let Err(err) = idna::domain_to_ascii(domain) {
        bail!("invalid domain name '{domain}': {err}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(contacts: &[&str], domains: &[&str], provider: Option<&str>) -> Arguments {
        Arguments {
            contacts: contacts.iter().map(|s| s.to_string()).collect(),
            domains: domains.iter().map(|s| s.to_string()).collect(),
            environment: Environment::Staging,
            provider: provider.map(str::to_string),
            auto: false,
            config_dir: PathBuf::from("conf"),
            output_dir: PathBuf::from("data"),
        }
    }

    #[test]
    fn accepts_plain_arguments() {
        let registry = ProviderRegistry::with_builtins();
        let args = args(&["admin@example.com"], &["example.com", "www.example.com"], None);
        assert!(validate(&args, &registry).is_ok());
    }

    #[test]
    fn accepts_registered_provider() {
        let registry = ProviderRegistry::with_builtins();
        let args = args(&["admin@example.com"], &["example.com"], Some("desec"));
        assert!(validate(&args, &registry).is_ok());
    }

    #[test]
    fn rejects_bad_contact() {
        let registry = ProviderRegistry::with_builtins();
        for contact in ["not-an-address", "@example.com", "user@tld."] {
            let args = args(&[contact], &["example.com"], None);
            assert!(validate(&args, &registry).is_err(), "accepted {contact}");
        }
    }

    #[test]
    fn rejects_bad_domain() {
        let registry = ProviderRegistry::with_builtins();
        for domain in ["", ".example.com", "example.com."] {
            let args = args(&["admin@example.com"], &[domain], None);
            assert!(validate(&args, &registry).is_err(), "accepted '{domain}'");
        }
    }

    #[test]
    fn accepts_idn_domain() {
        let registry = ProviderRegistry::with_builtins();
        let args = args(&["admin@example.com"], &["bücher.example"], None);
        assert!(validate(&args, &registry).is_ok());
    }

    #[test]
    fn rejects_unknown_or_default_provider() {
        let registry = ProviderRegistry::with_builtins();
        let unknown = args(&["admin@example.com"], &["example.com"], Some("no-such"));
        assert!(validate(&unknown, &registry).is_err());

        let default = args(&["admin@example.com"], &["example.com"], Some(DEFAULT_PROVIDER));
        assert!(validate(&default, &registry).is_err());
    }

    #[test]
    fn environment_directory_urls() {
        assert!(Environment::Production
            .directory_url()
            .starts_with("https://acme-v02"));
        assert!(Environment::Staging
            .directory_url()
            .starts_with("https://acme-staging-v02"));
        assert_eq!(Environment::Staging.name(), "staging");
    }
}
