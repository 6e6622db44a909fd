//! The end-to-end issuance flow: bootstrap identities and the ACME client,
//! then drive account → order → authorizations → CSR → finalize → poll →
//! certificate download → persistence.

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

use crate::acme::AcmeClient;
use crate::cli::Arguments;
use crate::csr::build_csr;
use crate::dns::SystemDns;
use crate::identity::{AccountIdentity, DomainsIdentity};
use crate::orchestrator::{ChallengeOrchestrator, ConfirmationGate, StdinGate};
use crate::providers::ProviderRegistry;
use crate::session::Session;
use crate::storage::PemStorage;

pub struct IssuanceFlow {
    acme: AcmeClient,
    registry: ProviderRegistry,
    dns: SystemDns,
    gate: Box<dyn ConfirmationGate>,
    storage: Option<PemStorage>,
    config_dir: PathBuf,
}

impl IssuanceFlow {
    /// Generate both key pairs, assemble the session and bootstrap the ACME
    /// client against the selected environment.
    pub fn bootstrap(args: &Arguments, registry: ProviderRegistry) -> Result<Self> {
        info!("Generating account keys ...");
        let account = AccountIdentity::generate(args.contacts.clone())?;
        info!("Generating domain keys ...");
        let domains = DomainsIdentity::generate(args.domains.clone())?;
        info!("Done.");

        let session = Session::new(
            account,
            domains,
            args.environment,
            args.provider.clone(),
            args.auto,
        );
        let acme = AcmeClient::bootstrap(session)?;

        Ok(Self {
            acme,
            registry,
            dns: SystemDns::new()?,
            gate: Box::new(StdinGate),
            storage: None,
            config_dir: args.config_dir.clone(),
        })
    }

    pub fn attach_storage(&mut self, storage: PemStorage) {
        self.storage = Some(storage);
    }

    pub fn set_confirmation_gate(&mut self, gate: Box<dyn ConfirmationGate>) {
        self.gate = gate;
    }

    /// Request a new certificate from the configured environment and hand
    /// the results to the persistence collaborator.
    pub fn request_certificate(&mut self) -> Result<()> {
        if self.acme.session().account.is_external() {
            self.acme.return_existing_account()?;
        } else {
            self.acme.create_account()?;
        }

        let order = self.acme.create_order()?;

        let orchestrator = ChallengeOrchestrator::new(
            &self.acme,
            &self.registry,
            &self.dns,
            self.gate.as_ref(),
            &self.config_dir,
        );
        orchestrator.authorize_order(&order)?;

        let csr = build_csr(&self.acme.session().domains)
            .context("creating the certificate signing request")?;
        self.acme.session_mut().csr = Some(csr);

        self.acme.finalize_order(&order)?;
        self.acme.poll_finalized_order(&order)?;

        let order = self.acme.order_from_url(&order.url)?;
        self.acme.certificate(&order)?;

        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        info!("Persisting data ...");
        storage.persist(self.acme.session())?;
        info!("Done.");
        Ok(())
    }
}
