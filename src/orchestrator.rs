//! Drives one authorization from fetch to cleanup: resolve the DNS
//! provider, publish the key-authorization TXT record, wait for propagation
//! (or operator confirmation), notify the server, poll, and always retract
//! the record afterwards.

use std::io;
use std::path::Path;

use anyhow::Result;
use log::{error, info, warn};

use crate::acme::types::{Challenge, Order};
use crate::acme::AcmeClient;
use crate::config::ProviderProperties;
use crate::dns::propagation::PropagationCheck;
use crate::dns::DnsLookup;
use crate::providers::{ProviderRegistry, DEFAULT_PROVIDER};

/// Suspension point for the manual DNS propagation path. The binary blocks
/// on the terminal; non-interactive callers inject their own confirmation.
pub trait ConfirmationGate {
    fn wait_for_confirmation(&self);
}

/// Blocks until ENTER is pressed, giving time for manual DNS propagation.
pub struct StdinGate;

impl ConfirmationGate for StdinGate {
    fn wait_for_confirmation(&self) {
        println!("Press ENTER to continue ...");
        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_err() {
            warn!("[challenge] could not read confirmation from stdin; continuing");
        }
    }
}

pub struct ChallengeOrchestrator<'a> {
    acme: &'a AcmeClient,
    registry: &'a ProviderRegistry,
    dns: &'a dyn DnsLookup,
    gate: &'a dyn ConfirmationGate,
    config_dir: &'a Path,
}

impl<'a> ChallengeOrchestrator<'a> {
    pub fn new(
        acme: &'a AcmeClient,
        registry: &'a ProviderRegistry,
        dns: &'a dyn DnsLookup,
        gate: &'a dyn ConfirmationGate,
        config_dir: &'a Path,
    ) -> Self {
        Self {
            acme,
            registry,
            dns,
            gate,
            config_dir,
        }
    }

    /// Resolve every authorization of the order, strictly sequentially.
    pub fn authorize_order(&self, order: &Order) -> Result<()> {
        for authorization_url in &order.authorizations {
            info!("[challenge] resolving authorization: {authorization_url}");
            self.authorize(authorization_url)?;
        }
        Ok(())
    }

    fn authorize(&self, authorization_url: &str) -> Result<()> {
        let authorization = self.acme.authorization(authorization_url)?;
        let identifier = &authorization.identifier.value;
        info!("[challenge] authorizing identifier: {identifier}");

        let fqdn = format!("_acme-challenge.{identifier}");
        let challenge = self.acme.dns_challenge(&authorization)?;
        let txt = self.acme.key_authorization_txt(&challenge.token)?;

        // when no provider is configured the manual default is used; CLI
        // validation guarantees a configured name is registered and is not
        // the default itself
        let configured = self
            .acme
            .session()
            .provider
            .as_deref()
            .filter(|name| !name.is_empty());
        let provider_name = configured.unwrap_or(DEFAULT_PROVIDER);
        let properties = match configured {
            Some(name) => ProviderProperties::load(self.config_dir, name)?,
            None => ProviderProperties::default(),
        };
        let mut provider = self.registry.create(provider_name, &properties)?;

        let published = provider.add_txt_record(&fqdn, &txt)?;

        // the propagation check only makes sense when a real provider
        // actually published the record and the caller opted into auto mode
        if configured.is_some() && self.acme.session().auto_mode && published {
            let in_sync = PropagationCheck::new(self.dns).wait_until_in_sync(&fqdn, &txt);
            if !in_sync {
                warn!("[challenge] name servers never agreed on {fqdn}; proceeding anyway");
            }
        } else {
            self.gate.wait_for_confirmation();
        }

        let outcome = self.notify_and_poll(challenge);

        if published {
            match provider.delete_txt_record() {
                Ok(removed) => {
                    if !removed {
                        warn!("[challenge] TXT record for {fqdn} was not removed");
                    }
                }
                Err(err) => warn!("[challenge] failed to retract TXT record for {fqdn}: {err:#}"),
            }
        }

        outcome
    }

    fn notify_and_poll(&self, challenge: &Challenge) -> Result<()> {
        let result = self
            .acme
            .notify_challenge_ready(&challenge.url)
            .and_then(|()| self.acme.poll_challenge(challenge));
        if let Err(err) = &result {
            error!("[challenge] authorization failed: {err}");
        }
        result.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingGate {
        confirmations: Cell<u32>,
    }

    impl ConfirmationGate for CountingGate {
        fn wait_for_confirmation(&self) {
            self.confirmations.set(self.confirmations.get() + 1);
        }
    }

    #[test]
    fn confirmation_gate_is_injectable() {
        let gate = CountingGate {
            confirmations: Cell::new(0),
        };
        let dyn_gate: &dyn ConfirmationGate = &gate;
        dyn_gate.wait_for_confirmation();
        dyn_gate.wait_for_confirmation();
        assert_eq!(gate.confirmations.get(), 2);
    }
}
