//! The TXT-record-provider capability: a polymorphic publish/retract
//! interface plus an explicit name-to-factory registry populated at
//! startup.

use std::collections::HashMap;

use anyhow::{anyhow, Result};

use crate::config::ProviderProperties;

mod desec;
mod zoneee;

pub use desec::DesecProvider;
pub use zoneee::ZoneEeProvider;

/// Name under which the built-in manual provider is registered.
pub const DEFAULT_PROVIDER: &str = "default";

pub trait DnsTxtProvider {
    /// Publish `value` as a TXT record for `fqdn`. Returns true only when a
    /// record was actually created on a DNS service; the manual provider
    /// reports false so the caller pauses for out-of-band propagation.
    fn add_txt_record(&mut self, fqdn: &str, value: &str) -> Result<bool>;

    /// Retract the record published by the last successful
    /// [`add_txt_record`](Self::add_txt_record). Returns true when a record
    /// was removed.
    fn delete_txt_record(&mut self) -> Result<bool>;
}

/// Fallback provider: prints the record the operator must publish by hand.
pub struct ManualProvider;

impl DnsTxtProvider for ManualProvider {
    fn add_txt_record(&mut self, fqdn: &str, value: &str) -> Result<bool> {
        println!("Please update your DNS records with the following data:");
        println!("\tDOMAIN: {fqdn}");
        println!("\tTXT record: {value}");
        println!();
        Ok(false)
    }

    fn delete_txt_record(&mut self) -> Result<bool> {
        println!("Nothing to clean up!");
        Ok(false)
    }
}

pub type ProviderFactory = fn(&ProviderProperties) -> Result<Box<dyn DnsTxtProvider>>;

/// Explicit provider registry, replacing any runtime plugin discovery: the
/// built-in providers are registered at startup and looked up by name.
pub struct ProviderRegistry {
    factories: HashMap<&'static str, ProviderFactory>,
}

impl ProviderRegistry {
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register(DEFAULT_PROVIDER, |_| Ok(Box::new(ManualProvider)));
        registry.register("desec", |properties| {
            Ok(Box::new(DesecProvider::new(properties)?))
        });
        registry.register("zoneee", |properties| {
            Ok(Box::new(ZoneEeProvider::new(properties)?))
        });
        registry
    }

    pub fn register(&mut self, name: &'static str, factory: ProviderFactory) {
        self.factories.insert(name, factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn create(
        &self,
        name: &str,
        properties: &ProviderProperties,
    ) -> Result<Box<dyn DnsTxtProvider>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow!("no DNS provider registered under '{name}'"))?;
        factory(properties)
    }
}
