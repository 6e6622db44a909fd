//! Cross-step state shared over a single issuance run.

use crate::acme::types::Directory;
use crate::cli::Environment;
use crate::identity::{AccountIdentity, DomainsIdentity, JsonWebKey};

/// Everything the protocol steps exchange: the identities created at
/// bootstrap plus the artifacts each step produces. Created once per run,
/// mutated only by the single active flow, discarded at process exit.
pub struct Session {
    pub account: AccountIdentity,
    pub domains: DomainsIdentity,
    pub environment: Environment,
    /// Configured DNS provider name; `None` selects the manual default.
    pub provider: Option<String>,
    pub auto_mode: bool,
    pub jwk: Option<JsonWebKey>,
    /// Account key id, reported by the server in the new-account Location
    /// header and used as the `kid` of every later signed request.
    pub kid: Option<String>,
    pub directory: Option<Directory>,
    pub csr: Option<Vec<u8>>,
    pub certificate: Option<Vec<u8>>,
}

impl Session {
    pub fn new(
        account: AccountIdentity,
        domains: DomainsIdentity,
        environment: Environment,
        provider: Option<String>,
        auto_mode: bool,
    ) -> Self {
        Self {
            account,
            domains,
            environment,
            provider,
            auto_mode,
            jwk: None,
            kid: None,
            directory: None,
            csr: None,
            certificate: None,
        }
    }
}
