//! PEM export of the artifacts a successful run produces: account key,
//! domain key, CSR and certificate, laid out per environment and primary
//! domain.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{TimeZone, Utc};
use log::{info, warn};
use openssl::x509::X509Req;
use sha2::{Digest, Sha256};
use x509_parser::pem::parse_x509_pem;

use crate::session::Session;

pub struct PemStorage {
    root: PathBuf,
}

impl PemStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write everything the session accumulated to
    /// `<root>/<environment>/<primary-domain>/`.
    pub fn persist(&self, session: &Session) -> Result<()> {
        let Some(primary) = session.domains.primary() else {
            bail!("session carries no domains");
        };
        let dir = self.root.join(session.environment.name()).join(primary);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;

        let account_key = session
            .account
            .key()
            .private_key_to_pem_pkcs8()
            .context("encoding account key")?;
        std::fs::write(dir.join("account-key.pem"), account_key)?;

        let domain_key = session
            .domains
            .key()
            .private_key_to_pem_pkcs8()
            .context("encoding domain key")?;
        std::fs::write(dir.join("domain-key.pem"), domain_key)?;

        if let Some(csr) = &session.csr {
            let pem = X509Req::from_der(csr)
                .context("re-reading generated CSR")?
                .to_pem()
                .context("encoding CSR")?;
            std::fs::write(dir.join("domain.csr"), pem)?;
        }

        if let Some(certificate) = &session.certificate {
            std::fs::write(dir.join("certificate.pem"), certificate)?;
            log_certificate_summary(certificate);
        }

        info!("[storage] wrote issuance artifacts to {}", dir.display());
        Ok(())
    }
}

fn log_certificate_summary(certificate: &[u8]) {
    let pem_block = match parse_x509_pem(certificate) {
        Ok((_, pem_block)) => pem_block,
        Err(err) => {
            warn!("[storage] issued certificate is not valid PEM: {err}");
            return;
        }
    };
    match pem_block.parse_x509() {
        Ok(cert) => {
            let not_after = Utc
                .timestamp_opt(cert.validity().not_after.timestamp(), 0)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            let fingerprint = {
                let mut hasher = Sha256::new();
                hasher.update(&pem_block.contents);
                hex::encode(hasher.finalize())
            };
            info!(
                "[storage] certificate serial {}, expires {}, sha256 {}",
                cert.raw_serial_as_string(),
                not_after,
                fingerprint
            );
        }
        Err(err) => warn!("[storage] could not parse issued certificate: {err}"),
    }
}
