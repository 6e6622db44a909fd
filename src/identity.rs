use anyhow::{Context, Result};
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use serde::Serialize;

const ACCOUNT_KEY_BITS: u32 = 2048;
const DOMAIN_KEY_BITS: u32 = 4096;

/// The RSA public key in JSON Web Key form, used both in signed-request
/// headers and as the key-authorization thumbprint input.
///
/// Field order is the thumbprint input order; serde serializes struct fields
/// in declaration order. Do not reorder.
#[derive(Debug, Clone, Serialize)]
pub struct JsonWebKey {
    pub e: String,
    pub kty: String,
    pub n: String,
}

/// The ACME account: an RSA-2048 key pair plus the contact addresses
/// registered with it. Immutable after construction.
pub struct AccountIdentity {
    key: PKey<Private>,
    contacts: Vec<String>,
    external: bool,
}

impl AccountIdentity {
    pub fn generate(contacts: Vec<String>) -> Result<Self> {
        Ok(Self {
            key: generate_rsa_key(ACCOUNT_KEY_BITS)?,
            contacts,
            external: false,
        })
    }

    /// Wrap a key pair supplied from the outside (an already registered
    /// account) instead of generating a fresh one.
    pub fn from_key(contacts: Vec<String>, key: PKey<Private>) -> Self {
        Self {
            key,
            contacts,
            external: true,
        }
    }

    pub fn key(&self) -> &PKey<Private> {
        &self.key
    }

    pub fn contacts(&self) -> &[String] {
        &self.contacts
    }

    /// Contacts as `mailto:` URLs, the form the new-account payload expects.
    pub fn formatted_contacts(&self) -> Vec<String> {
        self.contacts
            .iter()
            .map(|contact| format!("mailto:{contact}"))
            .collect()
    }

    pub fn is_external(&self) -> bool {
        self.external
    }

    pub fn jwk(&self) -> Result<JsonWebKey> {
        let rsa = self
            .key
            .rsa()
            .context("account key is not an RSA key pair")?;
        // BigNum::to_vec yields minimal big-endian bytes, so leading zeros
        // are already stripped.
        Ok(JsonWebKey {
            e: crate::acme::jws::base64url(rsa.e().to_vec()),
            kty: "RSA".to_string(),
            n: crate::acme::jws::base64url(rsa.n().to_vec()),
        })
    }
}

/// The certificate subject: an RSA-4096 key pair and the ordered domain
/// list. The first domain becomes the subject common name, every domain
/// becomes a subject alternative name.
pub struct DomainsIdentity {
    key: PKey<Private>,
    domains: Vec<String>,
}

impl DomainsIdentity {
    pub fn generate(domains: Vec<String>) -> Result<Self> {
        Ok(Self {
            key: generate_rsa_key(DOMAIN_KEY_BITS)?,
            domains,
        })
    }

    pub fn key(&self) -> &PKey<Private> {
        &self.key
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn primary(&self) -> Option<&str> {
        self.domains.first().map(String::as_str)
    }
}

fn generate_rsa_key(bits: u32) -> Result<PKey<Private>> {
    let rsa = Rsa::generate(bits).context("generating RSA key pair")?;
    PKey::from_rsa(rsa).context("wrapping RSA key pair")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwk_preserves_field_order() {
        let identity = AccountIdentity::generate(vec!["admin@example.com".into()]).unwrap();
        let jwk = identity.jwk().unwrap();
        let json = serde_json::to_string(&jwk).unwrap();
        let e_pos = json.find("\"e\"").unwrap();
        let kty_pos = json.find("\"kty\"").unwrap();
        let n_pos = json.find("\"n\"").unwrap();
        assert!(e_pos < kty_pos && kty_pos < n_pos, "JWK field order changed: {json}");
        assert!(json.contains("\"kty\":\"RSA\""));
    }

    #[test]
    fn formatted_contacts_use_mailto() {
        let identity = AccountIdentity::generate(vec![
            "admin@example.com".into(),
            "ops@example.com".into(),
        ])
        .unwrap();
        assert_eq!(
            identity.formatted_contacts(),
            vec!["mailto:admin@example.com", "mailto:ops@example.com"]
        );
    }

    #[test]
    fn generated_identity_is_not_external() {
        let identity = AccountIdentity::generate(vec!["admin@example.com".into()]).unwrap();
        assert!(!identity.is_external());

        let key = generate_rsa_key(2048).unwrap();
        let external = AccountIdentity::from_key(vec!["admin@example.com".into()], key);
        assert!(external.is_external());
    }
}
