//! PKCS#10 certificate signing request for the domain identity.

use anyhow::{bail, Context, Result};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::stack::Stack;
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509NameBuilder, X509ReqBuilder};

use crate::identity::DomainsIdentity;

/// Build a DER-encoded CSR: the first domain (IDN-normalized) is the
/// subject common name, every domain becomes a subject alternative name.
/// Signed with the domain key using SHA-256.
pub fn build_csr(identity: &DomainsIdentity) -> Result<Vec<u8>> {
    let domains = identity.domains();
    let Some(primary) = domains.first() else {
        bail!("at least one domain must be specified");
    };
    let common_name = idna::domain_to_ascii(primary)
        .map_err(|err| anyhow::anyhow!("invalid primary domain '{primary}': {err}"))?;

    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COMMONNAME, &common_name)?;
    let name = name.build();

    let mut builder = X509ReqBuilder::new()?;
    builder.set_subject_name(&name)?;
    builder.set_pubkey(identity.key())?;

    let mut san = SubjectAlternativeName::new();
    for domain in domains {
        san.dns(domain);
    }
    let san = san.build(&builder.x509v3_context(None))?;
    let mut extensions = Stack::new()?;
    extensions.push(san)?;
    builder.add_extensions(&extensions)?;

    builder.sign(identity.key(), MessageDigest::sha256())?;
    builder
        .build()
        .to_der()
        .context("encoding the certificate signing request")
}
