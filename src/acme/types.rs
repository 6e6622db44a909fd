//! Wire types for the ACME protocol (RFC 8555), deserialized with serde.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const STATUS_VALID: &str = "valid";
pub const STATUS_INVALID: &str = "invalid";

pub const CHALLENGE_TYPE_DNS01: &str = "dns-01";

/// Resource locations advertised by the ACME server. Fetched once during
/// bootstrap, immutable afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    pub new_nonce: String,
    pub new_account: String,
    pub new_order: String,
    #[serde(default)]
    pub revoke_cert: Option<String>,
    #[serde(default)]
    pub key_change: Option<String>,
    #[serde(default)]
    pub meta: DirectoryMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryMeta {
    #[serde(default)]
    pub terms_of_service: Option<String>,
    #[serde(default)]
    pub external_account_required: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccountRequest {
    pub terms_of_service_agreed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contact: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub only_return_existing: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub contact: Vec<String>,
    /// URL of the account's orders collection.
    #[serde(default)]
    pub orders: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl Identifier {
    pub fn dns(value: impl Into<String>) -> Self {
        Self {
            kind: "dns".to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NewOrderRequest {
    pub identifiers: Vec<Identifier>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub expires: Option<String>,
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    #[serde(default)]
    pub authorizations: Vec<String>,
    pub finalize: String,
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default)]
    pub error: Option<ProblemDetail>,
    /// Not part of the wire body; the server only reports it in the
    /// Location header, so it is reattached manually after every fetch.
    #[serde(skip)]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Authorization {
    pub identifier: Identifier,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Challenge {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub error: Option<ProblemDetail>,
}

#[derive(Debug, Serialize)]
pub struct FinalizeRequest {
    pub csr: String,
}

/// Structured server error (RFC 7807), used both as a terminal condition
/// and as the human-readable error message.
#[derive(Debug, Clone, Deserialize)]
pub struct ProblemDetail {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
}

impl fmt::Display for ProblemDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(kind) = &self.kind {
            parts.push(kind.clone());
        }
        if let Some(title) = &self.title {
            parts.push(title.clone());
        }
        if let Some(detail) = &self.detail {
            parts.push(detail.clone());
        }
        if parts.is_empty() {
            match self.status {
                Some(status) => write!(f, "server problem (status {status})"),
                None => write!(f, "server problem"),
            }
        } else {
            write!(f, "{}", parts.join(": "))
        }
    }
}
