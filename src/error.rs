use thiserror::Error;

/// Fatal conditions that abort an issuance run.
///
/// Poll exhaustion and propagation-check timeouts are deliberately not
/// represented here: both are non-fatal and surface as log warnings only.
#[derive(Debug, Error)]
pub enum IssuanceError {
    /// The server could not be reached or the response body could not be read.
    #[error("connection error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The server rejected a request. Carries the problem detail text when
    /// the response included one, otherwise the raw HTTP status.
    #[error("ACME server error: {0}")]
    Protocol(String),

    /// An account, order, authorization or challenge reported an `invalid`
    /// status.
    #[error("{resource} status is invalid")]
    InvalidStatus { resource: &'static str },

    /// The server requires a capability this client does not implement.
    #[error("{0}")]
    Unsupported(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}
