//! ACME protocol client: directory discovery, account and order management,
//! challenge retrieval, finalization, bounded-retry polling and certificate
//! download. Every signed request fetches a fresh single-use nonce first.

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::blocking::Response;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use sha2::{Digest, Sha256};

use crate::error::IssuanceError;
use crate::http::HttpClient;
use crate::identity::JsonWebKey;
use crate::session::Session;

pub mod jws;
pub mod types;

use jws::{base64url, AccountKey};
use types::{
    Account, Authorization, Challenge, Directory, FinalizeRequest, Identifier, NewAccountRequest,
    NewOrderRequest, Order, ProblemDetail, CHALLENGE_TYPE_DNS01, STATUS_INVALID, STATUS_VALID,
};

const HEADER_REPLAY_NONCE: &str = "replay-nonce";
const MEDIA_TYPE_JOSE_JSON: &str = "application/jose+json";
const MEDIA_TYPE_PROBLEM_JSON: &str = "application/problem+json";

/// Bounded-retry schedule for the challenge and finalized-order polls.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_retries: 20,
            delay: Duration::from_millis(3000),
        }
    }
}

pub struct AcmeClient {
    session: Session,
    poll: PollSettings,
}

impl AcmeClient {
    /// Compute the JWK from the account key, fetch the server directory and
    /// refuse to continue when the server mandates external account binding.
    pub fn bootstrap(mut session: Session) -> Result<Self, IssuanceError> {
        let jwk = session
            .account
            .jwk()
            .map_err(|err| IssuanceError::Protocol(err.to_string()))?;
        session.jwk = Some(jwk);

        let url = session.environment.directory_url();
        info!("[acme] fetching directory from {url}");
        let response = check(
            HttpClient::shared()
                .get(url)
                .send()
                .map_err(IssuanceError::Transport)?,
        )?;
        let directory: Directory = serde_json::from_str(&body(response)?)?;
        if directory.meta.external_account_required {
            return Err(IssuanceError::Unsupported(
                "external account required but support not implemented".to_string(),
            ));
        }
        session.directory = Some(directory);

        Ok(Self {
            session,
            poll: PollSettings::default(),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn set_poll_settings(&mut self, poll: PollSettings) {
        self.poll = poll;
    }

    fn directory(&self) -> Result<&Directory, IssuanceError> {
        self.session
            .directory
            .as_ref()
            .ok_or_else(|| IssuanceError::Protocol("directory not fetched".to_string()))
    }

    fn jwk(&self) -> Result<&JsonWebKey, IssuanceError> {
        self.session
            .jwk
            .as_ref()
            .ok_or_else(|| IssuanceError::Protocol("account JWK not computed".to_string()))
    }

    /// Fetch a fresh single-use nonce from the server. The directory
    /// response's nonce does not satisfy subsequent signed requests.
    pub fn new_nonce(&self) -> Result<String, IssuanceError> {
        let url = &self.directory()?.new_nonce;
        let response = check(
            HttpClient::shared()
                .head(url)
                .send()
                .map_err(IssuanceError::Transport)?,
        )?;
        response
            .headers()
            .get(HEADER_REPLAY_NONCE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                IssuanceError::Protocol("server response is missing the Replay-Nonce header".into())
            })
    }

    pub fn create_account(&mut self) -> Result<Account, IssuanceError> {
        info!("[acme] creating new account ...");
        self.create_or_lookup_account(false)
    }

    pub fn return_existing_account(&mut self) -> Result<Account, IssuanceError> {
        info!("[acme] returning existing account ...");
        self.create_or_lookup_account(true)
    }

    fn create_or_lookup_account(&mut self, only_existing: bool) -> Result<Account, IssuanceError> {
        let request = NewAccountRequest {
            terms_of_service_agreed: true,
            contact: if only_existing {
                Vec::new()
            } else {
                self.session.account.formatted_contacts()
            },
            only_return_existing: only_existing,
        };
        let url = self.directory()?.new_account.clone();
        let response = self.post_signed(&url, &serde_json::to_string(&request)?)?;
        let kid = location(&response)?;
        let account: Account = serde_json::from_str(&body(response)?)?;
        ensure_not_invalid("account", &account.status)?;
        info!("[acme] account created or returned: {kid}");
        self.session.kid = Some(kid);
        Ok(account)
    }

    /// Open an order covering one DNS identifier per configured domain. The
    /// order URL comes from the Location header, not the body.
    pub fn create_order(&self) -> Result<Order, IssuanceError> {
        info!("[acme] creating new order ...");
        let identifiers = self
            .session
            .domains
            .domains()
            .iter()
            .map(Identifier::dns)
            .collect();
        let request = NewOrderRequest { identifiers };
        let url = self.directory()?.new_order.clone();
        let response = self.post_signed(&url, &serde_json::to_string(&request)?)?;
        let order_url = location(&response)?;
        let mut order: Order = serde_json::from_str(&body(response)?)?;
        order.url = order_url;
        ensure_not_invalid("order", &order.status)?;
        info!("[acme] order created: {}", order.url);
        Ok(order)
    }

    pub fn order_from_url(&self, url: &str) -> Result<Order, IssuanceError> {
        let response = self.post_as_get(url)?;
        let mut order: Order = serde_json::from_str(&body(response)?)?;
        ensure_not_invalid("order", &order.status)?;
        order.url = url.to_string();
        Ok(order)
    }

    pub fn authorization(&self, url: &str) -> Result<Authorization, IssuanceError> {
        let response = self.post_as_get(url)?;
        Ok(serde_json::from_str(&body(response)?)?)
    }

    pub fn challenge_from_url(&self, url: &str) -> Result<Challenge, IssuanceError> {
        let response = self.post_as_get(url)?;
        Ok(serde_json::from_str(&body(response)?)?)
    }

    /// Select the `dns-01` challenge of an authorization. Other challenge
    /// types are not supported.
    pub fn dns_challenge<'a>(
        &self,
        authorization: &'a Authorization,
    ) -> Result<&'a Challenge, IssuanceError> {
        authorization
            .challenges
            .iter()
            .find(|challenge| challenge.kind == CHALLENGE_TYPE_DNS01)
            .ok_or_else(|| {
                IssuanceError::Unsupported("only DNS validation is supported".to_string())
            })
    }

    /// Compute the TXT value to publish for a challenge token:
    /// `base64url(sha256(token + "." + base64url(sha256(JWK-JSON))))`.
    pub fn key_authorization_txt(&self, token: &str) -> Result<String, IssuanceError> {
        debug!("[acme] token: {token}");
        let jwk_json = serde_json::to_string(self.jwk()?)?;
        let thumbprint = base64url(Sha256::digest(jwk_json.as_bytes()));
        debug!("[acme] thumbprint: {thumbprint}");

        let key_authorization = format!("{token}.{thumbprint}");
        let txt = base64url(Sha256::digest(key_authorization.as_bytes()));
        info!("[acme] DNS TXT record value: {txt}");
        Ok(txt)
    }

    /// Tell the server the challenge is ready to be validated.
    pub fn notify_challenge_ready(&self, challenge_url: &str) -> Result<(), IssuanceError> {
        info!("[acme] sending challenge completed notification ...");
        self.post_signed(challenge_url, "{}")?;
        Ok(())
    }

    /// Poll the challenge until it turns `valid`, the server reports an
    /// error, or the retry budget runs out (a warning, not a failure).
    pub fn poll_challenge(&self, challenge: &Challenge) -> Result<(), IssuanceError> {
        poll_until_valid("challenge", &self.poll, || {
            let fetched = self.challenge_from_url(&challenge.url)?;
            Ok(PollProbe {
                status: fetched.status,
                error: fetched.error,
            })
        })
    }

    /// Submit the CSR held in the session to the order's finalize URL.
    pub fn finalize_order(&self, order: &Order) -> Result<(), IssuanceError> {
        let csr = self.session.csr.as_deref().ok_or_else(|| {
            IssuanceError::Protocol("no certificate signing request prepared".to_string())
        })?;
        let request = FinalizeRequest {
            csr: base64url(csr),
        };
        let response = self.post_signed(&order.finalize, &serde_json::to_string(&request)?)?;
        let finalized: Order = serde_json::from_str(&body(response)?)?;
        ensure_not_invalid("order", &finalized.status)
    }

    pub fn poll_finalized_order(&self, order: &Order) -> Result<(), IssuanceError> {
        poll_until_valid("order", &self.poll, || {
            let fetched = self.order_from_url(&order.url)?;
            Ok(PollProbe {
                status: fetched.status,
                error: fetched.error,
            })
        })
    }

    /// Download the issued certificate and record it in the session.
    pub fn certificate(&mut self, order: &Order) -> Result<Vec<u8>, IssuanceError> {
        let url = order.certificate.as_deref().ok_or_else(|| {
            IssuanceError::Protocol("order carries no certificate URL".to_string())
        })?;
        let response = self.post_as_get(url)?;
        let bytes = response
            .bytes()
            .map_err(IssuanceError::Transport)?
            .to_vec();
        if let Ok(text) = std::str::from_utf8(&bytes) {
            info!("[acme] certificate:\n{}", abbreviate(text, 64, 26));
        }
        self.session.certificate = Some(bytes.clone());
        Ok(bytes)
    }

    /// An empty-payload signed POST, the protocol's "POST-as-GET" fetch.
    fn post_as_get(&self, url: &str) -> Result<Response, IssuanceError> {
        self.post_signed(url, "")
    }

    fn post_signed(&self, url: &str, payload: &str) -> Result<Response, IssuanceError> {
        let nonce = self.new_nonce()?;
        let account_key = self.account_key_for(url)?;
        let envelope = jws::build_envelope(
            url,
            payload,
            &nonce,
            &account_key,
            self.session.account.key(),
        )?;
        let response = HttpClient::shared()
            .post(url)
            .header(CONTENT_TYPE, MEDIA_TYPE_JOSE_JSON)
            .body(envelope)
            .send()
            .map_err(IssuanceError::Transport)?;
        check(response)
    }

    fn account_key_for(&self, url: &str) -> Result<AccountKey<'_>, IssuanceError> {
        if wants_jwk(self.directory()?, url) {
            Ok(AccountKey::Jwk(self.jwk()?))
        } else {
            let kid = self
                .session
                .kid
                .as_deref()
                .ok_or_else(|| IssuanceError::Protocol("account key id not known yet".into()))?;
            Ok(AccountKey::Kid(kid))
        }
    }
}

/// The account-key header carries the full JWK only for new-account and
/// revoke-cert; every other signed request uses the account key id.
fn wants_jwk(directory: &Directory, url: &str) -> bool {
    url == directory.new_account || directory.revoke_cert.as_deref() == Some(url)
}

pub(crate) struct PollProbe {
    pub status: String,
    pub error: Option<ProblemDetail>,
}

/// Shared bounded-retry loop. Succeeds immediately on `valid`, fails
/// immediately on a reported problem detail, and exits quietly with a
/// warning when the rounds are exhausted — the caller proceeds and any real
/// failure surfaces at the certificate download.
fn poll_until_valid<F>(
    what: &str,
    settings: &PollSettings,
    mut fetch: F,
) -> Result<(), IssuanceError>
where
    F: FnMut() -> Result<PollProbe, IssuanceError>,
{
    let mut validated = false;
    for round in 0..settings.max_retries {
        info!("[acme] {what} poll round {}", round + 1);
        let probe = fetch()?;
        info!("[acme] {what} status: {}", probe.status);
        if probe.status == STATUS_VALID {
            validated = true;
            break;
        }
        if let Some(problem) = probe.error {
            return Err(IssuanceError::Protocol(problem.to_string()));
        }
        thread::sleep(settings.delay);
    }
    if !validated {
        warn!(
            "[acme] {what} not valid after {} rounds; continuing without validation",
            settings.max_retries
        );
    }
    Ok(())
}

fn ensure_not_invalid(resource: &'static str, status: &str) -> Result<(), IssuanceError> {
    if status == STATUS_INVALID {
        return Err(IssuanceError::InvalidStatus { resource });
    }
    Ok(())
}

/// Map a non-success response to a protocol error, preferring the problem
/// detail body when the server sent one.
fn check(response: Response) -> Result<Response, IssuanceError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let raw = response.text().unwrap_or_default();
    if content_type.contains(MEDIA_TYPE_PROBLEM_JSON) {
        if let Ok(problem) = serde_json::from_str::<ProblemDetail>(&raw) {
            return Err(IssuanceError::Protocol(problem.to_string()));
        }
    }
    Err(IssuanceError::Protocol(status.to_string()))
}

fn body(response: Response) -> Result<String, IssuanceError> {
    response.text().map_err(IssuanceError::Transport)
}

fn location(response: &Response) -> Result<String, IssuanceError> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            IssuanceError::Protocol("server response is missing the Location header".into())
        })
}

/// Head and tail of a long text, used to log the certificate body without
/// flooding the output.
fn abbreviate(text: &str, head: usize, tail: usize) -> String {
    if text.len() <= head + tail
        || !text.is_char_boundary(head)
        || !text.is_char_boundary(text.len() - tail)
    {
        return text.to_string();
    }
    format!("{} ... {}", &text[..head], &text[text.len() - tail..])
}
