//! The JWS envelope every signed ACME request is wrapped in.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use serde_json::json;

use crate::error::IssuanceError;
use crate::identity::JsonWebKey;

pub fn base64url(data: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// How the protected header identifies the account key: the full JWK for
/// new-account and revoke-cert, the account key id for everything else.
pub enum AccountKey<'a> {
    Jwk(&'a JsonWebKey),
    Kid(&'a str),
}

/// Build the `{payload, protected, signature}` envelope for a signed POST.
/// POST-as-GET requests pass the empty string as payload.
pub fn build_envelope(
    url: &str,
    payload: &str,
    nonce: &str,
    account_key: &AccountKey<'_>,
    signing_key: &PKey<Private>,
) -> Result<String, IssuanceError> {
    let payload_b64 = base64url(payload);

    let protected = match account_key {
        AccountKey::Jwk(jwk) => json!({
            "alg": "RS256",
            "jwk": jwk,
            "nonce": nonce,
            "url": url,
        }),
        AccountKey::Kid(kid) => json!({
            "alg": "RS256",
            "kid": kid,
            "nonce": nonce,
            "url": url,
        }),
    };
    let protected_b64 = base64url(serde_json::to_string(&protected)?);

    let message = format!("{protected_b64}.{payload_b64}");
    let mut signer = Signer::new(MessageDigest::sha256(), signing_key)?;
    signer.update(message.as_bytes())?;
    let signature = base64url(signer.sign_to_vec()?);

    let envelope = json!({
        "payload": payload_b64,
        "protected": protected_b64,
        "signature": signature,
    });
    Ok(envelope.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    use openssl::rsa::Rsa;
    use serde_json::Value;

    fn test_key() -> PKey<Private> {
        PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
    }

    fn decode_protected(envelope: &str) -> Value {
        let envelope: Value = serde_json::from_str(envelope).unwrap();
        let protected_b64 = envelope["protected"].as_str().unwrap();
        let raw = URL_SAFE_NO_PAD.decode(protected_b64).unwrap();
        serde_json::from_slice(&raw).unwrap()
    }

    #[test]
    fn envelope_with_jwk_header() {
        let key = test_key();
        let jwk = JsonWebKey {
            e: "AQAB".into(),
            kty: "RSA".into(),
            n: "abc".into(),
        };
        let envelope = build_envelope(
            "https://ca.example/new-account",
            r#"{"termsOfServiceAgreed":true}"#,
            "nonce-1",
            &AccountKey::Jwk(&jwk),
            &key,
        )
        .unwrap();

        let protected = decode_protected(&envelope);
        assert_eq!(protected["alg"], "RS256");
        assert_eq!(protected["nonce"], "nonce-1");
        assert_eq!(protected["url"], "https://ca.example/new-account");
        assert_eq!(protected["jwk"]["kty"], "RSA");
        assert!(protected.get("kid").is_none());
    }

    #[test]
    fn envelope_with_kid_header() {
        let key = test_key();
        let envelope = build_envelope(
            "https://ca.example/order/1",
            "",
            "nonce-2",
            &AccountKey::Kid("https://ca.example/acct/17"),
            &key,
        )
        .unwrap();

        let protected = decode_protected(&envelope);
        assert_eq!(protected["kid"], "https://ca.example/acct/17");
        assert!(protected.get("jwk").is_none());

        // POST-as-GET: the payload is the base64url of the empty string
        let envelope: Value = serde_json::from_str(&envelope).unwrap();
        assert_eq!(envelope["payload"], "");
    }

    #[test]
    fn signature_verifies_with_the_public_key() {
        use openssl::hash::MessageDigest;
        use openssl::sign::Verifier;

        let key = test_key();
        let envelope = build_envelope(
            "https://ca.example/order/1",
            r#"{"csr":"abc"}"#,
            "nonce-3",
            &AccountKey::Kid("https://ca.example/acct/17"),
            &key,
        )
        .unwrap();

        let envelope: Value = serde_json::from_str(&envelope).unwrap();
        let message = format!(
            "{}.{}",
            envelope["protected"].as_str().unwrap(),
            envelope["payload"].as_str().unwrap()
        );
        let signature = URL_SAFE_NO_PAD
            .decode(envelope["signature"].as_str().unwrap())
            .unwrap();

        let mut verifier = Verifier::new(MessageDigest::sha256(), &key).unwrap();
        verifier.update(message.as_bytes()).unwrap();
        assert!(verifier.verify(&signature).unwrap());
    }
}
