use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

type HmacSha256 = Hmac<Sha256>;

/// Query string sent by Meta when a webhook subscription is (re)verified.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubscriptionQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("hub.mode must be `subscribe`")]
    InvalidMode,
    #[error("verify token does not match")]
    TokenMismatch,
    #[error("hub.challenge is missing")]
    MissingChallenge,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is missing")]
    Missing,
    #[error("signature header is malformed")]
    Malformed,
    #[error("signature does not match payload")]
    Mismatch,
}

/// Returns the challenge to echo back when the handshake is valid.
pub fn verify_subscription(
    query: &SubscriptionQuery,
    expected_token: &str,
) -> Result<String, VerifyError> {
    if query.mode.as_deref() != Some("subscribe") {
        return Err(VerifyError::InvalidMode);
    }
    let token = query.verify_token.as_deref().unwrap_or_default();
    if expected_token.is_empty() || !constant_time_eq(token.as_bytes(), expected_token.as_bytes()) {
        return Err(VerifyError::TokenMismatch);
    }
    query.challenge.clone().filter(|challenge| !challenge.is_empty()).ok_or(VerifyError::MissingChallenge)
}

/// Checks an `X-Hub-Signature-256: sha256=<hex>` header against the raw body.
pub fn verify_signature(
    app_secret: &str,
    body: &[u8],
    header: Option<&str>,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;
    let hex_digest = header.trim().strip_prefix("sha256=").ok_or(SignatureError::Malformed)?;
    let expected = hex::decode(hex_digest).map_err(|_| SignatureError::Malformed)?;

    let mut mac =
        HmacSha256::new_from_slice(app_secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}

/// Computes the header value Meta would send for `body`.
pub fn sign(app_secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(app_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Compares every byte regardless of where the first mismatch is.
pub fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter().zip(right).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

#[cfg(test)]
mod tests {
    use super::{
        sign, verify_signature, verify_subscription, SignatureError, SubscriptionQuery,
        VerifyError,
    };

    fn query(mode: &str, token: &str, challenge: &str) -> SubscriptionQuery {
        SubscriptionQuery {
            mode: Some(mode.to_string()),
            verify_token: Some(token.to_string()),
            challenge: Some(challenge.to_string()),
        }
    }

    #[test]
    fn handshake_echoes_challenge() {
        assert_eq!(
            verify_subscription(&query("subscribe", "segredo", "1158201444"), "segredo"),
            Ok("1158201444".to_string())
        );
    }

    #[test]
    fn handshake_rejects_bad_token_or_mode() {
        assert_eq!(
            verify_subscription(&query("subscribe", "errado", "1"), "segredo"),
            Err(VerifyError::TokenMismatch)
        );
        assert_eq!(
            verify_subscription(&query("unsubscribe", "segredo", "1"), "segredo"),
            Err(VerifyError::InvalidMode)
        );
        assert_eq!(
            verify_subscription(&query("subscribe", "", "1"), ""),
            Err(VerifyError::TokenMismatch)
        );
        assert_eq!(
            verify_subscription(&query("subscribe", "segredo", ""), "segredo"),
            Err(VerifyError::MissingChallenge)
        );
    }

    #[test]
    fn signature_round_trip_and_tamper_detection() {
        let body = br#"{"entry":[]}"#;
        let header = sign("app-secret", body);
        assert!(header.starts_with("sha256="));

        assert_eq!(verify_signature("app-secret", body, Some(&header)), Ok(()));
        assert_eq!(
            verify_signature("app-secret", br#"{"entry":[1]}"#, Some(&header)),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(verify_signature("app-secret", body, None), Err(SignatureError::Missing));
        assert_eq!(
            verify_signature("app-secret", body, Some("md5=abc")),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn known_digest_matches() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let header = "sha256=f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8";
        assert_eq!(
            verify_signature("key", b"The quick brown fox jumps over the lazy dog", Some(header)),
            Ok(())
        );
    }
}
