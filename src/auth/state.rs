use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed state token before it is rejected, in
/// milliseconds. Also the replay window: the same encoded state is only
/// accepted within this interval of its signing time.
pub const STATE_MAX_AGE_MS: u64 = 10 * 60 * 1000;

/// The claims carried inside a signed `state` parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePayload {
    /// Identifier of the pending authorization this state belongs to. The
    /// caller uses it to look the record back up when the callback arrives.
    pub session_id: String,
    pub nonce: String,
    /// Milliseconds since the Unix epoch at signing time.
    pub issued_at_ms: u64,
}

/// Signs and verifies the OAuth `state` parameter.
///
/// The encoded form is `base64url(json-payload).base64url(signature)` where
/// the signature is HMAC-SHA256 over the encoded payload text. The payload
/// is immutable once signed: mutating either half invalidates the token.
pub struct StateCodec {
    secret: Vec<u8>,
}

impl StateCodec {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Sign `{session_id, nonce}` together with the current timestamp.
    pub fn encode(&self, session_id: &str, nonce: &str) -> String {
        self.encode_at(session_id, nonce, now_ms())
    }

    fn encode_at(&self, session_id: &str, nonce: &str, issued_at_ms: u64) -> String {
        let payload = StatePayload {
            session_id: session_id.to_string(),
            nonce: nonce.to_string(),
            issued_at_ms,
        };
        let json = serde_json::to_vec(&payload).expect("state payload serializes");
        let body = URL_SAFE_NO_PAD.encode(json);
        let signature = self.sign(body.as_bytes());
        format!("{body}.{signature}")
    }

    /// Verify a state string and return its payload.
    ///
    /// Returns `None` on any failure — malformed input, signature mismatch,
    /// a timestamp older than [`STATE_MAX_AGE_MS`], or one in the future.
    /// The reason is deliberately not reported. Signature comparison is
    /// constant-time.
    pub fn decode(&self, state: &str) -> Option<StatePayload> {
        let (body, signature) = state.split_once('.')?;
        if signature.contains('.') {
            return None;
        }
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(body.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let json = URL_SAFE_NO_PAD.decode(body).ok()?;
        let payload: StatePayload = serde_json::from_slice(&json).ok()?;

        let now = now_ms();
        if payload.issued_at_ms > now || now - payload.issued_at_ms > STATE_MAX_AGE_MS {
            return None;
        }
        Some(payload)
    }

    fn sign(&self, data: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key length");
        mac.update(data);
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
