use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Lifetime of a pending authorization. A record older than this must never
/// be exchanged, matching the replay window of the signed state.
pub const PENDING_AUTHORIZATION_TTL: Duration = Duration::from_secs(10 * 60);

/// One in-flight connection attempt, persisted by the caller between
/// building the redirect and receiving the callback.
///
/// Created immediately before the user is redirected and consumed exactly
/// once by the code exchange; the caller deletes it afterwards regardless of
/// outcome. `code_verifier` never leaves the owning system except toward the
/// token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAuthorization {
    /// Session identifier; also the `session_id` claim inside the signed
    /// state, which is how the caller finds this record on callback.
    pub id: String,
    /// Opaque identifier of the remote server this attempt belongs to.
    pub server_id: String,
    pub code_verifier: String,
    /// The exact signed state handed to the authorization server.
    pub state: String,
    pub resource: String,
    pub scopes: Vec<String>,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
}

impl PendingAuthorization {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() > self.expires_at
    }
}

/// The result of a successful code exchange or refresh.
///
/// Exclusively owned by the caller once returned; the core never retains
/// token material. On refresh, persist the returned set wholesale — a new
/// `refresh_token` here means the server rotated and the old one is gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    /// Absent means the server issued no refresh token and expiry requires
    /// re-authorization.
    pub refresh_token: Option<String>,
    /// Derived from `expires_in` when the server provided one. Absent means
    /// the lifetime is unknown: treat the token as valid until a call fails.
    pub expires_at: Option<SystemTime>,
    /// Scope actually granted by the server, which may differ from what was
    /// requested.
    pub scope: Option<String>,
}

impl TokenSet {
    /// True when the access token expires within `leeway` from now. An
    /// unknown expiry reports `false`.
    pub fn expires_soon(&self, leeway: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => SystemTime::now() + leeway >= expires_at,
            None => false,
        }
    }
}

/// Client credentials obtained from dynamic registration, or pre-configured
/// by the operator for servers that do not register clients at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredClient {
    pub client_id: String,
    /// Public clients receive no secret; some servers issue one anyway.
    pub client_secret: Option<String>,
}
