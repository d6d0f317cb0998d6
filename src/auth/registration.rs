use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::discovery::OAuthMetadata;
use super::records::RegisteredClient;
use super::transport_error;
use crate::error::{Error, Result};

/// Default bound on the registration request.
pub(crate) const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Client metadata submitted during dynamic registration (RFC 7591).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistrationRequest {
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,
}

impl ClientRegistrationRequest {
    /// A public client (no stored secret) for the authorization-code flow
    /// with refresh.
    pub fn public(client_name: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            redirect_uris: vec![redirect_uri.into()],
            grant_types: vec!["authorization_code".to_string(), "refresh_token".to_string()],
            response_types: vec!["code".to_string()],
            token_endpoint_auth_method: "none".to_string(),
            scope: None,
            software_id: Some(env!("CARGO_PKG_NAME").to_string()),
            software_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }
    }

    pub fn with_scopes(mut self, scopes: &[String]) -> Self {
        if !scopes.is_empty() {
            self.scope = Some(scopes.join(" "));
        }
        self
    }
}

/// Successful registration response (RFC 7591 §3.2.1).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientRegistrationResponse {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub client_id_issued_at: Option<u64>,
    #[serde(default)]
    pub client_secret_expires_at: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RegistrationErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Registers this host as an OAuth client at runtime.
pub struct RegistrationClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl RegistrationClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
        }
    }

    /// Register against `metadata.registration_endpoint`.
    ///
    /// A server without a registration endpoint yields
    /// [`Error::RegistrationNotSupported`], a distinct and expected outcome:
    /// the caller can fall back to a pre-configured client id if one exists.
    /// Servers that protect their registration endpoint accept an
    /// `initial_access_token`.
    pub async fn register(
        &self,
        metadata: &OAuthMetadata,
        request: ClientRegistrationRequest,
        initial_access_token: Option<&str>,
    ) -> Result<RegisteredClient> {
        let endpoint = metadata
            .registration_endpoint
            .as_deref()
            .ok_or(Error::RegistrationNotSupported)?;

        debug!(%endpoint, client_name = %request.client_name, "registering client");

        let mut outbound = self
            .http
            .post(endpoint)
            .json(&request)
            .timeout(self.timeout);
        if let Some(token) = initial_access_token {
            outbound = outbound.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = outbound.send().await.map_err(transport_error)?;
        let status = response.status();

        if status.is_success() {
            let body: ClientRegistrationResponse = response.json().await.map_err(|err| {
                Error::Registration(format!("invalid registration response: {err}"))
            })?;
            debug!(client_id = %body.client_id, "client registered");
            return Ok(RegisteredClient {
                client_id: body.client_id,
                client_secret: body.client_secret,
            });
        }

        // Surface the server's error/error_description verbatim.
        match response.json::<RegistrationErrorBody>().await {
            Ok(body) => Err(Error::Registration(match body.error_description {
                Some(description) => format!("{}: {}", body.error, description),
                None => body.error,
            })),
            Err(_) => Err(Error::Registration(format!(
                "registration endpoint returned {status}"
            ))),
        }
    }
}
