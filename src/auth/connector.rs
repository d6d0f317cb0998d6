use std::time::{Duration, SystemTime};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope, StandardRevocableToken,
    TokenResponse, TokenUrl,
    basic::{
        BasicClient, BasicErrorResponse, BasicRevocationErrorResponse,
        BasicTokenIntrospectionResponse, BasicTokenResponse,
    },
};
use rand::RngCore;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use super::discovery::{DISCOVERY_TIMEOUT, DiscoveryClient, MetadataCache, OAuthMetadata};
use super::pkce::PkceChallenge;
use super::records::{PENDING_AUTHORIZATION_TTL, PendingAuthorization, RegisteredClient, TokenSet};
use super::registration::{ClientRegistrationRequest, REGISTRATION_TIMEOUT, RegistrationClient};
use super::state::StateCodec;
use crate::error::{Error, Result};

/// Default bound on token endpoint calls. Longer than the discovery bound:
/// authorization servers may perform synchronous downstream validation
/// before answering.
const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for [`OAuthConnector`].
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Client name presented during dynamic registration.
    pub client_name: String,
    /// Redirect URI served by the host application's callback handler.
    pub redirect_uri: String,
    /// Secret key used to sign the `state` parameter.
    pub state_secret: Vec<u8>,
    pub discovery_timeout: Duration,
    pub registration_timeout: Duration,
    pub token_timeout: Duration,
}

impl ConnectorConfig {
    pub fn new(
        client_name: impl Into<String>,
        redirect_uri: impl Into<String>,
        state_secret: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            client_name: client_name.into(),
            redirect_uri: redirect_uri.into(),
            state_secret: state_secret.into(),
            discovery_timeout: DISCOVERY_TIMEOUT,
            registration_timeout: REGISTRATION_TIMEOUT,
            token_timeout: TOKEN_TIMEOUT,
        }
    }
}

/// The output of [`OAuthConnector::begin_authorization`]: the record to
/// persist and the URL to send the user to.
#[derive(Debug)]
pub struct AuthorizationRedirect {
    pub pending: PendingAuthorization,
    pub url: Url,
}

type ConfiguredClient = oauth2::Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Caller-facing facade over discovery, registration, authorization and the
/// token lifecycle.
///
/// Stateless per call: everything a later step needs (PKCE verifier, signed
/// state) lives in the [`PendingAuthorization`] record the caller persists,
/// so concurrent attempts against different servers are safe. Serializing
/// attempts against the *same* server is the caller's job.
pub struct OAuthConnector {
    config: ConnectorConfig,
    discovery: DiscoveryClient,
    registration: RegistrationClient,
    state_codec: StateCodec,
    cache: MetadataCache,
    http: reqwest::Client,
}

impl OAuthConnector {
    pub fn new(config: ConnectorConfig) -> Result<Self> {
        Self::with_cache(config, MetadataCache::default())
    }

    /// Construct with an explicitly provided metadata cache, e.g. one per
    /// test or one shared across connectors with a custom TTL.
    pub fn with_cache(config: ConnectorConfig, cache: MetadataCache) -> Result<Self> {
        Url::parse(&config.redirect_uri).map_err(|err| {
            Error::InvalidConfiguration(format!(
                "invalid redirect URI {}: {err}",
                config.redirect_uri
            ))
        })?;
        if config.state_secret.is_empty() {
            return Err(Error::InvalidConfiguration(
                "state secret must not be empty".into(),
            ));
        }

        // Token endpoints must not be followed through redirects.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| Error::Transport(err.to_string()))?;

        Ok(Self {
            discovery: DiscoveryClient::new(config.discovery_timeout),
            registration: RegistrationClient::new(config.registration_timeout),
            state_codec: StateCodec::new(config.state_secret.clone()),
            cache,
            http,
            config,
        })
    }

    /// Discover combined OAuth metadata for a server, consulting the cache
    /// first.
    pub async fn discover(&self, server_url: &str) -> Result<OAuthMetadata> {
        if let Some(metadata) = self.cache.get(server_url) {
            debug!(server = %server_url, "using cached metadata");
            return Ok(metadata);
        }
        let metadata = self.discovery.discover(server_url).await?;
        self.cache.insert(server_url, metadata.clone());
        Ok(metadata)
    }

    /// Register this host as a public client, when the server allows it.
    pub async fn register_client(
        &self,
        metadata: &OAuthMetadata,
        scopes: Option<&[String]>,
    ) -> Result<RegisteredClient> {
        let mut request =
            ClientRegistrationRequest::public(&self.config.client_name, &self.config.redirect_uri);
        if let Some(scopes) = scopes {
            request = request.with_scopes(scopes);
        }
        self.registration.register(metadata, request, None).await
    }

    /// Build the authorization redirect URL and its pending record.
    ///
    /// Scope selection: caller-supplied scopes when given, otherwise every
    /// scope the server advertised, otherwise the parameter is omitted. No
    /// RFC 8707 `resource` parameter is sent — enough third-party servers
    /// reject requests carrying it that omission is the interoperable
    /// default.
    pub fn begin_authorization(
        &self,
        metadata: &OAuthMetadata,
        client_id: &str,
        server_id: &str,
        scopes: Option<Vec<String>>,
    ) -> Result<AuthorizationRedirect> {
        let pkce = PkceChallenge::generate();
        let session_id = Uuid::new_v4().to_string();
        let state = self.state_codec.encode(&session_id, &random_nonce());

        let scopes = scopes
            .or_else(|| metadata.scopes_supported.clone())
            .unwrap_or_default();

        let client = self.authorization_client(metadata, client_id)?;
        let state_for_url = state.clone();
        let mut request = client
            .authorize_url(move || CsrfToken::new(state_for_url))
            .set_pkce_challenge(PkceChallenge::challenge_for(&pkce.verifier));
        for scope in &scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        let (url, _) = request.url();

        let created_at = SystemTime::now();
        let pending = PendingAuthorization {
            id: session_id,
            server_id: server_id.to_string(),
            code_verifier: pkce.verifier,
            state,
            resource: metadata.resource.clone(),
            scopes,
            created_at,
            expires_at: created_at + PENDING_AUTHORIZATION_TTL,
        };

        debug!(server_id, pending_id = %pending.id, "authorization redirect prepared");
        Ok(AuthorizationRedirect { pending, url })
    }

    /// Validate a redirect callback against its pending record, then
    /// exchange the code.
    ///
    /// The caller extracts `code` and `state` from the callback query string
    /// and looks the pending record up by the decoded session id. All state
    /// failures — bad signature, expired window, mismatched record — collapse
    /// into the opaque [`Error::StateInvalid`].
    pub async fn complete_authorization(
        &self,
        pending: &PendingAuthorization,
        code: &str,
        state: &str,
        client_id: &str,
        metadata: &OAuthMetadata,
    ) -> Result<TokenSet> {
        let payload = self.state_codec.decode(state).ok_or(Error::StateInvalid)?;
        if payload.session_id != pending.id || state != pending.state {
            return Err(Error::StateInvalid);
        }
        if pending.is_expired() {
            return Err(Error::StateInvalid);
        }
        self.exchange_code(code, &pending.code_verifier, client_id, metadata)
            .await
    }

    /// Exchange an authorization code plus its PKCE verifier for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        client_id: &str,
        metadata: &OAuthMetadata,
    ) -> Result<TokenSet> {
        let client = self.authorization_client(metadata, client_id)?;
        let exchange = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(code_verifier.to_string()))
            .request_async(&self.http);

        let response = tokio::time::timeout(self.config.token_timeout, exchange)
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|err| token_error(err, Error::Exchange))?;

        Ok(token_set_from(&response))
    }

    /// Exchange a stored refresh token for a new token set.
    ///
    /// The returned set carries whatever refresh token the server issued;
    /// when it rotated, the old token is dead and the caller must overwrite
    /// its stored copy wholesale.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        client_id: &str,
        metadata: &OAuthMetadata,
    ) -> Result<TokenSet> {
        let client = self.authorization_client(metadata, client_id)?;
        let refresh_token_value = RefreshToken::new(refresh_token.to_string());
        let refresh = client
            .exchange_refresh_token(&refresh_token_value)
            .request_async(&self.http);

        let response = tokio::time::timeout(self.config.token_timeout, refresh)
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|err| token_error(err, Error::Refresh))?;

        Ok(token_set_from(&response))
    }

    fn authorization_client(
        &self,
        metadata: &OAuthMetadata,
        client_id: &str,
    ) -> Result<ConfiguredClient> {
        // Public client: credentials travel in the request body, not an
        // Authorization header.
        let client = BasicClient::new(ClientId::new(client_id.to_string()))
            .set_auth_type(AuthType::RequestBody)
            .set_auth_uri(
                AuthUrl::new(metadata.authorization_endpoint.clone()).map_err(|err| {
                    Error::InvalidConfiguration(format!("invalid authorization endpoint: {err}"))
                })?,
            )
            .set_token_uri(TokenUrl::new(metadata.token_endpoint.clone()).map_err(|err| {
                Error::InvalidConfiguration(format!("invalid token endpoint: {err}"))
            })?)
            .set_redirect_uri(RedirectUrl::new(self.config.redirect_uri.clone()).map_err(
                |err| Error::InvalidConfiguration(format!("invalid redirect URI: {err}")),
            )?);
        Ok(client)
    }
}

fn random_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn token_set_from(response: &BasicTokenResponse) -> TokenSet {
    TokenSet {
        access_token: response.access_token().secret().clone(),
        refresh_token: response.refresh_token().map(|token| token.secret().clone()),
        expires_at: response
            .expires_in()
            .map(|lifetime| SystemTime::now() + lifetime),
        scope: response
            .scopes()
            .map(|scopes| {
                scopes
                    .iter()
                    .map(|scope| scope.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            }),
    }
}

/// Map an `oauth2` token-request failure into the typed taxonomy, surfacing
/// the server's structured `error`/`error_description` when present.
fn token_error<RE>(
    err: RequestTokenError<RE, BasicErrorResponse>,
    wrap: fn(String) -> Error,
) -> Error
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            let message = match response.error_description() {
                Some(description) => format!("{} ({})", response.error(), description),
                None => response.error().to_string(),
            };
            wrap(message)
        }
        RequestTokenError::Request(inner) => wrap(format!("transport error: {inner}")),
        other => wrap(other.to_string()),
    }
}
