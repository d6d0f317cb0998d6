use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};

/// Default bound on each individual discovery fetch.
pub(crate) const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a cached [`OAuthMetadata`] entry stays usable.
const METADATA_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Protected resource metadata (RFC 9728), fetched from the server's origin
/// well-known path.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtectedResourceMetadata {
    #[serde(default)]
    pub resource: Option<String>,
    /// Issuer URIs of the authorization servers protecting this resource.
    #[serde(default)]
    pub authorization_servers: Vec<String>,
    #[serde(default)]
    pub scopes_supported: Option<Vec<String>>,
}

/// Authorization server metadata (RFC 8414 / OpenID Connect Discovery).
///
/// `authorization_endpoint` and `token_endpoint` are optional at the wire
/// level so that a partial document can be parsed and rejected with a
/// field-specific message rather than a generic parse failure.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub registration_endpoint: Option<String>,
    #[serde(default)]
    pub revocation_endpoint: Option<String>,
    #[serde(default)]
    pub scopes_supported: Option<Vec<String>>,
    #[serde(default)]
    pub code_challenge_methods_supported: Option<Vec<String>>,
}

/// Combined OAuth metadata for one remote server: the merge of its
/// protected-resource document (when present) and the accepted
/// authorization-server document.
///
/// Only ever constructed with both `authorization_endpoint` and
/// `token_endpoint` present; a document missing either is a discovery
/// failure, not a partial success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthMetadata {
    /// Canonical resource identifier: the advertised `resource` when the
    /// server publishes protected-resource metadata, the normalized base URL
    /// otherwise.
    pub resource: String,
    /// Issuer URI of the authorization server that produced this metadata.
    pub authorization_server: String,
    pub scopes_supported: Option<Vec<String>>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: Option<String>,
    pub revocation_endpoint: Option<String>,
    pub code_challenge_methods_supported: Option<Vec<String>>,
    pub cached_at: SystemTime,
}

impl OAuthMetadata {
    /// Whether the server advertises S256 PKCE support. Absence does not
    /// stop the flow; MCP-class servers are expected to require PKCE whether
    /// or not they advertise it.
    pub fn advertises_s256(&self) -> bool {
        self.code_challenge_methods_supported
            .as_ref()
            .is_some_and(|methods| methods.iter().any(|m| m == "S256"))
    }
}

/// Explicit, injectable cache of discovered metadata, keyed by normalized
/// server URL. One instance per connector; construct separate instances
/// where isolation matters (tests, multi-tenant processes).
pub struct MetadataCache {
    entries: DashMap<String, OAuthMetadata>,
    ttl: Duration,
}

impl MetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Look up fresh metadata for a server, evicting a stale entry.
    pub fn get(&self, server_url: &str) -> Option<OAuthMetadata> {
        let key = cache_key(server_url);
        let stale = match self.entries.get(&key) {
            Some(entry) => match entry.cached_at.elapsed() {
                Ok(age) => age > self.ttl,
                // A cached_at in the future means the clock moved; discard.
                Err(_) => true,
            },
            None => return None,
        };
        if stale {
            self.entries.remove(&key);
            return None;
        }
        self.entries.get(&key).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, server_url: &str, metadata: OAuthMetadata) {
        self.entries.insert(cache_key(server_url), metadata);
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(METADATA_CACHE_TTL)
    }
}

fn cache_key(server_url: &str) -> String {
    server_url.trim_end_matches('/').to_string()
}

enum FetchFailure {
    Timeout,
    Other,
}

/// Resolves combined OAuth metadata for a server from its base URL alone.
///
/// Each individual fetch is bounded by the configured timeout; network and
/// parse failures at one endpoint mean "try the next candidate", never an
/// immediate overall failure. Only the issuer check hard-rejects an
/// endpoint's document.
pub struct DiscoveryClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl DiscoveryClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
        }
    }

    /// Walk the discovery fallback chain for `server_url`.
    ///
    /// 1. Normalize the base URL (trailing slash stripped).
    /// 2. Fetch protected-resource metadata from the origin well-known path;
    ///    adopt the first advertised authorization server, else keep the
    ///    origin as the candidate.
    /// 3. Fetch authorization-server metadata from the candidate's well-known
    ///    locations (path-scoped variants first when the candidate has a
    ///    path), accepting the first document whose issuer matches the
    ///    candidate exactly.
    /// 4. Validate required endpoints and merge.
    pub async fn discover(&self, server_url: &str) -> Result<OAuthMetadata> {
        let base = normalize_base_url(server_url)?;
        let origin = origin_url(&base)?;
        let mut timed_out = false;

        let resource_metadata = match self
            .fetch_json::<ProtectedResourceMetadata>(&join_well_known(
                &origin,
                "oauth-protected-resource",
                "",
            )?)
            .await
        {
            Ok(metadata) => {
                debug!(server = %base, "found protected resource metadata");
                Some(metadata)
            }
            Err(FetchFailure::Timeout) => {
                timed_out = true;
                None
            }
            Err(FetchFailure::Other) => None,
        };

        let candidate = resource_metadata
            .as_ref()
            .and_then(|m| m.authorization_servers.first())
            .and_then(|issuer| Url::parse(issuer).ok())
            .unwrap_or_else(|| origin.clone());

        let mut accepted: Option<AuthorizationServerMetadata> = None;
        for endpoint in candidate_metadata_urls(&candidate)? {
            match self
                .fetch_json::<AuthorizationServerMetadata>(&endpoint)
                .await
            {
                Ok(document) => {
                    if issuer_matches(&document.issuer, &candidate) {
                        debug!(%endpoint, issuer = %document.issuer, "accepted authorization server metadata");
                        accepted = Some(document);
                        break;
                    }
                    // Untrusted document: an issuer that doesn't match the
                    // candidate could be served by an attacker-controlled
                    // path. Reject this endpoint and keep going.
                    warn!(
                        %endpoint,
                        issuer = %document.issuer,
                        candidate = %candidate,
                        "issuer mismatch, rejecting metadata from this endpoint"
                    );
                }
                Err(FetchFailure::Timeout) => timed_out = true,
                Err(FetchFailure::Other) => {}
            }
        }

        let Some(document) = accepted else {
            if timed_out {
                return Err(Error::Timeout);
            }
            return Err(Error::Discovery(format!(
                "{server_url} does not support discoverable OAuth \
                 (no authorization server metadata found)"
            )));
        };

        let authorization_endpoint = document.authorization_endpoint.ok_or_else(|| {
            Error::Discovery("authorization server metadata is missing authorization_endpoint".into())
        })?;
        let token_endpoint = document.token_endpoint.ok_or_else(|| {
            Error::Discovery("authorization server metadata is missing token_endpoint".into())
        })?;

        let metadata = OAuthMetadata {
            resource: resource_metadata
                .as_ref()
                .and_then(|m| m.resource.clone())
                .unwrap_or_else(|| base.as_str().trim_end_matches('/').to_string()),
            authorization_server: document.issuer,
            scopes_supported: document
                .scopes_supported
                .or_else(|| resource_metadata.and_then(|m| m.scopes_supported)),
            authorization_endpoint,
            token_endpoint,
            registration_endpoint: document.registration_endpoint,
            revocation_endpoint: document.revocation_endpoint,
            code_challenge_methods_supported: document.code_challenge_methods_supported,
            cached_at: SystemTime::now(),
        };

        if !metadata.advertises_s256() {
            warn!(
                server = %base,
                "authorization server does not advertise S256 PKCE support, attempting it anyway"
            );
        }

        Ok(metadata)
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        endpoint: &Url,
    ) -> std::result::Result<T, FetchFailure> {
        debug!(%endpoint, "fetching discovery document");
        let response = self
            .http
            .get(endpoint.clone())
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| {
                debug!(%endpoint, error = %err, "discovery fetch failed");
                if err.is_timeout() {
                    FetchFailure::Timeout
                } else {
                    FetchFailure::Other
                }
            })?;

        if !response.status().is_success() {
            debug!(%endpoint, status = %response.status(), "discovery endpoint returned non-success");
            return Err(FetchFailure::Other);
        }

        response.json::<T>().await.map_err(|err| {
            debug!(%endpoint, error = %err, "discovery document failed to parse");
            if err.is_timeout() {
                FetchFailure::Timeout
            } else {
                FetchFailure::Other
            }
        })
    }
}

/// Strip query, fragment, and any trailing slash from the server base URL.
pub(crate) fn normalize_base_url(server_url: &str) -> Result<Url> {
    let mut url = Url::parse(server_url).map_err(|err| {
        Error::InvalidConfiguration(format!("invalid server URL {server_url}: {err}"))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidConfiguration(format!(
            "server URL must be http(s), got {server_url}"
        )));
    }
    let trimmed = url.path().trim_end_matches('/').to_string();
    url.set_path(&trimmed);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn origin_url(url: &Url) -> Result<Url> {
    Url::parse(&url.origin().ascii_serialization())
        .map_err(|err| Error::InvalidConfiguration(format!("URL has no usable origin: {err}")))
}

/// `<origin of url>/.well-known/<name><path-suffix>`
fn join_well_known(url: &Url, name: &str, path_suffix: &str) -> Result<Url> {
    let origin = url.origin().ascii_serialization();
    Url::parse(&format!("{origin}/.well-known/{name}{path_suffix}"))
        .map_err(|err| Error::InvalidConfiguration(format!("malformed well-known URL: {err}")))
}

/// Candidate authorization-server metadata locations, in probe order.
///
/// Path-scoped variants (both the RFC 8414 and the OIDC well-known names,
/// preserving the candidate's path suffix) come first when the candidate has
/// a non-root path, then the root-level variants, then the legacy
/// path-appended OIDC location. Duplicates collapse, so a root-path
/// candidate yields exactly two URLs.
fn candidate_metadata_urls(candidate: &Url) -> Result<Vec<Url>> {
    let path = candidate.path().trim_end_matches('/').to_string();
    let mut candidates: Vec<Url> = Vec::with_capacity(5);
    let mut push = |url: Url| {
        if !candidates.contains(&url) {
            candidates.push(url);
        }
    };

    if !path.is_empty() && path != "/" {
        push(join_well_known(candidate, "oauth-authorization-server", &path)?);
        push(join_well_known(candidate, "openid-configuration", &path)?);
    }
    push(join_well_known(candidate, "oauth-authorization-server", "")?);
    push(join_well_known(candidate, "openid-configuration", "")?);

    let appended = format!(
        "{}/.well-known/openid-configuration",
        candidate.as_str().trim_end_matches('/')
    );
    if let Ok(url) = Url::parse(&appended) {
        push(url);
    }

    Ok(candidates)
}

/// Exact-match issuer validation: the declared issuer must equal the
/// candidate URL or its origin (modulo a trailing slash). Anything else is
/// treated as untrusted metadata.
fn issuer_matches(issuer: &str, candidate: &Url) -> bool {
    let issuer = issuer.trim_end_matches('/');
    let full = candidate.as_str().trim_end_matches('/');
    let origin = candidate.origin().ascii_serialization();
    issuer == full || issuer == origin.trim_end_matches('/')
}
