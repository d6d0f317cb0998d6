//! OAuth 2.1 client subsystem for remote MCP servers.
//!
//! Implements the client half of the MCP authorization model:
//!
//! - Metadata discovery with a multi-standard fallback chain (RFC 9728
//!   protected-resource metadata, RFC 8414 authorization-server metadata,
//!   OpenID Connect Discovery) and strict issuer validation
//! - Dynamic registration of a public client (RFC 7591)
//! - Authorization code flow with PKCE (RFC 7636, S256 only)
//! - HMAC-signed `state` tokens with a bounded replay window
//! - Token exchange and refresh, honoring refresh-token rotation
//!
//! The pieces are usable individually ([`DiscoveryClient`],
//! [`RegistrationClient`], [`StateCodec`]) or through the [`OAuthConnector`]
//! facade, which threads the caller's configuration and metadata cache
//! through the whole flow.
//!
//! ## Standards compliance
//!
//! - OAuth 2.0 (RFC 6749) and the OAuth 2.1 PKCE requirement (RFC 7636)
//! - OAuth 2.0 Dynamic Client Registration (RFC 7591)
//! - OAuth 2.0 Authorization Server Metadata (RFC 8414)
//! - OAuth 2.0 Protected Resource Metadata (RFC 9728)
//!
//! RFC 8707 resource indicators are deliberately not sent; a number of
//! third-party authorization servers reject requests carrying them.

mod connector;
mod discovery;
mod pkce;
mod records;
mod registration;
mod state;

pub use connector::{AuthorizationRedirect, ConnectorConfig, OAuthConnector};
pub use discovery::{
    AuthorizationServerMetadata, DiscoveryClient, MetadataCache, OAuthMetadata,
    ProtectedResourceMetadata,
};
pub use pkce::PkceChallenge;
pub use records::{PENDING_AUTHORIZATION_TTL, PendingAuthorization, RegisteredClient, TokenSet};
pub use registration::{ClientRegistrationRequest, ClientRegistrationResponse, RegistrationClient};
pub use state::{STATE_MAX_AGE_MS, StateCodec, StatePayload};

use crate::error::Error;

/// Map a reqwest failure to the typed taxonomy, distinguishing timeouts.
pub(crate) fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout
    } else {
        Error::Transport(err.to_string())
    }
}
