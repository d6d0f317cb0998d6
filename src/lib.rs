//! # mcp-connect
//!
//! OAuth 2.1 client core for connecting a host application to remote MCP
//! servers. Given nothing but a server's base URL, this crate discovers how
//! to authenticate against it, registers as a client when the server allows
//! it, drives the authorization-code-with-PKCE flow, and exchanges or
//! refreshes tokens — without any per-server credentials being provisioned
//! ahead of time.
//!
//! ## Overview
//!
//! The crate is organised as a set of small, stateless services plus a
//! facade that wires them together:
//!
//! - **Discovery** walks the well-known metadata endpoints (RFC 9728,
//!   RFC 8414, OpenID Connect Discovery) with a strict fallback chain and
//!   issuer validation, producing combined [`OAuthMetadata`].
//! - **Registration** performs RFC 7591 dynamic registration of a public
//!   client when the server advertises a registration endpoint.
//! - **Authorization** builds the redirect URL with a fresh PKCE pair and an
//!   HMAC-signed, replay-bounded `state` parameter.
//! - **Token exchange / refresh** turn an authorization code or a stored
//!   refresh token into a [`TokenSet`].
//!
//! Storage is the caller's job: the crate hands back a
//! [`PendingAuthorization`] to persist before the redirect and a
//! [`TokenSet`] to persist afterwards, and never retains token material
//! itself.
//!
//! ## Quick example
//!
//! ```no_run
//! use mcp_connect::{ConnectorConfig, OAuthConnector};
//!
//! #[tokio::main]
//! async fn main() -> mcp_connect::Result<()> {
//!     let config = ConnectorConfig::new(
//!         "Example Host",
//!         "http://localhost:8080/oauth/callback",
//!         b"state-signing-secret".to_vec(),
//!     );
//!     let connector = OAuthConnector::new(config)?;
//!
//!     let metadata = connector.discover("https://mcp.example.com").await?;
//!     let client = connector.register_client(&metadata, None).await?;
//!     let redirect =
//!         connector.begin_authorization(&metadata, &client.client_id, "server-1", None)?;
//!
//!     // Persist `redirect.pending`, send the user to `redirect.url`. When the
//!     // callback arrives, look the pending record up by the decoded session
//!     // id and call `complete_authorization` with the returned code + state.
//!     # let _ = redirect;
//!     Ok(())
//! }
//! ```

mod error;

pub mod auth;

pub use auth::{
    AuthorizationRedirect, AuthorizationServerMetadata, ClientRegistrationRequest,
    ConnectorConfig, DiscoveryClient, MetadataCache, OAuthConnector, OAuthMetadata,
    PendingAuthorization, PkceChallenge, ProtectedResourceMetadata, RegisteredClient,
    RegistrationClient, StateCodec, StatePayload, TokenSet,
};
pub use error::{Error, Result};
