use thiserror::Error;

/// Errors produced by the OAuth client core.
///
/// Every fallible operation returns one of these variants; transport and
/// parsing faults never escape as panics. Security-relevant checks (issuer
/// match, state verification) fail closed and report no detail beyond the
/// variant itself.
#[derive(Error, Debug)]
pub enum Error {
    /// No compliant OAuth metadata could be discovered, or a required field
    /// was missing from otherwise valid metadata. The message names the
    /// missing field where applicable.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// The server's metadata does not advertise a registration endpoint.
    /// Expected for servers that only accept pre-configured clients.
    #[error("server does not support dynamic client registration")]
    RegistrationNotSupported,

    /// The registration endpoint rejected the request. Carries the server's
    /// `error`/`error_description` verbatim when available.
    #[error("client registration failed: {0}")]
    Registration(String),

    /// The `state` returned by the authorization server failed verification,
    /// or the pending authorization it belongs to has expired. Deliberately
    /// carries no detail about which check failed.
    #[error("invalid state parameter")]
    StateInvalid,

    /// The token endpoint rejected the authorization-code exchange.
    #[error("token exchange failed: {0}")]
    Exchange(String),

    /// The token endpoint rejected the refresh request.
    #[error("token refresh failed: {0}")]
    Refresh(String),

    /// An outbound call exceeded its configured timeout.
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, Error>;
