//! Error taxonomy for the authentication core.
//!
//! Each failure domain gets its own enum so callers can route on the class of
//! failure without string-matching: configuration problems are fatal at
//! construction, discovery problems are surfaced (never defaulted), and state
//! or token validation failures are security decisions that must not be
//! retried.

/// Caller misconfiguration, detected eagerly at construction.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Provider metadata could not be fetched or is unusable.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    #[error("discovery request failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("discovery endpoint returned status {status}")]
    Status { status: u16 },
    #[error("discovery document malformed: {0}")]
    Malformed(String),
}

/// CSRF/replay violation on a flow state token. Never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum StateError {
    /// The token was never issued by this process (or its record aged out).
    #[error("unknown state token")]
    Unknown,
    /// The token was already consumed once — a replayed callback.
    #[error("state token already consumed")]
    AlreadyConsumed,
    /// The flow outlived its TTL before the callback arrived.
    #[error("state token expired")]
    Expired,
}

/// Reason an ID token was rejected during validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ValidationFailure {
    #[error("bad signature")]
    BadSignature,
    #[error("issuer mismatch")]
    IssuerMismatch,
    #[error("audience mismatch")]
    AudienceMismatch,
    #[error("token expired")]
    Expired,
    #[error("nonce mismatch")]
    NonceMismatch,
    #[error("nonce claim missing")]
    MissingNonce,
    #[error("no signing key with kid '{0}'")]
    UnknownKey(String),
    #[error("token header has no key id")]
    MissingKeyId,
    #[error("unsupported signing algorithm {0}")]
    UnsupportedAlgorithm(String),
    #[error("token malformed")]
    Malformed,
}

/// Code-for-tokens exchange or token validation failure.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TokenError {
    /// The callback arrived without a required query parameter.
    #[error("missing callback parameter: {0}")]
    MissingParameter(&'static str),
    /// Flow state consumption failed — expired, unknown, or replayed.
    #[error("invalid state: {0}")]
    InvalidState(#[source] StateError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The token endpoint rejected the exchange.
    #[error("token exchange failed with status {status}, provider code {code:?}")]
    ExchangeFailed {
        status: u16,
        code: Option<String>,
        description: Option<String>,
    },
    /// The token endpoint's response body was not a token response.
    #[error("malformed token response: {0}")]
    MalformedResponse(String),
    /// The returned ID token failed validation. No tokens are surfaced.
    #[error("ID token rejected: {0}")]
    InvalidToken(#[source] ValidationFailure),
}

/// Userinfo endpoint failure. Secondary: a session may still be considered
/// authenticated when this fails — the caller decides.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum UserInfoError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("userinfo request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("userinfo endpoint returned status {status}")]
    Status { status: u16, detail: String },
    #[error("userinfo payload malformed: {0}")]
    Malformed(String),
}

/// Session gate failure.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("session store error: {0}")]
    Store(String),
}
