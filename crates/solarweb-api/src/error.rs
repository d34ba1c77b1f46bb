use thiserror::Error;

/// Top-level error type for the `solarweb-api` crate.
///
/// Covers every failure mode of the Solar.web query API: login and
/// token refresh, transport, HTTP status rejections, and body decoding.
/// `solarweb-core` folds these into its credential / entitlement /
/// transient taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login or token refresh was rejected by the IAM endpoint.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// A bearer-authenticated request returned HTTP 401.
    #[error("Unauthorized (HTTP 401): {message}")]
    Unauthorized { message: String },

    /// A request returned HTTP 403 -- typically an account-tier rejection.
    #[error("Forbidden (HTTP 403): {message}")]
    Forbidden { message: String },

    /// Header value could not be encoded (e.g. token with control chars).
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── HTTP ────────────────────────────────────────────────────────
    /// Any other non-success status.
    #[error("API error (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the bearer token was rejected (HTTP 401).
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns `true` if the request was refused by entitlement (HTTP 403).
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }

    /// Returns `true` if retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Deserialization { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            _ => false,
        }
    }

    /// The HTTP status behind this error, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Forbidden { .. } => Some(403),
            Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
