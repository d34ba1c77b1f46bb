// ── Core error types ──
//
// The mirror's failure taxonomy. Transport-level errors from
// `solarweb-api` are folded into four kinds: credential, entitlement,
// transient, and projection. Callers branch on the kind, never on
// HTTP status codes.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session errors ───────────────────────────────────────────────
    /// Login rejected or refresh token no longer accepted.
    #[error("Credential error: {message}")]
    Credential { message: String },

    // ── Feed errors ──────────────────────────────────────────────────
    /// The account tier does not include this feed (HTTP 403).
    #[error("Feed '{feed}' is not included in the account's entitlement")]
    Entitlement { feed: String },

    /// Network failure, 5xx, or a body that could not be decoded.
    /// Retried on the next sweep.
    #[error("Transient error: {message}")]
    Transient { message: String },

    /// Reserved: payloads are parsed before projection starts, so a
    /// projection can only fail on a broken sink.
    #[error("Projection error: {message}")]
    Projection { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Returns `true` for errors that the next sweep or timer may clear.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Returns `true` if the account credentials themselves were rejected.
    pub fn is_credential(&self) -> bool {
        matches!(self, Self::Credential { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<solarweb_api::Error> for CoreError {
    fn from(err: solarweb_api::Error) -> Self {
        use solarweb_api::Error as ApiError;

        match err {
            ApiError::Authentication { message } | ApiError::Unauthorized { message } => {
                CoreError::Credential { message }
            }
            ApiError::Forbidden { message } => CoreError::Entitlement { feed: message },
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::Tls(message) | ApiError::InvalidHeader(message) => {
                CoreError::Config { message }
            }
            other @ (ApiError::Transport(_)
            | ApiError::Http { .. }
            | ApiError::Deserialization { .. }) => CoreError::Transient {
                message: other.to_string(),
            },
        }
    }
}
