//! CLI error types with miette diagnostics.
//!
//! Maps `ConfigError` and `CoreError` into user-facing errors with
//! actionable help text and a stable exit code.

use miette::Diagnostic;
use thiserror::Error;

use solarweb_config::ConfigError;
use solarweb_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach Solar.web at {url}")]
    #[diagnostic(
        code(solarweb::connection_failed),
        help(
            "Check network access and the profile's base_url.\n\
             {message}"
        )
    )]
    ConnectionFailed { url: String, message: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Login rejected for profile '{profile}'")]
    #[diagnostic(
        code(solarweb::auth_failed),
        help(
            "Verify the username and password. The mirror does not retry a rejected login.\n\
             {message}"
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(solarweb::no_credentials),
        help(
            "Set username and password (or password_env) in the profile,\n\
             or store the password in the keyring under solarweb/{profile}/password."
        )
    )]
    NoCredentials { profile: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(code(solarweb::profile_not_found), help("Available profiles: {available}"))]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(solarweb::no_config),
        help("Create one with a [profiles.default] table.\nExpected at: {path}")
    )]
    NoConfig { path: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(solarweb::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(solarweb::config))]
    Config(Box<figment::Error>),

    // ── Mirror ───────────────────────────────────────────────────────

    #[error("Mirror failed: {message}")]
    #[diagnostic(code(solarweb::mirror))]
    Mirror { message: String },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::ProfileNotFound { .. }
            | Self::NoConfig { .. }
            | Self::Validation { .. }
            | Self::Config(_) => exit_code::CONFIG,
            Self::Mirror { .. } | Self::Io(_) | Self::Json(_) | Self::Yaml(_) => exit_code::GENERAL,
        }
    }

    /// Attach the profile and endpoint the core error happened against.
    pub fn from_core(err: CoreError, profile: &str, url: &str) -> Self {
        match err {
            CoreError::Credential { message } => Self::AuthFailed {
                profile: profile.into(),
                message,
            },
            CoreError::Transient { message } => Self::ConnectionFailed {
                url: url.into(),
                message,
            },
            CoreError::Config { message } => Self::Validation {
                field: "profile".into(),
                reason: message,
            },
            other @ (CoreError::Entitlement { .. } | CoreError::Projection { .. }) => {
                Self::Mirror {
                    message: other.to_string(),
                }
            }
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::ProfileNotFound { name, available } => Self::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            },
            ConfigError::Serialization(e) => Self::Validation {
                field: "config".into(),
                reason: e.to_string(),
            },
            ConfigError::Figment(e) => Self::Config(e),
            ConfigError::Io(e) => Self::Io(e),
        }
    }
}
