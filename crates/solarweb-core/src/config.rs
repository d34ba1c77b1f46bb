// ── Runtime mirror configuration ──
//
// These types describe *what* to mirror and *how often*. They carry
// credential data and timing, but never touch disk: the binary resolves
// a profile, builds a `MirrorConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use solarweb_api::{AccessKey, ApiContract, Credentials, TlsMode, TransportConfig};
use url::Url;

/// Lower bound for the sweep period.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default proactive refresh period. Tokens live for an hour.
pub const DEFAULT_PROACTIVE_REFRESH: Duration = Duration::from_secs(3500);

/// Default delay before the reactive refresh armed by a 401.
pub const DEFAULT_REACTIVE_REFRESH: Duration = Duration::from_secs(60);

/// Default cooldown before re-login after a failed refresh.
pub const DEFAULT_RELOGIN_BACKOFF: Duration = Duration::from_secs(60);

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification.
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        }
    }
}

/// A user-declared feed appended to the built-in catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSpec {
    /// Mount segment below the device node.
    pub path: String,
    /// URL template relative to the API base (placeholders as in the
    /// built-in catalog: `{id}`, `{aux}`, `{from}`, `{to}`, `{year}`,
    /// `{month}`, `{day}`).
    pub url: String,
    /// Container label; defaults to `path`.
    pub label: Option<String>,
    /// Address array elements by position only.
    pub force_indexed: bool,
    /// Gate the feed behind the paid tier.
    pub pro: bool,
}

/// Configuration for mirroring a single account.
///
/// Built by the CLI, passed to [`Scheduler`](crate::Scheduler). The core
/// never reads config files.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// API base URL (e.g. `https://swqapi.solarweb.com/`).
    pub base_url: Url,
    /// Header contract and feed set.
    pub contract: ApiContract,
    /// Account credentials for `POST iam/jwt`.
    pub credentials: Credentials,
    /// Access-key pair, required by [`ApiContract::AccessKey`].
    pub access_key: Option<AccessKey>,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// Request timeout.
    pub timeout: Duration,
    /// Sweep period; floored to [`MIN_POLL_INTERVAL`].
    pub poll_interval: Duration,
    pub proactive_refresh: Duration,
    pub reactive_refresh_delay: Duration,
    pub relogin_backoff: Duration,
    /// Include the built-in feed catalog for `contract`.
    pub standard_feeds: bool,
    /// Feeds appended after the built-in ones.
    pub extra_feeds: Vec<FeedSpec>,
}

impl MirrorConfig {
    /// A config with default timings for the given account.
    pub fn new(base_url: Url, contract: ApiContract, credentials: Credentials) -> Self {
        Self {
            base_url,
            contract,
            credentials,
            access_key: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(300),
            proactive_refresh: DEFAULT_PROACTIVE_REFRESH,
            reactive_refresh_delay: DEFAULT_REACTIVE_REFRESH,
            relogin_backoff: DEFAULT_RELOGIN_BACKOFF,
            standard_feeds: true,
            extra_feeds: Vec::new(),
        }
    }

    /// The sweep period actually used.
    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: TlsMode::from(&self.tls),
            timeout: self.timeout,
            ..TransportConfig::default()
        }
    }
}

/// Convenience for tests and callers that hold a plain password.
pub fn credentials(username: impl Into<String>, password: impl Into<String>) -> Credentials {
    Credentials {
        username: username.into(),
        password: SecretString::from(password.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MirrorConfig {
        MirrorConfig::new(
            Url::parse("https://swqapi.solarweb.com/").expect("url"),
            ApiContract::Bearer,
            credentials("owner", "secret"),
        )
    }

    #[test]
    fn poll_interval_is_floored() {
        let mut cfg = config();
        cfg.poll_interval = Duration::from_secs(5);
        assert_eq!(cfg.effective_poll_interval(), MIN_POLL_INTERVAL);

        cfg.poll_interval = Duration::from_secs(600);
        assert_eq!(cfg.effective_poll_interval(), Duration::from_secs(600));
    }

    #[test]
    fn transport_carries_tls_and_timeout() {
        let mut cfg = config();
        cfg.tls = TlsVerification::DangerAcceptInvalid;
        cfg.timeout = Duration::from_secs(7);

        let transport = cfg.transport();
        assert!(matches!(transport.tls, TlsMode::DangerAcceptInvalid));
        assert_eq!(transport.timeout, Duration::from_secs(7));
    }
}
