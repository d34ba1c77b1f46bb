//! Shared configuration for the solarweb binary.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `solarweb_core::MirrorConfig`. The core never reads
//! config files; everything it needs arrives through this crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use solarweb_core::store::sanitize_segment;
use solarweb_core::{
    AccessKey, ApiContract, Credentials, DEFAULT_BASE_URL, FeedSpec, MIN_POLL_INTERVAL,
    MirrorConfig, TlsVerification,
};

/// Keyring service name. Entries are `{profile}/password` and
/// `{profile}/access-key`.
pub const KEYRING_SERVICE: &str = "solarweb";

/// Prefix for environment overrides (`SOLARWEB_PROFILES__HOME__USERNAME`).
pub const ENV_PREFIX: &str = "SOLARWEB_";

const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found in configuration")]
    ProfileNotFound { name: String, available: Vec<String> },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    /// Sweep period in minutes.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: f64,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub insecure: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            interval_minutes: default_interval_minutes(),
            timeout: default_timeout(),
            insecure: false,
        }
    }
}

fn default_output() -> String {
    "json".into()
}
fn default_interval_minutes() -> f64 {
    5.0
}
fn default_timeout() -> u64 {
    30
}

/// A named Solar.web account profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Account login (usually an email address).
    pub username: Option<String>,

    /// Password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Header contract: "access-key" or "bearer".
    #[serde(default = "default_api_profile")]
    pub api_profile: String,

    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Access-key id for the "access-key" contract.
    pub access_key_id: Option<String>,

    /// Access-key value (plaintext, prefer keyring or env var).
    pub access_key_value: Option<String>,

    /// Environment variable name containing the access-key value.
    pub access_key_env: Option<String>,

    /// Override the sweep period (minutes).
    pub interval_minutes: Option<f64>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Write the mirrored tree here after every sweep.
    pub snapshot_file: Option<PathBuf>,

    /// Feeds appended to the built-in catalog.
    #[serde(default)]
    pub feeds: Vec<FeedEntry>,
}

fn default_api_profile() -> String {
    "access-key".into()
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

/// `[[profiles.<name>.feeds]]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FeedEntry {
    pub path: String,
    pub url: String,
    pub label: Option<String>,
    #[serde(default)]
    pub force_indexed: bool,
    #[serde(default)]
    pub pro: bool,
}

impl Profile {
    /// Copy with every secret replaced, for display.
    pub fn redacted(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| REDACTED.to_owned());
        Self {
            password: mask(&self.password),
            access_key_value: mask(&self.access_key_value),
            ..self.clone()
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "solarweb", "solarweb").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("solarweb");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment. A missing file yields
/// the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// TOML rendering of a profile with secrets masked (`config show`).
pub fn render_profile(name: &str, profile: &Profile) -> Result<String, ConfigError> {
    let mut shown = HashMap::new();
    shown.insert(name.to_owned(), profile.redacted());
    let doc = Config {
        default_profile: Some(name.to_owned()),
        defaults: Defaults::default(),
        profiles: shown,
    };
    Ok(toml::to_string_pretty(&doc)?)
}

/// Pick the profile: explicit name, then `default_profile`, then "default".
pub fn active_profile_name(explicit: Option<&str>, cfg: &Config) -> String {
    explicit
        .map(str::to_owned)
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Look up a profile by name.
pub fn find_profile<'a>(cfg: &'a Config, name: &str) -> Result<&'a Profile, ConfigError> {
    cfg.profiles.get(name).ok_or_else(|| {
        let mut available: Vec<String> = cfg.profiles.keys().cloned().collect();
        available.sort();
        ConfigError::ProfileNotFound {
            name: name.into(),
            available,
        }
    })
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_secret(profile_name: &str, kind: &str) -> Option<SecretString> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/{kind}")).ok()?;
    entry.get_password().ok().map(SecretString::from)
}

/// Resolve account credentials: named env var, keyring, plaintext.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<Credentials, ConfigError> {
    let username = profile
        .username
        .clone()
        .or_else(|| std::env::var("SOLARWEB_USERNAME").ok())
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })?;

    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Ok(pw) = std::env::var(env_name) {
            return Ok(Credentials {
                username,
                password: SecretString::from(pw),
            });
        }
    }

    // 2. System keyring
    if let Some(password) = keyring_secret(profile_name, "password") {
        return Ok(Credentials { username, password });
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(Credentials {
            username,
            password: SecretString::from(pw.clone()),
        });
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Resolve the access-key pair required by the "access-key" contract.
pub fn resolve_access_key(profile: &Profile, profile_name: &str) -> Result<AccessKey, ConfigError> {
    let id = profile
        .access_key_id
        .clone()
        .ok_or_else(|| ConfigError::Validation {
            field: "access_key_id".into(),
            reason: format!("profile '{profile_name}' uses the access-key contract but has no id"),
        })?;

    if let Some(ref env_name) = profile.access_key_env {
        if let Ok(value) = std::env::var(env_name) {
            return Ok(AccessKey {
                id,
                value: SecretString::from(value),
            });
        }
    }

    if let Some(value) = keyring_secret(profile_name, "access-key") {
        return Ok(AccessKey { id, value });
    }

    if let Some(ref value) = profile.access_key_value {
        return Ok(AccessKey {
            id,
            value: SecretString::from(value.clone()),
        });
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

pub fn parse_contract(raw: &str) -> Result<ApiContract, ConfigError> {
    match raw {
        "access-key" => Ok(ApiContract::AccessKey),
        "bearer" => Ok(ApiContract::Bearer),
        other => Err(ConfigError::Validation {
            field: "api_profile".into(),
            reason: format!("expected 'access-key' or 'bearer', got '{other}'"),
        }),
    }
}

/// Minutes to a sweep period, floored to [`MIN_POLL_INTERVAL`].
pub fn poll_interval(minutes: f64) -> Result<Duration, ConfigError> {
    let period = Duration::try_from_secs_f64(minutes * 60.0).map_err(|_| {
        ConfigError::Validation {
            field: "interval_minutes".into(),
            reason: format!("expected a non-negative number of minutes, got {minutes}"),
        }
    })?;
    Ok(period.max(MIN_POLL_INTERVAL))
}

fn feed_spec(entry: &FeedEntry) -> Result<FeedSpec, ConfigError> {
    let path = sanitize_segment(&entry.path).ok_or_else(|| ConfigError::Validation {
        field: "feeds.path".into(),
        reason: format!("'{}' is not a usable node name", entry.path),
    })?;
    if entry.url.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "feeds.url".into(),
            reason: format!("feed '{path}' has an empty url"),
        });
    }
    Ok(FeedSpec {
        path,
        url: entry.url.clone(),
        label: entry.label.clone(),
        force_indexed: entry.force_indexed,
        pro: entry.pro,
    })
}

/// Build a `MirrorConfig` from a profile and the global defaults.
pub fn profile_to_mirror_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<MirrorConfig, ConfigError> {
    let base_url: url::Url = profile
        .base_url
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "base_url".into(),
            reason: format!("invalid URL: {}", profile.base_url),
        })?;

    let contract = parse_contract(&profile.api_profile)?;
    let credentials = resolve_credentials(profile, profile_name)?;
    let access_key = if contract.requires_access_key() {
        Some(resolve_access_key(profile, profile_name)?)
    } else {
        None
    };

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let extra_feeds = profile
        .feeds
        .iter()
        .map(feed_spec)
        .collect::<Result<Vec<_>, _>>()?;

    let mut config = MirrorConfig::new(base_url, contract, credentials);
    config.access_key = access_key;
    config.tls = tls;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.poll_interval =
        poll_interval(profile.interval_minutes.unwrap_or(defaults.interval_minutes))?;
    config.extra_feeds = extra_feeds;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn bearer_profile() -> Profile {
        Profile {
            username: Some("owner@example.com".into()),
            password: Some("hunter2".into()),
            api_profile: "bearer".into(),
            base_url: default_base_url(),
            ..Profile::default()
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("default"));
        assert!(cfg.profiles.is_empty());
        assert_eq!(cfg.defaults.timeout, 30);
    }

    #[test]
    fn parses_profile_with_feeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"
default_profile = "home"

[defaults]
interval_minutes = 2.0

[profiles.home]
username = "owner@example.com"
password = "hunter2"
api_profile = "bearer"
snapshot_file = "/var/lib/solarweb/tree.json"

[[profiles.home.feeds]]
path = "battery"
url = "pvsystems/{id}/aggdata?from={from}"
label = "Battery"
"#,
        );

        let cfg = load_config_from(&path).unwrap();
        let profile = cfg.profiles.get("home").unwrap();
        assert_eq!(active_profile_name(None, &cfg), "home");
        assert_eq!(profile.base_url, DEFAULT_BASE_URL);
        assert_eq!(profile.feeds.len(), 1);
        assert_eq!(profile.feeds[0].label.as_deref(), Some("Battery"));
        assert!(!profile.feeds[0].pro);

        let mirror = profile_to_mirror_config(profile, "home", &cfg.defaults).unwrap();
        assert_eq!(mirror.contract, ApiContract::Bearer);
        assert_eq!(mirror.poll_interval, Duration::from_secs(120));
        assert_eq!(mirror.extra_feeds[0].path, "battery");
        assert!(mirror.access_key.is_none());
    }

    #[test]
    fn interval_is_floored_to_half_a_minute() {
        assert_eq!(poll_interval(0.1).unwrap(), MIN_POLL_INTERVAL);
        assert_eq!(poll_interval(0.0).unwrap(), MIN_POLL_INTERVAL);
        assert_eq!(poll_interval(1.5).unwrap(), Duration::from_secs(90));
        assert!(poll_interval(-1.0).is_err());
        assert!(poll_interval(f64::NAN).is_err());
    }

    #[test]
    fn unknown_contract_is_rejected() {
        let err = parse_contract("oauth").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "api_profile"));
    }

    #[test]
    fn access_key_contract_requires_id() {
        let profile = Profile {
            api_profile: "access-key".into(),
            access_key_value: Some("secret".into()),
            ..bearer_profile()
        };
        let err = profile_to_mirror_config(&profile, "t", &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "access_key_id"));
    }

    #[test]
    fn access_key_from_plaintext() {
        let profile = Profile {
            api_profile: "access-key".into(),
            access_key_id: Some("FKIA-1".into()),
            access_key_value: Some("secret".into()),
            ..bearer_profile()
        };
        let mirror = profile_to_mirror_config(&profile, "t", &Defaults::default()).unwrap();
        let key = mirror.access_key.unwrap();
        assert_eq!(key.id, "FKIA-1");
        assert_eq!(key.value.expose_secret(), "secret");
    }

    #[test]
    fn missing_username_is_no_credentials() {
        let profile = Profile {
            username: None,
            ..bearer_profile()
        };
        // Only meaningful when the fallback env var is not set.
        if std::env::var("SOLARWEB_USERNAME").is_err() {
            let err = resolve_credentials(&profile, "t").unwrap_err();
            assert!(matches!(err, ConfigError::NoCredentials { .. }));
        }
    }

    #[test]
    fn insecure_and_ca_cert_select_tls_mode() {
        let insecure = Profile {
            insecure: Some(true),
            ..bearer_profile()
        };
        let mirror = profile_to_mirror_config(&insecure, "t", &Defaults::default()).unwrap();
        assert_eq!(mirror.tls, TlsVerification::DangerAcceptInvalid);

        let custom = Profile {
            ca_cert: Some("/etc/ssl/solarweb.pem".into()),
            ..bearer_profile()
        };
        let mirror = profile_to_mirror_config(&custom, "t", &Defaults::default()).unwrap();
        assert_eq!(
            mirror.tls,
            TlsVerification::CustomCa("/etc/ssl/solarweb.pem".into())
        );
    }

    #[test]
    fn bad_feed_path_is_rejected() {
        let profile = Profile {
            feeds: vec![FeedEntry {
                path: "   ".into(),
                url: "pvsystems/{id}/x".into(),
                label: None,
                force_indexed: false,
                pro: false,
            }],
            ..bearer_profile()
        };
        let err = profile_to_mirror_config(&profile, "t", &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "feeds.path"));
    }

    #[test]
    fn redacted_masks_secrets() {
        let profile = Profile {
            access_key_value: Some("secret".into()),
            ..bearer_profile()
        };
        let shown = profile.redacted();
        assert_eq!(shown.password.as_deref(), Some(REDACTED));
        assert_eq!(shown.access_key_value.as_deref(), Some(REDACTED));
        assert_eq!(shown.username, profile.username);
    }

    #[test]
    fn unknown_profile_lists_available() {
        let mut cfg = Config::default();
        cfg.profiles.insert("home".into(), bearer_profile());
        let err = find_profile(&cfg, "cabin").unwrap_err();
        match err {
            ConfigError::ProfileNotFound { available, .. } => assert_eq!(available, vec!["home"]),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rendered_profile_reloads_without_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let rendered = render_profile("home", &bearer_profile()).unwrap();
        assert!(!rendered.contains("hunter2"));

        let path = write(&dir, &rendered);
        let loaded = load_config_from(&path).unwrap();
        let home = loaded.profiles.get("home").unwrap();
        assert_eq!(home.username.as_deref(), Some("owner@example.com"));
        assert_eq!(home.password.as_deref(), Some(REDACTED));
    }
}
