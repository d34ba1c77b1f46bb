//! Subcommand handlers and the profile resolution they share.

pub mod config_cmd;
pub mod once;
pub mod run;

use std::path::PathBuf;

use solarweb_config::{self as config, Config, ConfigError, Profile};
use solarweb_core::MirrorConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// A loaded config with its active profile picked out.
pub struct Resolved {
    pub name: String,
    pub config: Config,
    pub profile: Profile,
}

impl Resolved {
    pub fn mirror_config(&self) -> Result<MirrorConfig, CliError> {
        Ok(config::profile_to_mirror_config(
            &self.profile,
            &self.name,
            &self.config.defaults,
        )?)
    }
}

pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config::config_path)
}

/// Load the config file and select the profile named by `--profile`,
/// `default_profile`, or "default".
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let path = config_file(global);
    let cfg = config::load_config_from(&path)?;
    let name = config::active_profile_name(global.profile.as_deref(), &cfg);

    let profile = match config::find_profile(&cfg, &name) {
        Ok(profile) => profile.clone(),
        Err(ConfigError::ProfileNotFound { .. }) if cfg.profiles.is_empty() => {
            return Err(CliError::NoConfig {
                path: path.display().to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Resolved {
        name,
        config: cfg,
        profile,
    })
}
