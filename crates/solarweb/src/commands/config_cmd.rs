//! Config subcommand handlers.

use solarweb_config as config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            println!("{}", super::config_file(global).display());
            Ok(())
        }
        ConfigCommand::Show => {
            let resolved = super::resolve(global)?;
            let rendered = config::render_profile(&resolved.name, &resolved.profile)?;
            print!("{rendered}");
            Ok(())
        }
    }
}
