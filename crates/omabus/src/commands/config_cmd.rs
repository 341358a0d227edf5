//! Config subcommand handlers.

use omabus_config::{Config, ConfigError};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub fn handle(
    args: &ConfigArgs,
    config: Result<Config, ConfigError>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            let path = global
                .config
                .clone()
                .unwrap_or_else(omabus_config::config_path);
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }
        ConfigCommand::Show => {
            let rendered = omabus_config::redacted_toml(&config?)?;
            output::print_output(rendered.trim_end(), global.quiet);
            Ok(())
        }
    }
}
