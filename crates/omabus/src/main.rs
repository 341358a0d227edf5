mod cli;
mod commands;
mod error;
mod mqtt;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use omabus_config::{Config, ConfigError, LogSection};

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging settings come from the config; a broken config is reported by `run`
    let config = omabus_config::load_config(cli.global.config.as_deref());
    let log = config.as_ref().map(|c| c.log.clone()).unwrap_or_default();
    init_tracing(cli.global.verbose, &log);

    if let Err(err) = run(cli, config).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// `RUST_LOG` wins; otherwise `-v` flags, otherwise `log.level`.
fn init_tracing(verbosity: u8, log: &LogSection) {
    let filter = match verbosity {
        0 => log.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli, config: Result<Config, ConfigError>) -> Result<(), CliError> {
    match cli.command {
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "omabus", &mut std::io::stdout());
            Ok(())
        }

        Command::Config(args) => commands::config_cmd::handle(&args, config, &cli.global),

        cmd => {
            let config = config?;
            config.validate()?;
            tracing::debug!(command = ?cmd, "dispatching command");
            commands::dispatch(cmd, &config, &cli.global).await
        }
    }
}
