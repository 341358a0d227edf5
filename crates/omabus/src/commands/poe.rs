//! `omabus poe`: apply one PoE command and report the outcome.

use std::sync::Arc;

use omabus_config::Config;
use omabus_core::{CommandOutcome, DiscardPublisher};

use super::Engine;
use crate::cli::{GlobalOpts, PoeArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(args: &PoeArgs, config: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    if !config.features.poe_control {
        return Err(CliError::Validation {
            field: "features.poe_control".into(),
            reason: "PoE control is disabled".into(),
            path: omabus_config::config_path().display().to_string(),
        });
    }

    let engine = Engine::connect(config, Arc::new(DiscardPublisher)).await?;
    let result = apply(&engine, args).await;
    engine.session.shutdown().await;
    result?;

    let state = if args.state.is_on() { "on" } else { "off" };
    output::print_output(
        &format!("{} port {}: PoE {state}", args.device, args.port),
        global.quiet,
    );
    Ok(())
}

async fn apply(engine: &Engine, args: &PoeArgs) -> Result<(), CliError> {
    // The executor needs the port's cached override flag
    engine.poller.refresh_devices().await?;
    engine.poller.refresh_switch_ports(&args.device).await?;

    match engine
        .executor
        .set_port_power(&args.device, args.port, args.state.is_on())
        .await
    {
        CommandOutcome::Applied => Ok(()),
        CommandOutcome::NotReady => Err(CliError::NotReady {
            reason: "site id is not resolved".into(),
        }),
        CommandOutcome::NotFound => Err(CliError::NotFound {
            what: format!("port {} of {}", args.port, args.device),
        }),
        CommandOutcome::Failed { step, error } => Err(CliError::CommandFailed {
            step: step.to_string(),
            message: error,
        }),
    }
}
