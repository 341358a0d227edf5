//! `omabus snapshot`: one poll, printed.

use std::sync::Arc;

use omabus_config::Config;
use omabus_core::DiscardPublisher;

use super::Engine;
use crate::cli::{GlobalOpts, SnapshotArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    args: &SnapshotArgs,
    config: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let engine = Engine::connect(config, Arc::new(DiscardPublisher)).await?;
    let result = collect(&engine, args).await;
    engine.session.shutdown().await;

    let entries = result?;
    let rendered = output::render_entries(global.output, &entries, args.ports)?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

async fn collect(
    engine: &Engine,
    args: &SnapshotArgs,
) -> Result<Vec<omabus_core::DeviceEntry>, CliError> {
    engine.poller.refresh_devices().await?;
    if args.ports {
        match args.device.as_deref() {
            Some(key) => engine.poller.refresh_switch_ports(key).await?,
            None => engine.poller.refresh_ports().await?,
        }
    }

    let cache = engine.poller.cache();
    match args.device.as_deref() {
        None => Ok(cache.get_all()),
        Some(key) => cache
            .get_all()
            .into_iter()
            .find(|entry| entry.device.key == key)
            .map(|entry| vec![entry])
            .ok_or_else(|| CliError::NotFound {
                what: format!("device {key}"),
            }),
    }
}
