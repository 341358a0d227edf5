//! `omabus run`: the long-running bridge.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use omabus_config::Config;
use omabus_core::SessionState;

use super::Engine;
use crate::error::CliError;
use crate::mqtt;

const STOP_GRACE: Duration = Duration::from_secs(10);

enum Exit {
    Interrupted,
    SessionFailed,
    BusStopped,
}

pub async fn handle(config: &Config) -> Result<(), CliError> {
    let (publisher, eventloop) = mqtt::connect(&config.mqtt);
    let engine = Engine::connect(config, Arc::new(publisher.clone())).await?;
    let topics = engine.poller.topics().clone();

    // The event loop must be draining before the first publication.
    let cancel = CancellationToken::new();
    let commands = if config.features.poe_control {
        Some(engine.executor.clone())
    } else {
        info!("PoE control disabled, not subscribing to command topics");
        None
    };
    let mut bus = tokio::spawn(mqtt::run_event_loop(
        eventloop,
        publisher.client().clone(),
        topics,
        commands,
        cancel.child_token(),
    ));

    engine.poller.start().await;
    info!(base_topic = %engine.sync.base_topic, "bridge running");

    let mut state = engine.session.state();
    let exit = tokio::select! {
        _ = tokio::signal::ctrl_c() => Exit::Interrupted,
        _ = state.wait_for(|s| *s == SessionState::Failed) => Exit::SessionFailed,
        _ = &mut bus => Exit::BusStopped,
    };

    match exit {
        Exit::Interrupted => info!("interrupted, shutting down"),
        Exit::SessionFailed => error!("session failed permanently, shutting down"),
        Exit::BusStopped => warn!("MQTT event loop ended unexpectedly"),
    }

    // A poll blocked on a full MQTT queue does not observe cancellation
    if tokio::time::timeout(STOP_GRACE, engine.poller.stop()).await.is_err() {
        warn!("polling did not stop in time");
    }
    cancel.cancel();
    if !bus.is_finished() {
        let _ = bus.await;
    }
    engine.session.shutdown().await;

    match exit {
        Exit::Interrupted => Ok(()),
        Exit::SessionFailed => Err(CliError::SessionFailed),
        Exit::BusStopped => Err(CliError::Mqtt {
            message: "event loop stopped".into(),
        }),
    }
}
