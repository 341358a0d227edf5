//! Command dispatch: builds the sync engine from config and hands it to
//! the selected handler.

pub mod config_cmd;
pub mod poe;
pub mod run;
pub mod snapshot;

use std::sync::Arc;

use omabus_config::Config;
use omabus_core::{
    CommandExecutor, InventoryPoller, Publisher, SessionManager, StateCache, SyncConfig,
};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a controller-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, config: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Run => run::handle(config).await,
        Command::Snapshot(args) => snapshot::handle(&args, config, global).await,
        Command::Poe(args) => poe::handle(&args, config, global).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "command does not need a controller".into(),
        )),
    }
}

/// Session, poller and executor wired to one publisher.
pub struct Engine {
    pub session: SessionManager,
    pub poller: InventoryPoller,
    pub executor: CommandExecutor,
    pub sync: SyncConfig,
}

impl Engine {
    /// Build the engine and authenticate. Nothing is polled yet.
    pub async fn connect(config: &Config, publisher: Arc<dyn Publisher>) -> Result<Self, CliError> {
        let controller = omabus_config::to_controller_config(config)?;
        let sync = omabus_config::to_sync_config(config);

        let session = SessionManager::new(&controller)?;
        session.authenticate().await?;

        let cache = Arc::new(StateCache::new());
        let poller = InventoryPoller::new(session.clone(), cache, publisher, sync.clone());
        let executor = CommandExecutor::new(session.clone(), poller.clone(), sync.settle_delay);
        Ok(Self {
            session,
            poller,
            executor,
            sync,
        })
    }
}
