// ── PoE command execution ──
//
// Turning a port's PoE on or off is a guarded multi-step sequence:
//
//   1. enable the port's profile override (if it is off), then settle
//   2. set the PoE mode
//   3. re-poll the switch's ports to reconcile with the controller
//
// Steps 1-2 hold the cache's port gate, so a concurrent port refresh
// cannot overwrite the optimistic updates between them.

use std::sync::Arc;
use std::time::Duration;

use strum::Display;
use tracing::{debug, info, warn};

use omabus_api::Method;
use omabus_api::models::{PoeModeRequest, ProfileOverrideRequest};
use omabus_api::paths;

use crate::model::PoeState;
use crate::poller::InventoryPoller;
use crate::session::SessionManager;
use crate::store::StateCache;

/// The remote step a failed command stopped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum CommandStep {
    ProfileOverride,
    PoeMode,
}

/// Result of a PoE command. Commands never raise; every failure is an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The controller accepted every step.
    Applied,
    /// The site id is unresolved; nothing was sent.
    NotReady,
    /// The device or port is not cached; nothing was sent.
    NotFound,
    Failed { step: CommandStep, error: String },
}

impl CommandOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Applies PoE commands against the controller and the cache.
#[derive(Clone)]
pub struct CommandExecutor {
    session: SessionManager,
    cache: Arc<StateCache>,
    poller: InventoryPoller,
    settle_delay: Duration,
}

impl CommandExecutor {
    pub fn new(session: SessionManager, poller: InventoryPoller, settle_delay: Duration) -> Self {
        Self {
            cache: Arc::clone(poller.cache()),
            session,
            poller,
            settle_delay,
        }
    }

    /// Switch PoE on a port on or off.
    pub async fn set_port_power(
        &self,
        device_key: &str,
        port: u32,
        desired_on: bool,
    ) -> CommandOutcome {
        let Some(site) = self.session.site_id() else {
            warn!(device = %device_key, port, "site not resolved, ignoring command");
            return CommandOutcome::NotReady;
        };

        let outcome = {
            let _gate = self.cache.port_gate().await;
            self.apply_locked(&site, device_key, port, desired_on).await
        };
        if !outcome.is_applied() {
            return outcome;
        }

        info!(device = %device_key, port, on = desired_on, "PoE command applied");
        if let Err(e) = self.poller.refresh_switch_ports(device_key).await {
            warn!(device = %device_key, error = %e, "reconciliation refresh failed");
        }
        outcome
    }

    /// Steps 1-2. Caller holds the port gate.
    async fn apply_locked(
        &self,
        site: &str,
        device_key: &str,
        port: u32,
        desired_on: bool,
    ) -> CommandOutcome {
        let (Some(device), Some(current)) =
            (self.cache.device(device_key), self.cache.port(device_key, port))
        else {
            warn!(device = %device_key, port, "unknown device or port");
            return CommandOutcome::NotFound;
        };
        let Some(mac) = device.mac else {
            warn!(device = %device_key, "device has no MAC");
            return CommandOutcome::NotFound;
        };

        if !current.profile_override_enable {
            debug!(device = %device_key, port, "enabling profile override");
            let body = ProfileOverrideRequest {
                profile_override_enable: true,
            };
            if let Err(e) = self
                .session
                .execute(
                    Method::PUT,
                    &paths::port_profile_override(site, &mac, port),
                    &[],
                    Some(&body),
                )
                .await
            {
                warn!(device = %device_key, port, error = %e, "profile override failed");
                return CommandOutcome::Failed {
                    step: CommandStep::ProfileOverride,
                    error: e.to_string(),
                };
            }
            self.cache
                .update_port(device_key, port, |p| p.profile_override_enable = true);
            tokio::time::sleep(self.settle_delay).await;
        }

        let state = PoeState::from(desired_on);
        let body = PoeModeRequest {
            poe_mode: state.as_mode(),
        };
        if let Err(e) = self
            .session
            .execute(
                Method::PUT,
                &paths::port_poe_mode(site, &mac, port),
                &[],
                Some(&body),
            )
            .await
        {
            warn!(device = %device_key, port, error = %e, "PoE mode change failed");
            return CommandOutcome::Failed {
                step: CommandStep::PoeMode,
                error: e.to_string(),
            };
        }
        self.cache.update_port(device_key, port, |p| p.poe_state = state);
        CommandOutcome::Applied
    }
}
