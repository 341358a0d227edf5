// ── Inventory poller ──
//
// Two independent schedules feed the state cache: the device list
// (slow) and per-switch port lists (fast). Every write is followed by
// publications; every failure is logged and the next tick runs anyway.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use omabus_api::Method;
use omabus_api::models::SwitchDetail;
use omabus_api::paths;

use crate::config::SyncConfig;
use crate::convert::port_from_record;
use crate::error::CoreError;
use crate::model::{Device, Port};
use crate::publish::{Publication, Publisher};
use crate::session::SessionManager;
use crate::store::{StateCache, SwitchRef};
use crate::topics::Topics;

/// Keeps the [`StateCache`] in step with the controller.
///
/// Cheaply cloneable; clones share the schedules started by
/// [`start`](Self::start).
#[derive(Clone)]
pub struct InventoryPoller {
    inner: Arc<PollerInner>,
}

struct PollerInner {
    session: SessionManager,
    cache: Arc<StateCache>,
    publisher: Arc<dyn Publisher>,
    topics: Topics,
    config: SyncConfig,
    /// Child token for the running schedules, replaced on every start.
    cancel: Mutex<CancellationToken>,
    task_handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl InventoryPoller {
    pub fn new(
        session: SessionManager,
        cache: Arc<StateCache>,
        publisher: Arc<dyn Publisher>,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                topics: Topics::new(config.base_topic.clone()),
                session,
                cache,
                publisher,
                config,
                cancel: Mutex::new(CancellationToken::new()),
                task_handles: tokio::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<StateCache> {
        &self.inner.cache
    }

    pub fn topics(&self) -> &Topics {
        &self.inner.topics
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Run one device pass and one port pass, then spawn both schedules.
    pub async fn start(&self) {
        log_refresh("initial device refresh", self.refresh_devices().await.map(drop));
        log_refresh("initial port refresh", self.refresh_ports().await);

        let cancel = {
            let mut slot = self.inner.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            slot.cancel();
            *slot = CancellationToken::new();
            slot.clone()
        };

        let mut handles = self.inner.task_handles.lock().await;
        handles.push(tokio::spawn(device_task(
            self.clone(),
            self.inner.config.device_interval,
            cancel.clone(),
        )));
        handles.push(tokio::spawn(port_task(
            self.clone(),
            self.inner.config.port_interval,
            cancel,
        )));
        info!(
            device_interval_secs = self.inner.config.device_interval.as_secs(),
            port_interval_secs = self.inner.config.port_interval.as_secs(),
            "polling started"
        );
    }

    /// Cancel both schedules and wait for them to finish.
    pub async fn stop(&self) {
        self.inner
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("polling stopped");
    }

    // ── Device refresh ───────────────────────────────────────────

    /// Fetch the device list, update the cache, publish one snapshot per
    /// device, then prune devices the controller no longer reports.
    ///
    /// Returns the number of devices kept.
    pub async fn refresh_devices(&self) -> Result<usize, CoreError> {
        let site = self.inner.session.require_site()?;
        let records: Vec<serde_json::Value> = self
            .inner
            .session
            .paginate(&paths::devices(&site), self.inner.config.page_size)
            .await?;
        debug!(count = records.len(), "devices listed");

        let mut seen = HashSet::with_capacity(records.len());
        for record in records {
            let device = match Device::try_from(record) {
                Ok(device) => device,
                Err(e) => {
                    warn!(error = %e, "skipping device");
                    continue;
                }
            };
            if !self.inner.config.includes(&device.key) {
                debug!(device = %device.key, "not in include filter");
                continue;
            }

            let topic = self.inner.topics.device(device.device_type, &device.key);
            let raw = device.raw.clone();
            seen.insert(device.key.clone());
            self.inner.cache.replace_device(device);
            self.publish(topic, &raw).await;
        }

        let removed = self.inner.cache.retain_devices(&seen);
        if !removed.is_empty() {
            info!(devices = ?removed, "pruned devices no longer reported");
        }
        Ok(seen.len())
    }

    // ── Port refresh ─────────────────────────────────────────────

    /// Refresh every cached switch. One switch failing does not stop
    /// the rest.
    pub async fn refresh_ports(&self) -> Result<(), CoreError> {
        let site = self.inner.session.require_site()?;
        for switch in self.inner.cache.switches() {
            if let Err(e) = self.refresh_switch(&site, &switch).await {
                warn!(device = %switch.key, error = %e, "port refresh failed");
            }
        }
        Ok(())
    }

    /// Out-of-schedule port refresh for one device.
    pub async fn refresh_switch_ports(&self, key: &str) -> Result<(), CoreError> {
        let site = self.inner.session.require_site()?;
        let switch = self
            .inner
            .cache
            .switches()
            .into_iter()
            .find(|s| s.key == key)
            .ok_or_else(|| CoreError::NotFound {
                what: format!("switch {key}"),
            })?;
        self.refresh_switch(&site, &switch).await
    }

    async fn refresh_switch(&self, site: &str, switch: &SwitchRef) -> Result<(), CoreError> {
        let Some(mac) = switch.mac.as_deref() else {
            warn!(device = %switch.key, "switch has no MAC, skipping");
            return Ok(());
        };

        let detail: SwitchDetail = self
            .inner
            .session
            .request::<_, ()>(Method::GET, &paths::switch(site, mac), &[], None)
            .await?;

        let Some(records) = detail.port_list else {
            return Err(CoreError::Malformed {
                message: format!("switch {} returned no port list", switch.key),
            });
        };
        let ports: Vec<Port> = records
            .iter()
            .map(|record| port_from_record(record, switch.poe_capable))
            .collect();

        {
            let _gate = self.inner.cache.port_gate().await;
            if !self.inner.cache.replace_ports(&switch.key, ports.clone()) {
                debug!(device = %switch.key, "device left the cache during refresh");
                return Ok(());
            }
        }

        for port in &ports {
            for (field, value) in port.fields() {
                let topic = self.inner.topics.port_field(&switch.key, port.number, field);
                self.publish(topic, &value).await;
            }
        }
        debug!(device = %switch.key, ports = ports.len(), "ports refreshed");
        Ok(())
    }

    // ── Private helpers ──────────────────────────────────────────

    async fn publish<T: Serialize + ?Sized>(&self, topic: String, value: &T) {
        let publication = match Publication::json(topic, value) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to encode publication");
                return;
            }
        };
        let topic = publication.topic.clone();
        if let Err(e) = self.inner.publisher.publish(publication).await {
            warn!(topic = %topic, error = %e, "publish failed");
        }
    }
}

fn log_refresh(what: &str, result: Result<(), CoreError>) {
    match result {
        Ok(()) => {}
        Err(CoreError::NotReady { reason }) => debug!(reason = %reason, "{what} skipped"),
        Err(e) => warn!(error = %e, "{what} failed"),
    }
}

// ── Background tasks ─────────────────────────────────────────────

async fn device_task(poller: InventoryPoller, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                log_refresh("device refresh", poller.refresh_devices().await.map(drop));
            }
        }
    }
}

async fn port_task(poller: InventoryPoller, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                log_refresh("port refresh", poller.refresh_ports().await);
            }
        }
    }
}
