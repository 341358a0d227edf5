// ── Runtime configuration ──
//
// These types describe how to reach the controller and how the sync
// engine schedules its work. They never touch disk: the binary builds
// them from `omabus-config` and hands them in.

use std::time::Duration;

use omabus_api::{ClientCredentials, TlsMode, TransportConfig};
use secrecy::SecretString;
use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification. Default, since controllers ship self-signed certs.
    #[default]
    DangerAcceptInvalid,
}

/// Everything the [`SessionManager`](crate::SessionManager) needs.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Controller root URL (e.g., `https://10.0.0.2:8043`).
    pub url: Url,
    /// Controller instance id (`omadacId`).
    pub omadac_id: String,
    /// OpenAPI application client id.
    pub client_id: String,
    /// OpenAPI application client secret.
    pub client_secret: SecretString,
    /// Human-readable site name, resolved to a site id on authentication.
    pub site: String,
    pub tls: TlsVerification,
    /// Applied to every remote call.
    pub timeout: Duration,
    pub renewal: RenewalPolicy,
}

impl ControllerConfig {
    pub fn new(
        url: Url,
        omadac_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
    ) -> Self {
        Self {
            url,
            omadac_id: omadac_id.into(),
            client_id: client_id.into(),
            client_secret,
            site: "Default".into(),
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            renewal: RenewalPolicy::default(),
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        TransportConfig {
            tls,
            timeout: self.timeout,
        }
    }

    pub(crate) fn credentials(&self) -> ClientCredentials {
        ClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }
}

/// Bounded retry policy for background token renewal.
///
/// A round is one `renew()` call (refresh grant, then full
/// re-authentication). After `max_attempts` consecutive failed rounds
/// the session enters [`SessionState::Failed`](crate::SessionState::Failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalPolicy {
    pub max_attempts: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_initial: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }
}

impl RenewalPolicy {
    /// Delay before retry number `attempt` (1-based): doubles from
    /// `backoff_initial`, capped at `backoff_max`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.backoff_initial
            .saturating_mul(1_u32 << exp)
            .min(self.backoff_max)
    }
}

/// Scheduling and filtering knobs for the poller and executor.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Topic prefix for every publication.
    pub base_topic: String,
    pub device_interval: Duration,
    pub port_interval: Duration,
    /// Pause between enabling a port's profile override and changing its PoE mode.
    pub settle_delay: Duration,
    /// When non-empty, only these normalized device keys are cached and published.
    pub include_devices: Vec<String>,
    pub page_size: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_topic: "omada".into(),
            device_interval: Duration::from_secs(60),
            port_interval: Duration::from_secs(5),
            settle_delay: Duration::from_millis(300),
            include_devices: Vec::new(),
            page_size: 100,
        }
    }
}

impl SyncConfig {
    pub(crate) fn includes(&self, key: &str) -> bool {
        self.include_devices.is_empty() || self.include_devices.iter().any(|k| k == key)
    }
}
