//! Configuration for the omabus bridge.
//!
//! One TOML file merged with `OMABUS_`-prefixed environment variables,
//! credential resolution (env + keyring + plaintext), validation, and
//! translation to the `omabus_core` runtime types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use omabus_core::{ControllerConfig, RenewalPolicy, SyncConfig, TlsVerification};

/// Keyring service name for stored secrets.
const KEYRING_SERVICE: &str = "omabus";
const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no client secret configured for controller '{omadac_id}'")]
    NoCredentials { omadac_id: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerSection,
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub polling: PollingSection,
    #[serde(default)]
    pub renewal: RenewalSection,
    #[serde(default)]
    pub filters: FiltersSection,
    #[serde(default)]
    pub features: FeaturesSection,
    #[serde(default)]
    pub log: LogSection,
}

/// The Omada controller and its OpenAPI application.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControllerSection {
    /// Controller base URL (e.g., "https://10.0.0.2:8043").
    pub url: String,

    /// Controller instance id, shown on the OpenAPI settings page.
    pub omadac_id: String,

    pub client_id: String,

    /// Client secret (plaintext -- prefer keyring or env var).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Environment variable name containing the client secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret_env: Option<String>,

    /// Site name, matched exactly against the controller's site list.
    pub site: String,

    /// Skip TLS verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    /// Path to custom CA certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Request timeout in seconds.
    pub timeout: u64,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            omadac_id: String::new(),
            client_id: String::new(),
            client_secret: None,
            client_secret_env: None,
            site: "Default".into(),
            insecure: None,
            ca_cert: None,
            timeout: 30,
        }
    }
}

/// The MQTT broker.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MqttSection {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
    pub client_id: String,
    /// Prefix for every topic the bridge publishes or subscribes to.
    pub base_topic: String,
    /// Keep-alive interval in seconds.
    pub keep_alive: u64,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            username: None,
            password: None,
            password_env: None,
            client_id: "omabus".into(),
            base_topic: "omada".into(),
            keep_alive: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingSection {
    /// Device list refresh interval in seconds.
    pub device_interval: u64,
    /// Switch port refresh interval in seconds.
    pub port_interval: u64,
    /// Pause between enabling a port's profile override and its PoE change.
    pub settle_delay_ms: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            device_interval: 60,
            port_interval: 5,
            settle_delay_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenewalSection {
    /// Consecutive failed renewal rounds before giving up.
    pub max_attempts: u32,
    /// First retry delay in seconds; doubles per round.
    pub backoff_initial: u64,
    /// Retry delay cap in seconds.
    pub backoff_max: u64,
}

impl Default for RenewalSection {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_initial: 5,
            backoff_max: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FiltersSection {
    /// Normalized device keys to track. Empty tracks everything.
    pub include_devices: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeaturesSection {
    /// Subscribe to PoE command topics.
    pub poe_control: bool,
}

impl Default for FeaturesSection {
    fn default() -> Self {
        Self { poe_control: true }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogSection {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "omabus", "omabus").map_or_else(
        || PathBuf::from("omabus.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config from `path` (or the default location) + environment.
///
/// Environment keys use `__` between section and field:
/// `OMABUS_CONTROLLER__CLIENT_ID`, `OMABUS_MQTT__PORT`.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("OMABUS_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Validation ──────────────────────────────────────────────────────

impl Config {
    /// Check every field the bridge cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.controller;
        let url = url::Url::parse(&c.url)
            .map_err(|_| invalid("controller.url", format!("invalid URL: {:?}", c.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("controller.url", "scheme must be http or https"));
        }
        if c.omadac_id.trim().is_empty() {
            return Err(invalid("controller.omadac_id", "must not be empty"));
        }
        if c.client_id.trim().is_empty() {
            return Err(invalid("controller.client_id", "must not be empty"));
        }
        if c.site.is_empty() {
            return Err(invalid("controller.site", "must not be empty"));
        }
        if c.timeout == 0 {
            return Err(invalid("controller.timeout", "must be at least 1 second"));
        }

        let base = &self.mqtt.base_topic;
        if base.is_empty() || base.contains(['+', '#']) {
            return Err(invalid(
                "mqtt.base_topic",
                "must be non-empty and free of MQTT wildcards",
            ));
        }

        if self.polling.device_interval == 0 {
            return Err(invalid("polling.device_interval", "must be at least 1 second"));
        }
        if self.polling.port_interval == 0 {
            return Err(invalid("polling.port_interval", "must be at least 1 second"));
        }
        if self.renewal.max_attempts == 0 {
            return Err(invalid("renewal.max_attempts", "must be at least 1"));
        }
        Ok(())
    }
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the OpenAPI client secret: env var → system keyring → plaintext.
pub fn resolve_client_secret(controller: &ControllerSection) -> Result<SecretString, ConfigError> {
    // 1. Configured env var
    if let Some(val) = controller
        .client_secret_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
    {
        return Ok(SecretString::from(val));
    }

    // 2. System keyring
    if let Some(secret) = keyring_secret(&format!("{}/client-secret", controller.omadac_id)) {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(ref secret) = controller.client_secret {
        return Ok(SecretString::from(secret.clone()));
    }

    Err(ConfigError::NoCredentials {
        omadac_id: controller.omadac_id.clone(),
    })
}

/// Resolve the broker password, if any: env var → keyring → plaintext.
pub fn resolve_mqtt_password(mqtt: &MqttSection) -> Option<SecretString> {
    if let Some(val) = mqtt
        .password_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
    {
        return Some(SecretString::from(val));
    }

    if let Some(user) = mqtt.username.as_deref() {
        if let Some(secret) = keyring_secret(&format!("mqtt/{user}")) {
            return Some(SecretString::from(secret));
        }
    }

    mqtt.password.clone().map(SecretString::from)
}

fn keyring_secret(account: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, account)
        .ok()
        .and_then(|entry| entry.get_password().ok())
}

// ── Translation to core types ───────────────────────────────────────

/// Build the core `ControllerConfig`, resolving the client secret.
pub fn to_controller_config(config: &Config) -> Result<ControllerConfig, ConfigError> {
    let c = &config.controller;
    let url: url::Url = c
        .url
        .parse()
        .map_err(|_| invalid("controller.url", format!("invalid URL: {}", c.url)))?;

    let secret = resolve_client_secret(c)?;

    let tls = if c.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = c.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else if c.insecure == Some(false) {
        TlsVerification::SystemDefaults
    } else {
        TlsVerification::DangerAcceptInvalid // controllers ship self-signed certs
    };

    let mut controller = ControllerConfig::new(url, &c.omadac_id, &c.client_id, secret);
    controller.site.clone_from(&c.site);
    controller.tls = tls;
    controller.timeout = Duration::from_secs(c.timeout);
    controller.renewal = RenewalPolicy {
        max_attempts: config.renewal.max_attempts,
        backoff_initial: Duration::from_secs(config.renewal.backoff_initial),
        backoff_max: Duration::from_secs(config.renewal.backoff_max),
    };
    Ok(controller)
}

/// Build the core `SyncConfig`.
pub fn to_sync_config(config: &Config) -> SyncConfig {
    SyncConfig {
        base_topic: config.mqtt.base_topic.clone(),
        device_interval: Duration::from_secs(config.polling.device_interval),
        port_interval: Duration::from_secs(config.polling.port_interval),
        settle_delay: Duration::from_millis(config.polling.settle_delay_ms),
        include_devices: config.filters.include_devices.clone(),
        ..SyncConfig::default()
    }
}

// ── Display ─────────────────────────────────────────────────────────

/// Render the config as TOML with every secret replaced.
pub fn redacted_toml(config: &Config) -> Result<String, ConfigError> {
    let mut shown = config.clone();
    if shown.controller.client_secret.is_some() {
        shown.controller.client_secret = Some(REDACTED.into());
    }
    if shown.mqtt.password.is_some() {
        shown.mqtt.password = Some(REDACTED.into());
    }
    Ok(toml::to_string_pretty(&shown)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
[controller]
url = "https://10.0.0.2:8043"
omadac_id = "abc123"
client_id = "app-id"
client_secret = "plain-secret"
site = "Home"

[mqtt]
host = "broker.lan"
password = "mqtt-secret"
base_topic = "lab"

[polling]
port_interval = 10

[filters]
include_devices = ["core_switch"]
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_file_over_defaults() {
        let file = write_config(SAMPLE);
        let config = load_config_from(file.path()).unwrap();

        assert_eq!(config.controller.site, "Home");
        assert_eq!(config.controller.timeout, 30);
        assert_eq!(config.mqtt.host, "broker.lan");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.polling.device_interval, 60);
        assert_eq!(config.polling.port_interval, 10);
        assert_eq!(config.polling.settle_delay_ms, 300);
        assert_eq!(config.filters.include_devices, vec!["core_switch".to_string()]);
        assert!(config.features.poe_control);
        config.validate().unwrap();
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.mqtt.base_topic, "omada");
        assert_eq!(config.renewal.max_attempts, 5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("omabus.toml", SAMPLE)?;
            jail.set_env("OMABUS_MQTT__PORT", "8883");
            jail.set_env("OMABUS_CONTROLLER__SITE", "Lab");

            let config = load_config_from(Path::new("omabus.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.mqtt.port, 8883);
            assert_eq!(config.controller.site, "Lab");
            assert_eq!(config.controller.client_id, "app-id");
            Ok(())
        });
    }

    #[test]
    fn validation_rejects_bad_fields() {
        let file = write_config(SAMPLE);
        let good = load_config_from(file.path()).unwrap();

        let mut bad = good.clone();
        bad.controller.url = "not a url".into();
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field == "controller.url"
        ));

        let mut bad = good.clone();
        bad.mqtt.base_topic = "omada/#".into();
        assert!(bad.validate().is_err());

        let mut bad = good;
        bad.polling.port_interval = 0;
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field == "polling.port_interval"
        ));
    }

    #[test]
    fn secret_from_env_var_wins() {
        Jail::expect_with(|jail| {
            jail.set_env("OMABUS_TEST_SECRET", "from-env");
            let controller = ControllerSection {
                client_secret_env: Some("OMABUS_TEST_SECRET".into()),
                client_secret: Some("plain".into()),
                ..ControllerSection::default()
            };
            let secret = resolve_client_secret(&controller).map_err(|e| e.to_string())?;
            assert_eq!(secret.expose_secret(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn translates_to_core_config() {
        let file = write_config(SAMPLE);
        let config = load_config_from(file.path()).unwrap();

        let controller = to_controller_config(&config).unwrap();
        assert_eq!(controller.url.as_str(), "https://10.0.0.2:8043/");
        assert_eq!(controller.site, "Home");
        assert_eq!(controller.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(controller.renewal.backoff_max, Duration::from_secs(300));

        let sync = to_sync_config(&config);
        assert_eq!(sync.base_topic, "lab");
        assert_eq!(sync.port_interval, Duration::from_secs(10));
        assert_eq!(sync.settle_delay, Duration::from_millis(300));
    }

    #[test]
    fn redacted_output_hides_secrets() {
        let file = write_config(SAMPLE);
        let config = load_config_from(file.path()).unwrap();

        let shown = redacted_toml(&config).unwrap();
        assert!(!shown.contains("plain-secret"));
        assert!(!shown.contains("mqtt-secret"));
        assert!(shown.contains(REDACTED));
        assert!(shown.contains("omadac_id = \"abc123\""));
    }
}
