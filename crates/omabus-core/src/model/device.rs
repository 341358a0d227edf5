// ── Device domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Device categories the bridge tracks. Anything else the controller
/// reports is skipped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeviceType {
    Ap,
    Switch,
    Gateway,
}

/// A controller-managed device, keyed by its normalized name.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub key: String,
    pub name: String,
    pub device_type: DeviceType,
    pub serial: Option<String>,
    pub mac: Option<String>,
    pub ip: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub uptime: Option<String>,
    pub cpu_util: Option<f64>,
    pub mem_util: Option<f64>,
    pub last_seen: Option<DateTime<Utc>>,
    /// Controller status code (`1` = connected).
    pub status: Option<i32>,
    /// The record exactly as the controller sent it.
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl Device {
    pub fn is_switch(&self) -> bool {
        self.device_type == DeviceType::Switch
    }

    pub fn is_connected(&self) -> bool {
        self.status == Some(1)
    }

    /// Power-sourcing capability is inferred from the key: TP-Link PoE
    /// models carry a `p` suffix (`tl_sg2210p`).
    pub fn is_poe_capable(&self) -> bool {
        self.key.contains('p')
    }
}

/// Normalize a display name into a stable device key.
///
/// Lower-cases, then collapses every run of whitespace and hyphens into
/// a single `_`. A missing or empty name becomes `unknown`.
pub fn normalize_name(name: Option<&str>) -> String {
    let name = match name {
        Some(n) if !n.is_empty() => n,
        _ => return "unknown".into(),
    };

    let mut key = String::with_capacity(name.len());
    let mut in_run = false;
    for ch in name.chars() {
        if ch.is_whitespace() || ch == '-' {
            if !in_run {
                key.push('_');
                in_run = true;
            }
        } else {
            key.extend(ch.to_lowercase());
            in_run = false;
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::{DeviceType, normalize_name};

    #[test]
    fn normalizes_whitespace_and_hyphen_runs() {
        assert_eq!(normalize_name(Some("Switch One")), "switch_one");
        assert_eq!(normalize_name(Some("Core - SW  01")), "core_sw_01");
        assert_eq!(normalize_name(Some("TL-SG2210P")), "tl_sg2210p");
        assert_eq!(normalize_name(Some("Lobby\tAP")), "lobby_ap");
    }

    #[test]
    fn missing_name_is_unknown() {
        assert_eq!(normalize_name(None), "unknown");
        assert_eq!(normalize_name(Some("")), "unknown");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["Switch One", "a - b", "Ünïcode Name", "x__y", "  lead", "trail-"] {
            let once = normalize_name(Some(raw));
            assert_eq!(normalize_name(Some(&once)), once, "input {raw:?}");
        }
    }

    #[test]
    fn device_type_parses_case_insensitively() {
        assert_eq!("switch".parse::<DeviceType>().ok(), Some(DeviceType::Switch));
        assert_eq!("AP".parse::<DeviceType>().ok(), Some(DeviceType::Ap));
        assert!("unknown".parse::<DeviceType>().is_err());
        assert_eq!(DeviceType::Gateway.to_string(), "gateway");
    }
}
