// ── API-to-domain type conversions ──
//
// Bridges raw `omabus_api::models` records into the `model` domain
// types: derives the device key and type, parses timestamps, and maps
// PoE modes onto `PoeState`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use omabus_api::models::{DeviceRecord, SwitchPortRecord};

use crate::model::{Device, DeviceType, PoeState, Port, normalize_name};

// ── Helpers ────────────────────────────────────────────────────────

/// Convert an optional epoch-milliseconds timestamp to `DateTime<Utc>`.
fn epoch_millis_to_datetime(epoch: Option<i64>) -> Option<DateTime<Utc>> {
    epoch.and_then(DateTime::from_timestamp_millis)
}

// ── Devices ────────────────────────────────────────────────────────

/// A device record the bridge cannot track.
#[derive(Debug, Error)]
pub enum DeviceConversionError {
    #[error("malformed device record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("device {key} has unsupported type {device_type:?}")]
    Unsupported {
        key: String,
        device_type: Option<String>,
    },
}

/// Converts a device exactly as listed by the controller. The JSON is
/// kept untouched as the device's `raw` snapshot.
impl TryFrom<serde_json::Value> for Device {
    type Error = DeviceConversionError;

    fn try_from(raw: serde_json::Value) -> Result<Self, Self::Error> {
        let record = DeviceRecord::deserialize(&raw)?;
        let key = normalize_name(record.name.as_deref());
        let device_type = match record
            .device_type
            .as_deref()
            .map(str::parse::<DeviceType>)
        {
            Some(Ok(t)) => t,
            _ => {
                return Err(DeviceConversionError::Unsupported {
                    key,
                    device_type: record.device_type,
                });
            }
        };

        Ok(Device {
            name: record.name.unwrap_or_else(|| key.clone()),
            key,
            device_type,
            serial: record.sn,
            mac: record.mac,
            ip: record.ip,
            model: record.model,
            firmware_version: record.firmware_version,
            uptime: record.uptime,
            cpu_util: record.cpu_util,
            mem_util: record.mem_util,
            last_seen: epoch_millis_to_datetime(record.last_seen),
            status: record.status,
            raw,
        })
    }
}

// ── Ports ──────────────────────────────────────────────────────────

/// Build a domain port from a switch port record.
///
/// Capability is a property of the switch, not the record, so the
/// caller passes it in.
pub fn port_from_record(record: &SwitchPortRecord, poe_capable: bool) -> Port {
    Port {
        number: record.port,
        name: record.name.clone(),
        poe_capable,
        profile_name: record.profile_name.clone(),
        profile_override_enable: record.profile_override_enable,
        poe_state: PoeState::from_mode(record.poe_mode),
    }
}
