// Wire types for the Omada OpenAPI.
//
// Every response is wrapped in `{ errorCode, msg, result }`. List
// endpoints put a page object inside `result`. Field names follow the
// controller's camelCase JSON.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// The envelope every OpenAPI response is wrapped in.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub error_code: i32,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub result: Option<T>,
}

/// One page of a paginated list endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default)]
    pub total_rows: u64,
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub current_size: u32,
    #[serde(default)]
    pub data: Vec<T>,
}

// ── Authorization ────────────────────────────────────────────────────

/// Token pair returned by both grant types.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Body of the client-credentials grant.
#[derive(Debug, Serialize)]
pub(crate) struct ClientCredentialsRequest<'a> {
    #[serde(rename = "omadacId")]
    pub omadac_id: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

// ── Sites ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSummary {
    pub site_id: String,
    pub name: String,
}

// ── Devices ──────────────────────────────────────────────────────────

/// A device as listed by `GET /sites/{siteId}/devices`.
///
/// Only the fields the bridge reads are typed; everything else is kept
/// in `extra`. Absent fields stay absent when re-serialized.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    /// Text form of the uptime; the controller sends either a number or a string.
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub uptime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_util: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_util: Option<f64>,
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Switches ─────────────────────────────────────────────────────────

/// Switch details from `GET /sites/{siteId}/switches/{mac}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchDetail {
    #[serde(default)]
    pub port_list: Option<Vec<SwitchPortRecord>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchPortRecord {
    pub port: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile_name: Option<String>,
    #[serde(default)]
    pub profile_override_enable: bool,
    /// `1` = PoE on, `0` = off. Ports without PoE report other values.
    #[serde(default)]
    pub poe_mode: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileOverrideRequest {
    pub profile_override_enable: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoeModeRequest {
    pub poe_mode: u8,
}

/// Accept either a JSON string or a number and keep it as text.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn device_record_keeps_unknown_fields() {
        let raw = json!({
            "mac": "AA-BB-CC-DD-EE-FF",
            "name": "Switch One",
            "type": "switch",
            "uptime": 12345,
            "compoundModel": "TL-SG2210P v3.20"
        });
        let record: DeviceRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.uptime.as_deref(), Some("12345"));
        assert_eq!(record.device_type.as_deref(), Some("switch"));
        assert_eq!(
            record.extra.get("compoundModel"),
            Some(&json!("TL-SG2210P v3.20"))
        );

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["compoundModel"], json!("TL-SG2210P v3.20"));
        assert_eq!(back["type"], json!("switch"));
        assert!(back.get("ip").is_none());
        assert!(back.get("status").is_none());
    }

    #[test]
    fn page_of_records_without_default_parses() {
        let page: Page<SiteSummary> = serde_json::from_value(json!({
            "totalRows": 1,
            "data": [{ "siteId": "s1", "name": "Default" }]
        }))
        .unwrap();
        assert_eq!(page.total_rows, 1);
        assert_eq!(page.data[0].site_id, "s1");

        let empty: Page<DeviceRecord> = serde_json::from_value(json!({ "totalRows": 0 })).unwrap();
        assert!(empty.data.is_empty());
    }

    #[test]
    fn envelope_without_result_parses() {
        let env: Envelope<serde_json::Value> =
            serde_json::from_value(json!({ "errorCode": 0, "msg": "Success." })).unwrap();
        assert_eq!(env.error_code, 0);
        assert!(env.result.is_none());
    }
}
