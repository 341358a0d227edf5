// ── Switch port domain types ──

use serde::{Serialize, Serializer};
use serde_json::{Value, json};

/// PoE output of a port. Published as `0`/`1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoeState {
    #[default]
    Off,
    On,
}

impl PoeState {
    pub fn from_mode(mode: Option<i32>) -> Self {
        if mode == Some(1) { Self::On } else { Self::Off }
    }

    pub fn as_mode(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::On => 1,
        }
    }
}

impl From<bool> for PoeState {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

impl Serialize for PoeState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_mode())
    }
}

/// One port of a switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    #[serde(skip)]
    pub number: u32,
    pub name: Option<String>,
    #[serde(rename = "isPOE")]
    pub poe_capable: bool,
    pub profile_name: Option<String>,
    pub profile_override_enable: bool,
    pub poe_state: PoeState,
}

impl Port {
    /// The per-field publications of this port, in publish order.
    pub fn fields(&self) -> [(&'static str, Value); 5] {
        [
            ("name", json!(self.name)),
            ("isPOE", json!(self.poe_capable)),
            ("profileName", json!(self.profile_name)),
            ("profileOverrideEnable", json!(self.profile_override_enable)),
            ("poeState", json!(self.poe_state.as_mode())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{PoeState, Port};

    #[test]
    fn only_mode_one_is_on() {
        assert_eq!(PoeState::from_mode(Some(1)), PoeState::On);
        assert_eq!(PoeState::from_mode(Some(0)), PoeState::Off);
        assert_eq!(PoeState::from_mode(Some(2)), PoeState::Off);
        assert_eq!(PoeState::from_mode(None), PoeState::Off);
    }

    #[test]
    fn port_fields_use_wire_names() {
        let port = Port {
            number: 4,
            name: Some("Camera".into()),
            poe_capable: true,
            profile_name: Some("All".into()),
            profile_override_enable: false,
            poe_state: PoeState::On,
        };
        let names: Vec<_> = port.fields().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            names,
            ["name", "isPOE", "profileName", "profileOverrideEnable", "poeState"]
        );
        assert_eq!(
            serde_json::to_value(&port).unwrap_or_default(),
            json!({
                "name": "Camera",
                "isPOE": true,
                "profileName": "All",
                "profileOverrideEnable": false,
                "poeState": 1
            })
        );
    }
}
