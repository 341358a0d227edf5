// ── Bus topic layout ──
//
//   {base}/{type}/{key}                                 device snapshot
//   {base}/switch/{key}/ports/port{n}/{field}           port field
//   {base}/switch/{key}/ports/port{n}/poeState/set      PoE command
//   {base}/switch/{key}/ports/port{n}/poeStateSet       PoE command (flat form)

use thiserror::Error;

use crate::model::DeviceType;

/// A parsed PoE command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCommand {
    pub device_key: String,
    pub port: u32,
    pub desired_on: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopicError {
    #[error("topic {0:?} is not a PoE command topic")]
    NotACommand(String),

    #[error("invalid port segment {0:?}")]
    InvalidPort(String),

    #[error("invalid PoE payload {0:?} (expected 0, 1, on or off)")]
    InvalidPayload(String),
}

/// Builds and parses topics under one base prefix.
#[derive(Debug, Clone)]
pub struct Topics {
    base: String,
}

impl Topics {
    pub fn new(base: impl Into<String>) -> Self {
        let base: String = base.into();
        Self {
            base: base.trim_end_matches('/').to_owned(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn device(&self, device_type: DeviceType, key: &str) -> String {
        format!("{}/{device_type}/{key}", self.base)
    }

    pub fn port_field(&self, key: &str, port: u32, field: &str) -> String {
        format!("{}/switch/{key}/ports/port{port}/{field}", self.base)
    }

    /// Subscription filters covering both command topic forms.
    pub fn command_filters(&self) -> [String; 2] {
        [
            format!("{}/switch/+/ports/+/poeState/set", self.base),
            format!("{}/switch/+/ports/+/poeStateSet", self.base),
        ]
    }

    /// Parse a command topic and its payload.
    pub fn parse_command(&self, topic: &str, payload: &[u8]) -> Result<PortCommand, TopicError> {
        let not_a_command = || TopicError::NotACommand(topic.to_owned());

        let rest = topic
            .strip_prefix(self.base.as_str())
            .and_then(|r| r.strip_prefix("/switch/"))
            .ok_or_else(not_a_command)?;

        let segments: Vec<&str> = rest.split('/').collect();
        let (key, port_segment) = match segments.as_slice() {
            [key, "ports", port, "poeState", "set"] | [key, "ports", port, "poeStateSet"]
                if !key.is_empty() =>
            {
                (*key, *port)
            }
            _ => return Err(not_a_command()),
        };

        let port = port_segment
            .strip_prefix("port")
            .unwrap_or(port_segment)
            .parse::<u32>()
            .map_err(|_| TopicError::InvalidPort(port_segment.to_owned()))?;

        Ok(PortCommand {
            device_key: key.to_owned(),
            port,
            desired_on: parse_power(payload)?,
        })
    }
}

/// `0`/`1`/`on`/`off`, trimmed and case-insensitive.
pub fn parse_power(payload: &[u8]) -> Result<bool, TopicError> {
    let text = String::from_utf8_lossy(payload);
    let value = text.trim();
    if value == "1" || value.eq_ignore_ascii_case("on") {
        Ok(true)
    } else if value == "0" || value.eq_ignore_ascii_case("off") {
        Ok(false)
    } else {
        Err(TopicError::InvalidPayload(value.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::{PortCommand, TopicError, Topics, parse_power};
    use crate::model::DeviceType;

    #[test]
    fn builds_publication_topics() {
        let topics = Topics::new("omada/");
        assert_eq!(topics.device(DeviceType::Ap, "lobby_ap"), "omada/ap/lobby_ap");
        assert_eq!(
            topics.port_field("switch_one", 7, "poeState"),
            "omada/switch/switch_one/ports/port7/poeState"
        );
    }

    #[test]
    fn parses_both_command_forms() {
        let topics = Topics::new("omada");
        let expected = PortCommand {
            device_key: "switch_one".into(),
            port: 1,
            desired_on: false,
        };
        assert_eq!(
            topics.parse_command("omada/switch/switch_one/ports/port1/poeState/set", b"0"),
            Ok(expected.clone())
        );
        assert_eq!(
            topics.parse_command("omada/switch/switch_one/ports/port1/poeStateSet", b" OFF\n"),
            Ok(expected)
        );
    }

    #[test]
    fn rejects_foreign_topics_and_bad_payloads() {
        let topics = Topics::new("omada");
        assert!(matches!(
            topics.parse_command("omada/switch/sw/ports/port1/poeState", b"1"),
            Err(TopicError::NotACommand(_))
        ));
        assert!(matches!(
            topics.parse_command("other/switch/sw/ports/port1/poeStateSet", b"1"),
            Err(TopicError::NotACommand(_))
        ));
        assert!(matches!(
            topics.parse_command("omada/switch/sw/ports/portX/poeStateSet", b"1"),
            Err(TopicError::InvalidPort(_))
        ));
        assert!(matches!(
            topics.parse_command("omada/switch/sw/ports/port2/poeStateSet", b"maybe"),
            Err(TopicError::InvalidPayload(_))
        ));
    }

    #[test]
    fn power_payloads() {
        assert_eq!(parse_power(b"1"), Ok(true));
        assert_eq!(parse_power(b"On"), Ok(true));
        assert_eq!(parse_power(b"0"), Ok(false));
        assert_eq!(parse_power(b" off "), Ok(false));
        assert!(parse_power(b"").is_err());
    }
}
