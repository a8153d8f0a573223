use crate::constants::{
    DEFAULT_FLUSH_TIMEOUT, DEFAULT_MAX_FLUSH_READS, DEFAULT_RECEIVE_TIMEOUT, DEFAULT_RECV_BUF_LEN,
    DEFAULT_SEND_TIMEOUT, ENDPOINT_IN, ENDPOINT_OUT,
};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How much a session reports through `tracing`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugLevel {
    /// No events
    #[default]
    Off,
    /// Called operations and their timing (`debug`)
    Calls,
    /// Low level communication as hex dumps (`trace`)
    Wire,
}

/// Endpoint addresses, default timeouts and buffering of a transport session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub endpoint_out: u8,
    pub endpoint_in: u8,
    #[serde(rename = "send_timeout_ms", with = "millis")]
    pub send_timeout: Duration,
    #[serde(rename = "receive_timeout_ms", with = "millis")]
    pub receive_timeout: Duration,
    /// Per-read timeout while discarding stale input
    #[serde(rename = "flush_timeout_ms", with = "millis")]
    pub flush_timeout: Duration,
    pub max_flush_reads: usize,
    pub recv_buf_len: usize,
    pub debug_level: DebugLevel,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint_out: ENDPOINT_OUT,
            endpoint_in: ENDPOINT_IN,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            max_flush_reads: DEFAULT_MAX_FLUSH_READS,
            recv_buf_len: DEFAULT_RECV_BUF_LEN,
            debug_level: DebugLevel::Off,
        }
    }
}

/// Session settings plus the facade's own timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    #[serde(flatten)]
    pub session: SessionConfig,
    /// How long start/stop measurement wait for the status word to follow
    #[serde(rename = "state_change_timeout_ms", with = "millis")]
    pub state_change_timeout: Duration,
    /// Pause between status reads while waiting for a state change
    #[serde(rename = "state_poll_interval_ms", with = "millis")]
    pub state_poll_interval: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            state_change_timeout: Duration::from_millis(2000),
            state_poll_interval: Duration::from_millis(20),
        }
    }
}

impl DeviceConfig {
    /// Parse a JSON document; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_debug_level(mut self, level: DebugLevel) -> Self {
        self.session.debug_level = level;
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_device_documentation() {
        let config = SessionConfig::default();
        assert_eq!(config.send_timeout, Duration::from_millis(50));
        assert_eq!(config.receive_timeout, Duration::from_millis(4000));
        assert_eq!(config.recv_buf_len, 256);
        assert_ne!(config.endpoint_out, config.endpoint_in);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = DeviceConfig::from_json(r#"{ "receive_timeout_ms": 900, "debug_level": "wire" }"#).unwrap();
        assert_eq!(config.session.receive_timeout, Duration::from_millis(900));
        assert_eq!(config.session.send_timeout, Duration::from_millis(50));
        assert_eq!(config.session.debug_level, DebugLevel::Wire);
        assert_eq!(config.state_change_timeout, Duration::from_millis(2000));
    }

    #[test]
    fn test_invalid_json_is_a_parse_error() {
        let err = DeviceConfig::from_json(r#"{ "send_timeout_ms": "fast" }"#).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ParseError);
    }

    #[test]
    fn test_debug_levels_are_ordered() {
        assert!(DebugLevel::Wire > DebugLevel::Calls);
        assert!(DebugLevel::Calls > DebugLevel::Off);
    }
}
