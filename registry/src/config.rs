use serde::Deserialize;
use std::time::Duration;

/// Default keep-alive broadcast period, in milliseconds.
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Default advisory idle ceiling, in milliseconds. Reported to callers but
/// not enforced by the registry itself.
const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 300_000;

/// Default admission quota per non-empty user id.
const DEFAULT_MAX_CONNECTIONS_PER_USER: usize = 10;

/// Default upper bound on inbound WebSocket frame byte length.
const DEFAULT_MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Tunable limits and intervals for a registry instance.
///
/// All fields have defaults, so a partial configuration deserialized from an
/// outer settings layer fills in the rest.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Period of the keep-alive broadcast, in milliseconds.
    pub heartbeat_interval_ms: u64,

    /// Advisory idle ceiling, in milliseconds. The registry reports this to
    /// callers; enforcement is the transport layer's concern.
    pub connection_timeout_ms: u64,

    /// Admission quota: maximum concurrent connections per user id.
    /// Anonymous connections (no user id) are not counted against any quota.
    pub max_connections_per_user: usize,

    /// Maximum byte length accepted for one inbound WebSocket frame.
    pub max_message_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            max_connections_per_user: DEFAULT_MAX_CONNECTIONS_PER_USER,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl RegistryConfig {
    /// The heartbeat period as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// The advisory connection timeout as a [`Duration`].
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RegistryConfig::default();
        assert_eq!(config.heartbeat_interval_ms, 30_000);
        assert_eq!(config.connection_timeout_ms, 300_000);
        assert_eq!(config.max_connections_per_user, 10);
        assert_eq!(config.max_message_size, 1_048_576);
    }

    #[test]
    fn duration_accessors_convert_milliseconds() {
        let config = RegistryConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.connection_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn partial_deserialization_fills_defaults() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{"max_connections_per_user": 2}"#).unwrap();
        assert_eq!(config.max_connections_per_user, 2);
        assert_eq!(config.heartbeat_interval_ms, 30_000);
        assert_eq!(config.max_message_size, 1_048_576);
    }
}
