//! Session configuration
//!
//! Every knob is defaulted so an empty `{}` file (or no file at all) yields
//! a working configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DataError;

/// Top-level configuration for one feed session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub stream: StreamSettings,
    pub writer: WriterSettings,
}

impl SessionConfig {
    /// Load from a JSON file; missing fields fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Endpoints and supervision interval for the live connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub data_url: String,
    pub clock_sync_url: String,
    pub reconnect_interval_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            data_url: "ws://127.0.0.1:8888/api/v1/ws/data".to_owned(),
            clock_sync_url: "ws://127.0.0.1:8888/api/v1/ws/simulation-time".to_owned(),
            reconnect_interval_ms: 5000,
        }
    }
}

impl StreamSettings {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

/// Flush thresholds for the buffered table writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterSettings {
    pub flush_count: usize,
    pub flush_interval_ms: u64,
    pub tick_interval_ms: u64,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            flush_count: 100,
            flush_interval_ms: 10_000,
            tick_interval_ms: 1000,
        }
    }
}

impl WriterSettings {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config: SessionConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(config.writer.flush_count, 100);
        assert_eq!(config.writer.flush_interval_ms, 10_000);
        assert_eq!(config.stream.reconnect_interval_ms, 5000);
    }

    #[test]
    fn partial_override_keeps_the_rest() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"writer": {"flush_count": 5}}"#).expect("parse");
        assert_eq!(config.writer.flush_count, 5);
        assert_eq!(config.writer.tick_interval_ms, 1000);
        assert!(config.stream.data_url.starts_with("ws://"));
    }
}
