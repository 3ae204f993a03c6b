//! Server configuration.
//!
//! Every section has defaults, so an empty JSON object is a valid config
//! file and any subset of fields may be given.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stagehand_session::SessionConfig;
use stagehand_stage::StageConfig;
use stagehand_store::StoreConfig;

use crate::StagehandError;

/// Top-level configuration for a [`StagehandServer`](crate::StagehandServer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,

    /// How long a new connection may take to send its `Login` request.
    pub login_timeout: Duration,

    /// Inbound frames buffered between a connection's reader and its
    /// request loop.
    pub inbound_queue_capacity: usize,

    pub stage: StageConfig,
    pub session: SessionConfig,
    pub store: StoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:54001".to_string(),
            login_timeout: Duration::from_secs(5),
            inbound_queue_capacity: 16,
            stage: StageConfig::default(),
            session: SessionConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parses a JSON config.
    pub fn from_json(json: &str) -> Result<Self, StagehandError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StagehandError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_empty_object_uses_defaults() {
        let config = ServerConfig::from_json("{}").unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:54001");
        assert_eq!(config.stage.default_capacity, 4);
        assert_eq!(config.stage.binary_poll_interval, Duration::from_secs(1));
        assert_eq!(config.session.outbound_queue_capacity, 64);
    }

    #[test]
    fn test_from_json_partial_sections_override_fields() {
        let json = r#"{
            "bind_addr": "0.0.0.0:9000",
            "stage": { "default_capacity": 8, "hub_stage_id": "sl1Ns999p0a0u0" },
            "session": { "outbound_queue_capacity": 4 }
        }"#;

        let config = ServerConfig::from_json(json).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.stage.default_capacity, 8);
        assert_eq!(config.stage.hub_stage_id, "sl1Ns999p0a0u0");
        assert_eq!(config.stage.ephemeral_categories, vec!["Qs", "Ms", "Gs"]);
        assert_eq!(config.session.outbound_queue_capacity, 4);
    }

    #[test]
    fn test_from_json_wrong_type_fails() {
        let result = ServerConfig::from_json(r#"{ "bind_addr": 5 }"#);
        assert!(matches!(result, Err(StagehandError::ConfigParse(_))));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = ServerConfig::load("/definitely/not/here/stagehand.json");
        assert!(matches!(result, Err(StagehandError::ConfigIo(_))));
    }
}
