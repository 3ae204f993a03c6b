//! Stage configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stagehand_protocol::StageId;

/// The persistent town stage every character starts in.
pub const HUB_STAGE_ID: &str = "sl1Ns200p0a0u0";

/// Settings shared by every stage in a registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Capacity of stages created implicitly by entering them.
    pub default_capacity: u16,

    /// Fallback re-check interval for `wait_binary`, in case a
    /// publication notification is missed.
    pub binary_poll_interval: Duration,

    /// Category codes (identifier characters `[3..5]`) of stages that are
    /// removed once nobody is inside or holds a reservation.
    pub ephemeral_categories: Vec<String>,

    /// Category codes listed by stage enumeration.
    pub enumerable_categories: Vec<String>,

    /// Identifier of the hub stage. Entering it introduces the mover to
    /// everyone already online.
    pub hub_stage_id: String,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            default_capacity: 4,
            binary_poll_interval: Duration::from_secs(1),
            ephemeral_categories: vec!["Qs".into(), "Ms".into(), "Gs".into()],
            enumerable_categories: vec!["Qs".into(), "Ms".into()],
            hub_stage_id: HUB_STAGE_ID.into(),
        }
    }
}

impl StageConfig {
    /// Returns `true` if stages with this identifier are garbage-collected.
    pub fn is_ephemeral(&self, id: &StageId) -> bool {
        id.has_category(&self.ephemeral_categories)
    }

    /// Returns `true` if stages with this identifier show up in
    /// enumeration.
    pub fn is_enumerable(&self, id: &StageId) -> bool {
        id.has_category(&self.enumerable_categories)
    }

    /// Returns `true` if `id` is the hub.
    pub fn is_hub(&self, id: &StageId) -> bool {
        id.as_str() == self.hub_stage_id
    }

    /// The hub's identifier.
    pub fn hub(&self) -> StageId {
        StageId::new(self.hub_stage_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_config_default() {
        let config = StageConfig::default();
        assert_eq!(config.default_capacity, 4);
        assert_eq!(config.binary_poll_interval, Duration::from_secs(1));
        assert!(config.is_hub(&StageId::new(HUB_STAGE_ID)));
    }

    #[test]
    fn test_is_ephemeral_by_category() {
        let config = StageConfig::default();
        assert!(config.is_ephemeral(&StageId::new("sl1Qs001p0a0u0")));
        assert!(config.is_ephemeral(&StageId::new("sl2Gs010p0a0u0")));
        assert!(!config.is_ephemeral(&StageId::new(HUB_STAGE_ID)));
        assert!(!config.is_ephemeral(&StageId::new("x")));
    }

    #[test]
    fn test_is_enumerable_excludes_guild_rooms() {
        let config = StageConfig::default();
        assert!(config.is_enumerable(&StageId::new("sl1Ms001p0a0u0")));
        assert!(!config.is_enumerable(&StageId::new("sl2Gs010p0a0u0")));
    }

    #[test]
    fn test_stage_config_partial_json_uses_defaults() {
        let config: StageConfig = serde_json::from_str(r#"{ "default_capacity": 8 }"#).unwrap();
        assert_eq!(config.default_capacity, 8);
        assert_eq!(config.hub_stage_id, HUB_STAGE_ID);
    }
}
