use crate::generator::registry::DeviceRegistry;
use crate::utils::error::{NodewatcherError, Result};
use crate::utils::validation::{validate_identifier, validate_ip_address, validate_non_empty_string};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type NodeId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub platform: String,
    /// Device identifier from the registry.
    #[serde(default)]
    pub router: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn from_config(config: NodeConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: config.name,
            platform: config.platform,
            router: config.router,
            address: config.address,
            config: config.config,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the editable part of the node.
    pub fn apply(&mut self, config: NodeConfig) {
        self.name = config.name;
        self.platform = config.platform;
        self.router = config.router;
        self.address = config.address;
        self.config = config.config;
        self.updated_at = Utc::now();
    }

    pub fn to_config(&self) -> NodeConfig {
        NodeConfig {
            name: self.name.clone(),
            platform: self.platform.clone(),
            router: self.router.clone(),
            address: self.address.clone(),
            config: self.config.clone(),
        }
    }
}

/// Editable node configuration, as submitted by the editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub platform: String,
    #[serde(default)]
    pub router: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl NodeConfig {
    pub fn new(name: &str, platform: &str) -> Self {
        Self {
            name: name.to_string(),
            platform: platform.to_string(),
            ..Default::default()
        }
    }

    pub fn with_router(mut self, router: &str) -> Self {
        self.router = Some(router.to_string());
        self
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    /// Checks the configuration and reports every problem at once.
    pub fn validate(&self, registry: &DeviceRegistry) -> Result<()> {
        let mut errors = Vec::new();

        if let Err(e) = validate_non_empty_string("name", self.name.trim()) {
            errors.push(e.to_string());
        }

        match validate_identifier("platform", &self.platform) {
            Err(e) => errors.push(e.to_string()),
            Ok(()) => {
                if let Some(router) = &self.router {
                    if let Err(e) = registry.device(&self.platform, router) {
                        errors.push(e.to_string());
                    }
                }
            }
        }

        if let Some(address) = &self.address {
            if let Err(e) = validate_ip_address("address", address) {
                errors.push(e.to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(NodewatcherError::InvalidNodeConfig { errors })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let registry = DeviceRegistry::with_builtin_devices().unwrap();
        let config = NodeConfig::new("ljubljana-1", "lede")
            .with_router("ub-uap-ac-lite")
            .with_address("10.254.0.1");
        assert!(config.validate(&registry).is_ok());
        assert!(NodeConfig::new("bare", "openwrt").validate(&registry).is_ok());
    }

    #[test]
    fn test_all_errors_are_collected() {
        let registry = DeviceRegistry::with_builtin_devices().unwrap();
        let config = NodeConfig::new("  ", "openwrt")
            .with_router("ub-uap-ac-lite")
            .with_address("not-an-ip");

        match config.validate(&registry) {
            Err(NodewatcherError::InvalidNodeConfig { errors }) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_apply_updates_timestamp() {
        let mut node = Node::from_config(NodeConfig::new("a", "lede"));
        let created = node.created_at;
        node.apply(NodeConfig::new("b", "lede").with_address("fd00::1"));
        assert_eq!(node.name, "b");
        assert_eq!(node.address.as_deref(), Some("fd00::1"));
        assert_eq!(node.created_at, created);
        assert!(node.updated_at >= created);
        assert_eq!(node.to_config().name, "b");
    }
}
