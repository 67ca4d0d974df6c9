use crate::generator::builtin;
use crate::generator::devices::DeviceDescriptor;
use crate::utils::error::{NodewatcherError, Result};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Devices supported by each firmware platform.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    platforms: BTreeMap<String, BTreeMap<String, Arc<DeviceDescriptor>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_devices() -> Result<Self> {
        let mut registry = Self::new();
        builtin::register_all(&mut registry)?;
        Ok(registry)
    }

    pub fn register_device(&mut self, platform: &str, device: DeviceDescriptor) -> Result<()> {
        device.validate()?;

        let devices = self.platforms.entry(platform.to_string()).or_default();
        if devices.contains_key(&device.identifier) {
            return Err(NodewatcherError::DeviceAlreadyRegistered {
                platform: platform.to_string(),
                identifier: device.identifier,
            });
        }

        tracing::debug!("Registered device '{}' for platform '{}'", device.identifier, platform);
        devices.insert(device.identifier.clone(), Arc::new(device));
        Ok(())
    }

    pub fn device(&self, platform: &str, identifier: &str) -> Result<Arc<DeviceDescriptor>> {
        self.platforms
            .get(platform)
            .and_then(|devices| devices.get(identifier))
            .cloned()
            .ok_or_else(|| NodewatcherError::DeviceNotFound {
                identifier: format!("{}/{}", platform, identifier),
            })
    }

    pub fn find_device(&self, identifier: &str) -> Result<Arc<DeviceDescriptor>> {
        self.platforms
            .values()
            .find_map(|devices| devices.get(identifier))
            .cloned()
            .ok_or_else(|| NodewatcherError::DeviceNotFound {
                identifier: identifier.to_string(),
            })
    }

    pub fn platforms(&self) -> impl Iterator<Item = &str> {
        self.platforms.keys().map(String::as_str)
    }

    pub fn platform_devices(&self, platform: &str) -> impl Iterator<Item = &Arc<DeviceDescriptor>> {
        self.platforms
            .get(platform)
            .into_iter()
            .flat_map(|devices| devices.values())
    }

    /// Every registered device once, even when it is supported by several platforms.
    pub fn iter_devices(&self) -> impl Iterator<Item = &Arc<DeviceDescriptor>> {
        let mut seen = HashSet::new();
        self.platforms
            .values()
            .flat_map(|devices| devices.values())
            .filter(move |device| seen.insert(device.identifier.clone()))
    }
}
