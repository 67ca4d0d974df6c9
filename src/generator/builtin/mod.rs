//! Device descriptors shipped with nodewatcher.

pub mod fon;
pub mod ubnt;

use crate::generator::registry::DeviceRegistry;
use crate::utils::error::Result;

pub fn register_all(registry: &mut DeviceRegistry) -> Result<()> {
    for (platform, device) in ubnt::devices().into_iter().chain(fon::devices()) {
        registry.register_device(platform, device)?;
    }
    Ok(())
}
