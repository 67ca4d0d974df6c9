//! Device descriptors.
//!
//! A descriptor captures everything the configuration generator needs to
//! know about a router model: its radios, switches, ethernet ports and
//! internal antennas, together with the per-platform names of those
//! interfaces, the wireless drivers and the firmware images that fit it.

use crate::generator::protocols::Protocol;
use crate::utils::error::{NodewatcherError, Result};
use crate::utils::validation::validate_identifier;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioFeature {
    MultipleSsid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntennaConnector {
    pub identifier: String,
    pub description: String,
}

impl AntennaConnector {
    pub fn new(identifier: &str, description: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            description: description.to_string(),
        }
    }
}

/// A radio integrated on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Radio {
    pub identifier: String,
    pub description: String,
    pub protocols: Vec<Protocol>,
    pub connectors: Vec<AntennaConnector>,
    pub features: Vec<RadioFeature>,
}

impl Radio {
    pub fn integrated(
        identifier: &str,
        description: &str,
        protocols: Vec<Protocol>,
        connectors: Vec<AntennaConnector>,
        features: Vec<RadioFeature>,
    ) -> Self {
        Self {
            identifier: identifier.to_string(),
            description: description.to_string(),
            protocols,
            connectors,
            features,
        }
    }

    pub fn supports(&self, feature: RadioFeature) -> bool {
        self.features.contains(&feature)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchVlanPreset {
    pub identifier: String,
    pub description: String,
    pub vlan: u16,
    pub ports: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchPreset {
    pub identifier: String,
    pub description: String,
    pub vlans: Vec<SwitchVlanPreset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Switch {
    pub identifier: String,
    pub description: String,
    pub ports: Vec<u16>,
    pub cpu_port: u16,
    pub cpu_tagged: bool,
    pub vlans: u16,
    pub configurable: bool,
    pub presets: Vec<SwitchPreset>,
}

impl Switch {
    pub fn preset(&self, identifier: &str) -> Option<&SwitchPreset> {
        self.presets.iter().find(|p| p.identifier == identifier)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthernetPort {
    pub identifier: String,
    pub description: String,
}

impl EthernetPort {
    pub fn new(identifier: &str, description: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarization {
    Horizontal,
    Vertical,
    Circular,
    Dual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalAntenna {
    pub identifier: String,
    pub polarization: Polarization,
    pub angle_horizontal: u16,
    pub angle_vertical: u16,
    pub gain: f64,
}

impl InternalAntenna {
    /// An omnidirectional dual-polarized antenna as found on ceiling access points.
    pub fn omni_dual(identifier: &str, angle_vertical: u16, gain: f64) -> Self {
        Self {
            identifier: identifier.to_string(),
            polarization: Polarization::Dual,
            angle_horizontal: 360,
            angle_vertical,
            gain,
        }
    }
}

/// How a device port or radio is named on a firmware platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortMapping {
    Interface(String),
    Switch { device: String, vlan_template: String },
}

impl PortMapping {
    pub fn switch(device: &str, vlan_template: &str) -> Self {
        PortMapping::Switch {
            device: device.to_string(),
            vlan_template: vlan_template.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareProfile {
    pub name: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub identifier: String,
    pub name: String,
    pub manufacturer: String,
    pub url: String,
    pub architecture: String,
    #[serde(default)]
    pub usb: bool,
    pub radios: Vec<Radio>,
    pub switches: Vec<Switch>,
    pub ports: Vec<EthernetPort>,
    pub antennas: Vec<InternalAntenna>,
    #[serde(default)]
    pub port_map: BTreeMap<String, BTreeMap<String, PortMapping>>,
    #[serde(default)]
    pub drivers: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub profiles: BTreeMap<String, FirmwareProfile>,
}

impl DeviceDescriptor {
    pub fn radio(&self, identifier: &str) -> Option<&Radio> {
        self.radios.iter().find(|r| r.identifier == identifier)
    }

    pub fn switch(&self, identifier: &str) -> Option<&Switch> {
        self.switches.iter().find(|s| s.identifier == identifier)
    }

    pub fn antenna(&self, identifier: &str) -> Option<&InternalAntenna> {
        self.antennas.iter().find(|a| a.identifier == identifier)
    }

    pub fn driver(&self, platform: &str, radio: &str) -> Option<&str> {
        self.drivers
            .get(platform)
            .and_then(|d| d.get(radio))
            .map(String::as_str)
    }

    pub fn profile(&self, platform: &str) -> Option<&FirmwareProfile> {
        self.profiles.get(platform)
    }

    /// Returns the interface name of a plain port or radio on the platform.
    /// Switches have no single interface, use [`Self::remap_switch_vlan`].
    pub fn remap_port(&self, platform: &str, port: &str) -> Option<&str> {
        match self.port_map.get(platform)?.get(port)? {
            PortMapping::Interface(name) => Some(name.as_str()),
            PortMapping::Switch { .. } => None,
        }
    }

    pub fn remap_switch_vlan(&self, platform: &str, switch: &str, vlan: u16) -> Option<String> {
        match self.port_map.get(platform)?.get(switch)? {
            PortMapping::Switch { vlan_template, .. } => {
                Some(vlan_template.replace("{vlan}", &vlan.to_string()))
            }
            PortMapping::Interface(_) => None,
        }
    }

    pub fn matches_firmware_image(&self, platform: &str, filename: &str) -> bool {
        let Some(profile) = self.profile(platform) else {
            return false;
        };

        profile
            .files
            .iter()
            .filter_map(|pattern| glob_to_regex(pattern))
            .any(|re| re.is_match(filename))
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| NodewatcherError::InvalidDevice {
            identifier: self.identifier.clone(),
            reason,
        };

        validate_identifier("identifier", &self.identifier)
            .map_err(|e| invalid(e.to_string()))?;

        let mut seen = HashSet::new();
        let interfaces = self
            .radios
            .iter()
            .map(|r| &r.identifier)
            .chain(self.switches.iter().map(|s| &s.identifier))
            .chain(self.ports.iter().map(|p| &p.identifier));
        for identifier in interfaces {
            if !seen.insert(identifier.as_str()) {
                return Err(invalid(format!("duplicate interface '{}'", identifier)));
            }
        }

        for radio in &self.radios {
            for connector in &radio.connectors {
                if self.antenna(&connector.identifier).is_none() {
                    return Err(invalid(format!(
                        "radio '{}' connector '{}' has no matching antenna",
                        radio.identifier, connector.identifier
                    )));
                }
            }
        }

        for switch in &self.switches {
            for preset in &switch.presets {
                for vlan in &preset.vlans {
                    if vlan.vlan == 0 || vlan.vlan > switch.vlans {
                        return Err(invalid(format!(
                            "switch '{}' preset '{}' uses VLAN {} but only {} are supported",
                            switch.identifier, preset.identifier, vlan.vlan, switch.vlans
                        )));
                    }
                    if let Some(port) = vlan.ports.iter().find(|p| !switch.ports.contains(p)) {
                        return Err(invalid(format!(
                            "switch '{}' preset '{}' references unknown port {}",
                            switch.identifier, preset.identifier, port
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut expr = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).ok()
}
