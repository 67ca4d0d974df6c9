//! Ubiquiti UniFi access points.

use crate::generator::devices::{
    AntennaConnector, DeviceDescriptor, EthernetPort, FirmwareProfile, InternalAntenna,
    PortMapping, Radio, RadioFeature, Switch, SwitchPreset, SwitchVlanPreset,
};
use crate::generator::protocols::Protocol;
use std::collections::BTreeMap;

const PLATFORM: &str = "lede";

fn radio_5ghz(identifier: &str, connector: &str, description: &str) -> Radio {
    Radio::integrated(
        identifier,
        "Integrated wireless radio (5 GHz)",
        vec![Protocol::Ieee80211Ac(Protocol::standard_ht_capabilities())],
        vec![AntennaConnector::new(connector, description)],
        vec![RadioFeature::MultipleSsid],
    )
}

fn radio_2ghz(identifier: &str, connector: &str, description: &str) -> Radio {
    Radio::integrated(
        identifier,
        "Integrated wireless radio (2.4 GHz)",
        vec![Protocol::Ieee80211Bgn(Protocol::standard_ht_capabilities())],
        vec![AntennaConnector::new(connector, description)],
        vec![RadioFeature::MultipleSsid],
    )
}

fn openwrt_map(entries: &[(&str, PortMapping)]) -> BTreeMap<String, BTreeMap<String, PortMapping>> {
    BTreeMap::from([(
        "openwrt".to_string(),
        entries
            .iter()
            .map(|(port, mapping)| (port.to_string(), mapping.clone()))
            .collect(),
    )])
}

fn mac80211(radios: &[&str]) -> BTreeMap<String, BTreeMap<String, String>> {
    BTreeMap::from([(
        "openwrt".to_string(),
        radios
            .iter()
            .map(|radio| (radio.to_string(), "mac80211".to_string()))
            .collect(),
    )])
}

fn lede_profile(name: &str, files: &[&str]) -> BTreeMap<String, FirmwareProfile> {
    BTreeMap::from([(
        PLATFORM.to_string(),
        FirmwareProfile {
            name: name.to_string(),
            files: files.iter().map(|f| f.to_string()).collect(),
        },
    )])
}

fn interface(name: &str) -> PortMapping {
    PortMapping::Interface(name.to_string())
}

pub fn uap_ac_lite() -> DeviceDescriptor {
    DeviceDescriptor {
        identifier: "ub-uap-ac-lite".to_string(),
        name: "Unifi AP AC Lite".to_string(),
        manufacturer: "Ubiquiti".to_string(),
        url: "http://www.ubnt.com/".to_string(),
        architecture: "ar71xx".to_string(),
        usb: false,
        radios: vec![
            radio_5ghz("wifi0", "a1", "Antenna1"),
            radio_2ghz("wifi1", "a2", "Antenna2"),
        ],
        switches: vec![],
        ports: vec![EthernetPort::new("lan0", "Lan0")],
        // TODO: verify antenna geometry against the vendor datasheet
        antennas: vec![
            InternalAntenna::omni_dual("a1", 120, 3.0),
            InternalAntenna::omni_dual("a2", 120, 3.0),
        ],
        port_map: openwrt_map(&[
            ("wifi0", interface("radio0")),
            ("wifi1", interface("radio1")),
            ("lan0", interface("eth0")),
        ]),
        drivers: mac80211(&["wifi0", "wifi1"]),
        profiles: lede_profile(
            "ubnt-unifiac-lite",
            &["*-ar71xx-generic-ubnt-unifiac-lite-squashfs-sysupgrade.bin"],
        ),
    }
}

pub fn uap_ac_pro() -> DeviceDescriptor {
    DeviceDescriptor {
        identifier: "ub-uap-ac-pro".to_string(),
        name: "Unifi AP AC Pro".to_string(),
        usb: true,
        switches: vec![Switch {
            identifier: "sw0".to_string(),
            description: "Gigabit switch".to_string(),
            ports: vec![0, 2, 3],
            cpu_port: 0,
            cpu_tagged: true,
            vlans: 16,
            configurable: true,
            presets: vec![SwitchPreset {
                identifier: "default".to_string(),
                description: "Default VLAN configuration".to_string(),
                vlans: vec![
                    SwitchVlanPreset {
                        identifier: "wan0".to_string(),
                        description: "Wan0".to_string(),
                        vlan: 2,
                        ports: vec![0, 3],
                    },
                    SwitchVlanPreset {
                        identifier: "lan0".to_string(),
                        description: "Lan0".to_string(),
                        vlan: 1,
                        ports: vec![0, 2],
                    },
                ],
            }],
        }],
        ports: vec![],
        antennas: vec![
            InternalAntenna::omni_dual("a1", 120, 3.0),
            InternalAntenna::omni_dual("a2", 120, 3.0),
            InternalAntenna::omni_dual("a3", 120, 3.0),
        ],
        port_map: openwrt_map(&[
            ("wifi0", interface("radio0")),
            ("wifi1", interface("radio1")),
            ("sw0", PortMapping::switch("switch0", "eth0.{vlan}")),
        ]),
        profiles: lede_profile(
            "ubnt-unifiac-pro",
            &["*-ar71xx-generic-ubnt-unifiac-pro-squashfs-sysupgrade.bin"],
        ),
        ..uap_ac_lite()
    }
}

pub fn uap() -> DeviceDescriptor {
    DeviceDescriptor {
        identifier: "ub-uap".to_string(),
        name: "Unifi UAP".to_string(),
        manufacturer: "Ubiquiti".to_string(),
        url: "http://www.ubnt.com/".to_string(),
        architecture: "ar71xx".to_string(),
        usb: false,
        radios: vec![radio_2ghz("wifi0", "a1", "Antenna1")],
        switches: vec![],
        ports: vec![EthernetPort::new("lan0", "Lan0")],
        antennas: vec![InternalAntenna::omni_dual("a1", 120, 3.0)],
        port_map: openwrt_map(&[("wifi0", interface("radio0")), ("lan0", interface("eth0"))]),
        drivers: mac80211(&["wifi0"]),
        profiles: lede_profile(
            "ubnt-unifi",
            &[
                "*-ar71xx-generic-ubnt-unifi-squashfs-factory.bin",
                "*-ar71xx-generic-ubnt-unifi-squashfs-sysupgrade.bin",
            ],
        ),
    }
}

pub fn uap_lr() -> DeviceDescriptor {
    DeviceDescriptor {
        identifier: "ub-uap-lr".to_string(),
        name: "Unifi UAP-LR".to_string(),
        ..uap()
    }
}

pub fn devices() -> Vec<(&'static str, DeviceDescriptor)> {
    vec![
        (PLATFORM, uap_ac_lite()),
        (PLATFORM, uap_ac_pro()),
        (PLATFORM, uap()),
        (PLATFORM, uap_lr()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ac_pro_switch() {
        let device = uap_ac_pro();
        assert!(device.usb);
        assert!(device.ports.is_empty());
        assert_eq!(device.antennas.len(), 3);
        assert_eq!(device.driver("openwrt", "wifi1"), Some("mac80211"));

        let preset = device.switch("sw0").unwrap().preset("default").unwrap();
        let wan = preset.vlans.iter().find(|v| v.identifier == "wan0").unwrap();
        assert_eq!(wan.vlan, 2);
        assert_eq!(
            device.remap_switch_vlan("openwrt", "sw0", wan.vlan).as_deref(),
            Some("eth0.2")
        );
    }

    #[test]
    fn test_uap_lr_inherits_uap() {
        let lr = uap_lr();
        let base = uap();
        assert_eq!(lr.identifier, "ub-uap-lr");
        assert_eq!(lr.radios, base.radios);
        assert_eq!(lr.profiles, base.profiles);
        assert!(lr.matches_firmware_image(
            "lede",
            "lede-17.01.4-ar71xx-generic-ubnt-unifi-squashfs-factory.bin"
        ));
    }

    #[test]
    fn test_all_devices_valid() {
        for (_, device) in devices() {
            device.validate().unwrap();
        }
    }
}
