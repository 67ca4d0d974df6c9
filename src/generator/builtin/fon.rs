//! Fon Wireless routers.

use crate::generator::devices::{DeviceDescriptor, EthernetPort, InternalAntenna, Polarization, Radio};
use crate::generator::protocols::Protocol;
use std::collections::BTreeMap;

pub fn fonera_2100() -> DeviceDescriptor {
    DeviceDescriptor {
        identifier: "fon-2100".to_string(),
        name: "Fonera".to_string(),
        manufacturer: "Fon Wireless Ltd.".to_string(),
        url: "http://www.fon.com".to_string(),
        architecture: "atheros".to_string(),
        usb: false,
        radios: vec![Radio::integrated(
            "ath0",
            "Wifi0",
            vec![Protocol::Ieee80211Bg],
            vec![],
            vec![],
        )],
        switches: vec![],
        ports: vec![EthernetPort::new("eth0", "Ethernet0")],
        antennas: vec![InternalAntenna {
            identifier: "a1".to_string(),
            polarization: Polarization::Horizontal,
            angle_horizontal: 360,
            angle_vertical: 75,
            gain: 2.0,
        }],
        // 不提供介面對應與驅動程式，設定產生時沿用原本的介面名稱
        port_map: BTreeMap::new(),
        drivers: BTreeMap::new(),
        profiles: BTreeMap::new(),
    }
}

pub fn devices() -> Vec<(&'static str, DeviceDescriptor)> {
    vec![("openwrt", fonera_2100())]
}
