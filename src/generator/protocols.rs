//! Wireless protocols supported by device radios.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ShortGi20,
    ShortGi40,
    RxStbc1,
    DsssCck40,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Band {
    #[serde(rename = "2.4GHz")]
    Ghz2_4,
    #[serde(rename = "5GHz")]
    Ghz5,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", content = "capabilities")]
pub enum Protocol {
    #[serde(rename = "ieee-80211bg")]
    Ieee80211Bg,
    #[serde(rename = "ieee-80211n")]
    Ieee80211Bgn(Vec<Capability>),
    #[serde(rename = "ieee-80211ac")]
    Ieee80211Ac(Vec<Capability>),
}

impl Protocol {
    pub fn identifier(&self) -> &'static str {
        match self {
            Protocol::Ieee80211Bg => "ieee-80211bg",
            Protocol::Ieee80211Bgn(_) => "ieee-80211n",
            Protocol::Ieee80211Ac(_) => "ieee-80211ac",
        }
    }

    pub fn band(&self) -> Band {
        match self {
            Protocol::Ieee80211Bg | Protocol::Ieee80211Bgn(_) => Band::Ghz2_4,
            Protocol::Ieee80211Ac(_) => Band::Ghz5,
        }
    }

    pub fn capabilities(&self) -> &[Capability] {
        match self {
            Protocol::Ieee80211Bg => &[],
            Protocol::Ieee80211Bgn(caps) | Protocol::Ieee80211Ac(caps) => caps,
        }
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    pub fn channels(&self) -> Vec<u16> {
        match self.band() {
            Band::Ghz2_4 => (1..=13).collect(),
            Band::Ghz5 => (36..=64)
                .step_by(4)
                .chain((100..=140).step_by(4))
                .chain((149..=165).step_by(4))
                .collect(),
        }
    }

    /// The 802.11n/ac capability set used by current Atheros-based boards.
    pub fn standard_ht_capabilities() -> Vec<Capability> {
        vec![
            Capability::ShortGi20,
            Capability::ShortGi40,
            Capability::RxStbc1,
            Capability::DsssCck40,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_per_band() {
        let bg = Protocol::Ieee80211Bg;
        assert_eq!(bg.band(), Band::Ghz2_4);
        assert_eq!(bg.channels().len(), 13);

        let ac = Protocol::Ieee80211Ac(Protocol::standard_ht_capabilities());
        let channels = ac.channels();
        assert_eq!(channels.first(), Some(&36));
        assert_eq!(channels.last(), Some(&165));
        assert!(channels.contains(&100));
        assert!(!channels.contains(&68));
    }

    #[test]
    fn test_capabilities() {
        let n = Protocol::Ieee80211Bgn(vec![Capability::ShortGi20]);
        assert!(n.has_capability(Capability::ShortGi20));
        assert!(!n.has_capability(Capability::RxStbc1));
        assert!(Protocol::Ieee80211Bg.capabilities().is_empty());
        assert_eq!(n.identifier(), "ieee-80211n");
    }
}
