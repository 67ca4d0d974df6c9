//! Antenna equipment records and installation of the antennas built into
//! registered devices.

use crate::domain::ports::Storage;
use crate::generator::devices::Polarization;
use crate::generator::registry::DeviceRegistry;
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};

const ANTENNAS_FILE: &str = "antennas.json";

fn empty_annotations() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntennaRecord {
    /// Identifier of the device the antenna is built into.
    pub internal_for: String,
    pub internal_id: String,
    pub name: String,
    pub manufacturer: String,
    pub url: String,
    pub polarization: Polarization,
    pub angle_horizontal: u16,
    pub angle_vertical: u16,
    pub gain: f64,
    #[serde(default = "empty_annotations")]
    pub annotations: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixtureReport {
    pub created: usize,
    pub updated: usize,
}

pub struct AntennaStore<S: Storage> {
    storage: S,
    records: Vec<AntennaRecord>,
}

impl<S: Storage> AntennaStore<S> {
    pub async fn load(storage: S) -> Result<Self> {
        let records = if storage.exists(ANTENNAS_FILE).await {
            let data = storage.read_file(ANTENNAS_FILE).await?;
            serde_json::from_slice(&data)?
        } else {
            Vec::new()
        };

        Ok(Self { storage, records })
    }

    pub async fn save(&self) -> Result<()> {
        let data = serde_json::to_vec_pretty(&self.records)?;
        self.storage.write_file(ANTENNAS_FILE, &data).await
    }

    pub fn records(&self) -> &[AntennaRecord] {
        &self.records
    }

    pub fn get(&self, internal_for: &str, internal_id: &str) -> Option<&AntennaRecord> {
        self.records
            .iter()
            .find(|r| r.internal_for == internal_for && r.internal_id == internal_id)
    }

    /// Returns true when a new record was inserted.
    pub fn upsert(&mut self, record: AntennaRecord) -> bool {
        match self
            .records
            .iter_mut()
            .find(|r| r.internal_for == record.internal_for && r.internal_id == record.internal_id)
        {
            Some(existing) => {
                *existing = record;
                false
            }
            None => {
                self.records.push(record);
                true
            }
        }
    }
}

pub async fn install_device_antenna_fixtures<S: Storage>(
    registry: &DeviceRegistry,
    store: &mut AntennaStore<S>,
) -> Result<FixtureReport> {
    let mut report = FixtureReport::default();

    for device in registry.iter_devices() {
        for antenna in &device.antennas {
            let record = AntennaRecord {
                internal_for: device.identifier.clone(),
                internal_id: antenna.identifier.clone(),
                name: device.name.clone(),
                manufacturer: device.manufacturer.clone(),
                url: device.url.clone(),
                polarization: antenna.polarization,
                angle_horizontal: antenna.angle_horizontal,
                angle_vertical: antenna.angle_vertical,
                gain: antenna.gain,
                // 管理者加上的註記不因重新安裝而遺失
                annotations: store
                    .get(&device.identifier, &antenna.identifier)
                    .map(|existing| existing.annotations.clone())
                    .unwrap_or_else(empty_annotations),
            };

            if store.upsert(record) {
                report.created += 1;
            } else {
                report.updated += 1;
            }
        }
    }

    store.save().await?;
    tracing::info!(
        "Installed antenna fixtures: {} created, {} updated",
        report.created,
        report.updated
    );
    Ok(report)
}
