pub mod antennas;

pub use antennas::{install_device_antenna_fixtures, AntennaRecord, AntennaStore, FixtureReport};
