pub mod config;
pub mod core;
pub mod datastream;
pub mod domain;
pub mod equipment;
pub mod events;
pub mod generator;
pub mod nodes;
pub mod utils;

pub use config::{cli::LocalStorage, NodewatcherConfig};

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use core::{engine::MonitorEngine, monitor_pipeline::MonitorPipeline};
pub use utils::error::{NodewatcherError, Result};
