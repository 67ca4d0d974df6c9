pub mod cli;
pub mod toml_config;

pub use toml_config::NodewatcherConfig;

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use std::path::PathBuf;
#[cfg(feature = "cli")]
use uuid::Uuid;

pub const DEFAULT_CONFIG_FILE: &str = "nodewatcher.toml";

#[cfg(feature = "cli")]
#[derive(Debug, Parser)]
#[command(name = "nodewatcher", version)]
#[command(about = "Planning, deployment, monitoring and maintenance of community wireless networks")]
pub struct CliConfig {
    /// Configuration file; defaults are used when the default file is absent
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log in JSON format")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List supported devices
    Devices {
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Create or update antenna records for antennas built into devices
    SyncAntennas,
    /// Manage nodes
    Node {
        #[command(subcommand)]
        action: NodeCommand,
    },
    /// Replace all nodes with the contents of a JSON dump
    Import { dump: PathBuf },
    /// Poll node telemetry into datastreams
    Monitor {
        /// Run a single pass instead of polling periodically
        #[arg(long)]
        once: bool,
        /// Write one CSV file per stream into this directory when monitoring stops
        #[arg(long)]
        export: Option<PathBuf>,
        /// Log process CPU and memory usage
        #[arg(long)]
        stats: bool,
    },
}

#[cfg(feature = "cli")]
#[derive(Debug, Subcommand)]
pub enum NodeCommand {
    List,
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        platform: String,
        #[arg(long)]
        router: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long, default_value = "admin")]
        user: String,
    },
    Reset {
        id: Uuid,
        #[arg(long, default_value = "admin")]
        user: String,
    },
    Remove {
        id: Uuid,
        #[arg(long, default_value = "admin")]
        user: String,
    },
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// Loads the configuration file, falling back to defaults only when no
    /// file was requested and the default one does not exist.
    pub fn load_config(&self) -> crate::utils::error::Result<NodewatcherConfig> {
        match &self.config {
            Some(path) => NodewatcherConfig::from_file(path),
            None if std::path::Path::new(DEFAULT_CONFIG_FILE).exists() => {
                NodewatcherConfig::from_file(DEFAULT_CONFIG_FILE)
            }
            None => Ok(NodewatcherConfig::default()),
        }
    }
}
