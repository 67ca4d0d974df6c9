pub mod error;
#[cfg(feature = "cli")]
pub mod logger;
pub mod monitor;
pub mod validation;
