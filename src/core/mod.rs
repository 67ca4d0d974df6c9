pub mod engine;
pub mod monitor_pipeline;

pub use crate::domain::model::{Record, RunReport, TransformResult};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
