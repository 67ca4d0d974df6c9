use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::datastream::StreamDescriptor;

/// Telemetry fetched from a single node during a monitoring pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub node: Uuid,
    pub address: String,
    pub fetched_at: DateTime<Utc>,
    pub telemetry: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl Record {
    pub fn is_reachable(&self) -> bool {
        self.telemetry.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransformResult {
    /// Descriptors in load order: interface descriptors precede the node
    /// descriptor that sums over them.
    pub descriptors: Vec<Arc<StreamDescriptor>>,
    pub timestamp: Option<DateTime<Utc>>,
    pub polled: usize,
    pub unreachable: Vec<Record>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub polled: usize,
    pub unreachable: usize,
    pub streams: usize,
    pub datapoints: usize,
}
