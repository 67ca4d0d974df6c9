//! Platform events and the sinks that receive them.

pub mod pool;
pub mod sinks;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::error::Result;

pub use pool::EventSinkPool;
pub use sinks::{LoggingSink, WebhookSink};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub source: String,
    pub kind: String,
    pub node: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl Event {
    pub fn new(source: &str, kind: &str) -> Self {
        Self {
            source: source.to_string(),
            kind: kind.to_string(),
            node: None,
            timestamp: Utc::now(),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_node(mut self, node: Uuid) -> Self {
        self.node = Some(node);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;
    async fn deliver(&self, event: &Event) -> Result<()>;
}

/// A sink type that the pool can instantiate from its configuration table.
pub trait EventSinkKind: EventSink + Sized + 'static {
    const NAME: &'static str;

    fn from_config(config: &toml::Table) -> Result<Self>;
}
