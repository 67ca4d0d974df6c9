use crate::datastream::StreamBackend;
use crate::events::Event;
use crate::nodes::model::Node;
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Lifecycle points of a node in the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSignalKind {
    PostCreate,
    PreReset,
    Reset,
    PostReset,
    PreRemove,
    PostRemove,
}

impl NodeSignalKind {
    pub fn event_kind(&self) -> &'static str {
        match self {
            NodeSignalKind::PostCreate => "post_create_node",
            NodeSignalKind::PreReset => "pre_reset_node",
            NodeSignalKind::Reset => "reset_node",
            NodeSignalKind::PostReset => "post_reset_node",
            NodeSignalKind::PreRemove => "pre_remove_node",
            NodeSignalKind::PostRemove => "post_remove_node",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeSignal {
    pub kind: NodeSignalKind,
    pub node: Node,
    /// User that triggered the change.
    pub user: String,
}

impl NodeSignal {
    pub fn new(kind: NodeSignalKind, node: &Node, user: &str) -> Self {
        Self {
            kind,
            node: node.clone(),
            user: user.to_string(),
        }
    }

    pub fn to_event(&self) -> Event {
        Event::new("editor", self.kind.event_kind())
            .with_node(self.node.id)
            .with_data(json!({
                "user": self.user,
                "name": self.node.name,
            }))
    }
}

#[async_trait]
pub trait NodeSignalHandler: Send + Sync {
    async fn handle(&self, signal: &NodeSignal) -> Result<()>;
}

/// Drops the datastreams of a node when it is reset or removed.
pub struct StreamResetHandler {
    backend: Arc<dyn StreamBackend>,
}

impl StreamResetHandler {
    pub fn new(backend: Arc<dyn StreamBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl NodeSignalHandler for StreamResetHandler {
    async fn handle(&self, signal: &NodeSignal) -> Result<()> {
        if !matches!(signal.kind, NodeSignalKind::Reset | NodeSignalKind::PostRemove) {
            return Ok(());
        }

        let mut query = Map::new();
        query.insert("node".to_string(), Value::String(signal.node.id.to_string()));
        let removed = self.backend.delete_streams(&query)?;
        tracing::info!("🧹 Removed {} streams of node {}", removed, signal.node.name);
        Ok(())
    }
}
