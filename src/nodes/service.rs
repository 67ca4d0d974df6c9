//! Node editor operations.
//!
//! Every change is checked against the permission store, and lifecycle
//! signals go to the registered handlers first and then to the event sinks.

use crate::domain::ports::Storage;
use crate::events::EventSinkPool;
use crate::generator::registry::DeviceRegistry;
use crate::nodes::model::{Node, NodeConfig, NodeId};
use crate::nodes::permissions::{Permission, PermissionStore};
use crate::nodes::repository::NodeRepository;
use crate::nodes::signals::{NodeSignal, NodeSignalHandler, NodeSignalKind};
use crate::utils::error::{NodewatcherError, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct NodeService<S: Storage> {
    repository: Arc<dyn NodeRepository>,
    permissions: PermissionStore<S>,
    registry: Arc<DeviceRegistry>,
    events: Arc<EventSinkPool>,
    handlers: Vec<Arc<dyn NodeSignalHandler>>,
}

impl<S: Storage> NodeService<S> {
    pub fn new(
        repository: Arc<dyn NodeRepository>,
        permissions: PermissionStore<S>,
        registry: Arc<DeviceRegistry>,
        events: Arc<EventSinkPool>,
    ) -> Self {
        Self {
            repository,
            permissions,
            registry,
            events,
            handlers: Vec::new(),
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn NodeSignalHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn permissions(&self) -> &PermissionStore<S> {
        &self.permissions
    }

    async fn emit(&self, kind: NodeSignalKind, node: &Node, user: &str) -> Result<()> {
        let signal = NodeSignal::new(kind, node, user);
        for handler in &self.handlers {
            handler.handle(&signal).await?;
        }
        self.events.dispatch(&signal.to_event()).await;
        Ok(())
    }

    pub async fn get_node(&self, id: NodeId) -> Result<Node> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| NodewatcherError::NodeNotFound { id: id.to_string() })
    }

    pub async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.repository.list().await
    }

    pub async fn create_node(&self, user: &str, config: NodeConfig) -> Result<Node> {
        self.permissions.require(user, Permission::AddNode, None).await?;
        config.validate(&self.registry)?;

        let node = Node::from_config(config);
        self.repository.save(node.clone()).await?;

        let created = match self.permissions.grant(user, &Permission::OWNER, node.id).await {
            Ok(()) => self.emit(NodeSignalKind::PostCreate, &node, user).await,
            Err(e) => Err(e),
        };
        if let Err(e) = created {
            // 授權或訊號處理失敗時撤回整個建立動作
            tracing::warn!("Rolling back creation of node '{}': {}", node.name, e);
            self.permissions.revoke_node(node.id).await?;
            self.repository.delete(node.id).await?;
            return Err(e);
        }

        tracing::info!("✅ Node '{}' ({}) created by {}", node.name, node.id, user);
        Ok(node)
    }

    pub async fn edit_node(&self, user: &str, id: NodeId, config: NodeConfig) -> Result<Node> {
        self.permissions
            .require(user, Permission::ChangeNode, Some(id))
            .await?;
        let mut node = self.get_node(id).await?;
        config.validate(&self.registry)?;

        node.apply(config);
        self.repository.save(node.clone()).await?;
        tracing::info!("Node '{}' ({}) updated by {}", node.name, node.id, user);
        Ok(node)
    }

    pub async fn reset_node(&self, user: &str, id: NodeId) -> Result<Node> {
        self.permissions
            .require(user, Permission::ResetNode, Some(id))
            .await?;
        let node = self.get_node(id).await?;

        for kind in [
            NodeSignalKind::PreReset,
            NodeSignalKind::Reset,
            NodeSignalKind::PostReset,
        ] {
            self.emit(kind, &node, user).await?;
        }
        tracing::info!("🔄 Node '{}' ({}) reset by {}", node.name, node.id, user);
        Ok(node)
    }

    pub async fn remove_node(&self, user: &str, id: NodeId) -> Result<Node> {
        self.permissions
            .require(user, Permission::DeleteNode, Some(id))
            .await?;
        let node = self.get_node(id).await?;

        self.emit(NodeSignalKind::PreRemove, &node, user).await?;
        self.repository.delete(id).await?;
        self.permissions.revoke_node(id).await?;
        self.emit(NodeSignalKind::PostRemove, &node, user).await?;

        tracing::info!("🗑️ Node '{}' ({}) removed by {}", node.name, node.id, user);
        Ok(node)
    }

    /// Replaces all nodes with the contents of a JSON dump. The dump is
    /// parsed completely before anything is written.
    pub async fn import_nodes(&self, dump: &str) -> Result<usize> {
        let nodes: Vec<Node> = serde_json::from_str(dump)?;

        let mut seen = BTreeSet::new();
        for node in &nodes {
            if !seen.insert(node.id) {
                return Err(NodewatcherError::ValidationError {
                    message: format!("Duplicate node id {} in dump", node.id),
                });
            }
        }

        let count = nodes.len();
        self.repository.replace_all(nodes).await?;
        // 舊的節點授權不再適用於匯入的節點
        self.permissions.revoke_all_nodes().await?;
        tracing::info!("📥 Imported {} nodes", count);
        Ok(count)
    }
}
