use crate::domain::ports::Storage;
use crate::nodes::model::{Node, NodeId};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

const NODES_FILE: &str = "nodes.json";

#[async_trait]
pub trait NodeRepository: Send + Sync {
    async fn get(&self, id: NodeId) -> Result<Option<Node>>;
    async fn list(&self) -> Result<Vec<Node>>;
    async fn save(&self, node: Node) -> Result<()>;
    /// Returns the removed node, if it existed.
    async fn delete(&self, id: NodeId) -> Result<Option<Node>>;
    async fn replace_all(&self, nodes: Vec<Node>) -> Result<()>;
}

/// Keeps all nodes in memory and writes them to `nodes.json` on every change.
pub struct JsonNodeRepository<S: Storage> {
    storage: S,
    nodes: RwLock<BTreeMap<NodeId, Node>>,
}

impl<S: Storage> JsonNodeRepository<S> {
    pub async fn load(storage: S) -> Result<Self> {
        let nodes: Vec<Node> = if storage.exists(NODES_FILE).await {
            let data = storage.read_file(NODES_FILE).await?;
            serde_json::from_slice(&data)?
        } else {
            Vec::new()
        };

        tracing::debug!("Loaded {} nodes", nodes.len());
        Ok(Self {
            storage,
            nodes: RwLock::new(nodes.into_iter().map(|n| (n.id, n)).collect()),
        })
    }

    async fn persist(&self, nodes: &BTreeMap<NodeId, Node>) -> Result<()> {
        let list: Vec<&Node> = nodes.values().collect();
        let data = serde_json::to_vec_pretty(&list)?;
        self.storage.write_file(NODES_FILE, &data).await
    }
}

#[async_trait]
impl<S: Storage> NodeRepository for JsonNodeRepository<S> {
    async fn get(&self, id: NodeId) -> Result<Option<Node>> {
        Ok(self.nodes.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Node>> {
        let mut nodes: Vec<Node> = self.nodes.read().await.values().cloned().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(nodes)
    }

    async fn save(&self, node: Node) -> Result<()> {
        let mut nodes = self.nodes.write().await;
        let mut updated = nodes.clone();
        updated.insert(node.id, node);
        self.persist(&updated).await?;
        *nodes = updated;
        Ok(())
    }

    async fn delete(&self, id: NodeId) -> Result<Option<Node>> {
        let mut nodes = self.nodes.write().await;
        if !nodes.contains_key(&id) {
            return Ok(None);
        }

        let mut updated = nodes.clone();
        let removed = updated.remove(&id);
        self.persist(&updated).await?;
        *nodes = updated;
        Ok(removed)
    }

    async fn replace_all(&self, replacement: Vec<Node>) -> Result<()> {
        let mut nodes = self.nodes.write().await;
        let replacement: BTreeMap<NodeId, Node> =
            replacement.into_iter().map(|n| (n.id, n)).collect();
        self.persist(&replacement).await?;
        *nodes = replacement;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cli::LocalStorage;
    use crate::nodes::model::NodeConfig;
    use tempfile::TempDir;

    /// Storage whose writes always fail, as on a read-only data directory.
    struct ReadOnlyStorage;

    impl Storage for ReadOnlyStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()).into())
        }

        async fn write_file(&self, _path: &str, _data: &[u8]) -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }

        async fn exists(&self, _path: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_nodes_survive_reload() {
        let dir = TempDir::new().unwrap();
        let node = Node::from_config(NodeConfig::new("b-node", "lede"));
        let other = Node::from_config(NodeConfig::new("a-node", "openwrt"));
        {
            let repository = JsonNodeRepository::load(LocalStorage::new(dir.path())).await.unwrap();
            repository.save(node.clone()).await.unwrap();
            repository.save(other.clone()).await.unwrap();
        }

        let repository = JsonNodeRepository::load(LocalStorage::new(dir.path())).await.unwrap();
        let names: Vec<String> = repository.list().await.unwrap().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["a-node", "b-node"]);
        assert_eq!(repository.get(node.id).await.unwrap(), Some(node.clone()));

        assert_eq!(repository.delete(node.id).await.unwrap(), Some(node.clone()));
        assert_eq!(repository.delete(node.id).await.unwrap(), None);
        assert_eq!(repository.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_all() {
        let dir = TempDir::new().unwrap();
        let repository = JsonNodeRepository::load(LocalStorage::new(dir.path())).await.unwrap();
        repository
            .save(Node::from_config(NodeConfig::new("old", "lede")))
            .await
            .unwrap();

        let imported = vec![
            Node::from_config(NodeConfig::new("x", "lede")),
            Node::from_config(NodeConfig::new("y", "lede")),
        ];
        repository.replace_all(imported).await.unwrap();

        let names: Vec<String> = repository.list().await.unwrap().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_failed_save_is_not_visible() {
        let repository = JsonNodeRepository::load(ReadOnlyStorage).await.unwrap();
        let node = Node::from_config(NodeConfig::new("unsaved", "lede"));

        assert!(repository.save(node.clone()).await.is_err());
        assert_eq!(repository.get(node.id).await.unwrap(), None);
        assert!(repository.list().await.unwrap().is_empty());
    }
}
