use crate::domain::ports::Storage;
use crate::nodes::model::NodeId;
use crate::utils::error::{NodewatcherError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tokio::sync::RwLock;

const PERMISSIONS_FILE: &str = "permissions.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    AddNode,
    ChangeNode,
    DeleteNode,
    ResetNode,
}

impl Permission {
    /// Permissions the creator of a node receives on it.
    pub const OWNER: [Permission; 3] = [
        Permission::ChangeNode,
        Permission::DeleteNode,
        Permission::ResetNode,
    ];

    pub fn codename(&self) -> &'static str {
        match self {
            Permission::AddNode => "add_node",
            Permission::ChangeNode => "change_node",
            Permission::DeleteNode => "delete_node",
            Permission::ResetNode => "reset_node",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.codename())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Grants {
    #[serde(default)]
    global: BTreeMap<String, BTreeSet<Permission>>,
    #[serde(default)]
    nodes: BTreeMap<NodeId, BTreeMap<String, BTreeSet<Permission>>>,
}

/// Global and per-node permission grants.
pub struct PermissionStore<S: Storage> {
    storage: S,
    superusers: BTreeSet<String>,
    grants: RwLock<Grants>,
}

impl<S: Storage> PermissionStore<S> {
    pub async fn load(storage: S, superusers: impl IntoIterator<Item = String>) -> Result<Self> {
        let grants = if storage.exists(PERMISSIONS_FILE).await {
            let data = storage.read_file(PERMISSIONS_FILE).await?;
            serde_json::from_slice(&data)?
        } else {
            Grants::default()
        };

        Ok(Self {
            storage,
            superusers: superusers.into_iter().collect(),
            grants: RwLock::new(grants),
        })
    }

    async fn persist(&self, grants: &Grants) -> Result<()> {
        let data = serde_json::to_vec_pretty(grants)?;
        self.storage.write_file(PERMISSIONS_FILE, &data).await
    }

    pub fn is_superuser(&self, user: &str) -> bool {
        self.superusers.contains(user)
    }

    /// True when `user` holds `permission` globally or on `node`.
    pub async fn has_perm(&self, user: &str, permission: Permission, node: Option<NodeId>) -> bool {
        if self.is_superuser(user) {
            return true;
        }

        let grants = self.grants.read().await;
        let global = grants
            .global
            .get(user)
            .is_some_and(|perms| perms.contains(&permission));
        let object = node
            .and_then(|id| grants.nodes.get(&id))
            .and_then(|users| users.get(user))
            .is_some_and(|perms| perms.contains(&permission));
        global || object
    }

    pub async fn require(&self, user: &str, permission: Permission, node: Option<NodeId>) -> Result<()> {
        if self.has_perm(user, permission, node).await {
            Ok(())
        } else {
            tracing::debug!("Denied {} to '{}'", permission, user);
            Err(NodewatcherError::PermissionDenied {
                user: user.to_string(),
                permission: permission.to_string(),
            })
        }
    }

    /// Applies `change` to a copy of the grants and keeps the copy only
    /// once it is written.
    async fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Grants) -> bool,
    {
        let mut grants = self.grants.write().await;
        let mut updated = grants.clone();
        if !change(&mut updated) {
            return Ok(());
        }
        self.persist(&updated).await?;
        *grants = updated;
        Ok(())
    }

    pub async fn grant_global(&self, user: &str, permission: Permission) -> Result<()> {
        self.update(|grants| {
            grants
                .global
                .entry(user.to_string())
                .or_default()
                .insert(permission);
            true
        })
        .await
    }

    pub async fn grant(&self, user: &str, permissions: &[Permission], node: NodeId) -> Result<()> {
        self.update(|grants| {
            grants
                .nodes
                .entry(node)
                .or_default()
                .entry(user.to_string())
                .or_default()
                .extend(permissions.iter().copied());
            true
        })
        .await
    }

    /// Drops every grant on `node`.
    pub async fn revoke_node(&self, node: NodeId) -> Result<()> {
        self.update(|grants| grants.nodes.remove(&node).is_some()).await
    }

    /// Drops the grants of every node. Global grants stay.
    pub async fn revoke_all_nodes(&self) -> Result<()> {
        self.update(|grants| {
            let changed = !grants.nodes.is_empty();
            grants.nodes.clear();
            changed
        })
        .await
    }

    pub async fn node_permissions(&self, user: &str, node: NodeId) -> BTreeSet<Permission> {
        let grants = self.grants.read().await;
        grants
            .nodes
            .get(&node)
            .and_then(|users| users.get(user))
            .cloned()
            .unwrap_or_default()
    }
}
