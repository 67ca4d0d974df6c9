//! Nodes and the editor operations on them.

pub mod model;
pub mod permissions;
pub mod repository;
pub mod service;
pub mod signals;

pub use model::{Node, NodeConfig, NodeId};
pub use permissions::{Permission, PermissionStore};
pub use repository::{JsonNodeRepository, NodeRepository};
pub use service::NodeService;
pub use signals::{NodeSignal, NodeSignalHandler, NodeSignalKind, StreamResetHandler};
