use httpmock::prelude::*;
use nodewatcher::datastream::{Field, MemoryStreamBackend, StreamBackend, StreamDescriptor};
use nodewatcher::events::EventSinkPool;
use nodewatcher::generator::DeviceRegistry;
use nodewatcher::nodes::{
    JsonNodeRepository, NodeConfig, NodeService, Permission, PermissionStore, StreamResetHandler,
};
use nodewatcher::{LocalStorage, NodewatcherError};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

async fn build_service(
    dir: &TempDir,
    backend: Arc<MemoryStreamBackend>,
    sink_configs: HashMap<String, toml::Table>,
) -> NodeService<LocalStorage> {
    let storage = LocalStorage::new(dir.path());
    let repository = Arc::new(JsonNodeRepository::load(storage.clone()).await.unwrap());
    let permissions = PermissionStore::load(storage, vec!["admin".to_string()])
        .await
        .unwrap();

    NodeService::new(
        repository,
        permissions,
        Arc::new(DeviceRegistry::with_builtin_devices().unwrap()),
        Arc::new(EventSinkPool::new(sink_configs)),
    )
    .with_handler(Arc::new(StreamResetHandler::new(backend)))
}

fn write_uptime(backend: &MemoryStreamBackend, node: &str, uptime: u64) {
    let query: Map<String, Value> = match json!({ "node": node }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };
    let mut attributes = Map::new();
    attributes.insert("uptime".to_string(), json!(uptime));

    let descriptor = StreamDescriptor::new("node", attributes)
        .with_query_tags(query)
        .with_field(Field::integer("uptime"));
    descriptor.fields()[0]
        .to_stream(&descriptor, backend, None)
        .unwrap();
}

#[tokio::test]
async fn test_create_reset_remove_with_webhook() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();

    let created_hook = server.mock(|when, then| {
        when.method(POST)
            .path("/events")
            .body_contains("post_create_node");
        then.status(204);
    });
    let reset_hook = server.mock(|when, then| {
        when.method(POST).path("/events").body_contains("\"reset_node\"");
        then.status(204);
    });
    // 其餘事件沒有對應的 mock，傳送失敗不影響節點操作

    let mut webhook = toml::Table::new();
    webhook.insert("url".to_string(), toml::Value::String(server.url("/events")));
    let sink_configs = HashMap::from([("webhook".to_string(), webhook)]);

    let backend = Arc::new(MemoryStreamBackend::new());
    let service = build_service(&temp_dir, backend.clone(), sink_configs).await;

    service
        .permissions()
        .grant_global("operator", Permission::AddNode)
        .await
        .unwrap();
    let node = service
        .create_node(
            "operator",
            NodeConfig::new("ljubljana-fri", "lede")
                .with_router("ub-uap-ac-pro")
                .with_address("10.254.1.1"),
        )
        .await
        .unwrap();
    created_hook.assert();

    write_uptime(&backend, &node.id.to_string(), 100);
    write_uptime(&backend, "another-node", 100);
    assert_eq!(backend.stream_count().unwrap(), 2);

    // 其他使用者不能重設
    let err = service.reset_node("guest", node.id).await.unwrap_err();
    assert!(matches!(err, NodewatcherError::PermissionDenied { .. }));
    assert_eq!(backend.stream_count().unwrap(), 2);

    service.reset_node("operator", node.id).await.unwrap();
    reset_hook.assert();
    assert_eq!(backend.stream_count().unwrap(), 1);

    write_uptime(&backend, &node.id.to_string(), 5);
    service.remove_node("operator", node.id).await.unwrap();
    assert_eq!(backend.stream_count().unwrap(), 1);
    assert!(service.list_nodes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_nodes_persist_across_services() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(MemoryStreamBackend::new());

    let node = {
        let service = build_service(&temp_dir, backend.clone(), HashMap::new()).await;
        service
            .create_node("admin", NodeConfig::new("maribor-1", "openwrt").with_router("fon-2100"))
            .await
            .unwrap()
    };

    let service = build_service(&temp_dir, backend, HashMap::new()).await;
    let loaded = service.get_node(node.id).await.unwrap();
    assert_eq!(loaded, node);
    assert!(
        service
            .permissions()
            .has_perm("admin", Permission::ResetNode, Some(node.id))
            .await
    );

    let err = service
        .create_node(
            "admin",
            NodeConfig::new("", "openwrt").with_address("300.1.1.1"),
        )
        .await
        .unwrap_err();
    match err {
        NodewatcherError::InvalidNodeConfig { errors } => assert_eq!(errors.len(), 2),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(service.list_nodes().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_import_replaces_nodes() {
    let temp_dir = TempDir::new().unwrap();
    let service = build_service(
        &temp_dir,
        Arc::new(MemoryStreamBackend::new()),
        HashMap::new(),
    )
    .await;
    service
        .create_node("admin", NodeConfig::new("before-import", "lede"))
        .await
        .unwrap();

    let dump = json!([
        {
            "id": "5b8f7a3e-7a0b-4a52-9d0e-2b8f5e0c1a11",
            "name": "imported-1",
            "platform": "lede",
            "router": "ub-uap-lr",
            "address": "10.254.2.1",
            "created_at": "2015-03-01T12:00:00Z",
            "updated_at": "2015-03-01T12:00:00Z"
        },
        {
            "id": "0c4d9b1a-6f21-4c5e-8a57-93e1f0b2d7c4",
            "name": "imported-2",
            "platform": "openwrt",
            "created_at": "2015-03-02T12:00:00Z",
            "updated_at": "2015-03-02T12:00:00Z"
        }
    ]);

    assert_eq!(service.import_nodes(&dump.to_string()).await.unwrap(), 2);
    let names: Vec<String> = service
        .list_nodes()
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.name)
        .collect();
    assert_eq!(names, vec!["imported-1", "imported-2"]);

    let duplicate = json!([dump[0].clone(), dump[0].clone()]);
    assert!(service.import_nodes(&duplicate.to_string()).await.is_err());
    assert_eq!(service.list_nodes().await.unwrap().len(), 2);
}
