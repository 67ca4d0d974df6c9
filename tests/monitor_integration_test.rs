use async_trait::async_trait;
use httpmock::prelude::*;
use nodewatcher::datastream::{MemoryStreamBackend, StreamBackend};
use nodewatcher::events::{Event, EventSink, EventSinkPool};
use nodewatcher::nodes::{JsonNodeRepository, Node, NodeConfig, NodeRepository};
use nodewatcher::{LocalStorage, MonitorEngine, MonitorPipeline, NodewatcherConfig};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

#[async_trait]
impl EventSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, event: &Event) -> nodewatcher::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

fn telemetry(rx: u64, tx: u64, clients: u64) -> Value {
    json!({
        "core.general": {"uptime": 7200},
        "core.resources": {
            "load_average": [0.1, 0.2, 0.3],
            "memory": {"free": 2048, "total": 32768},
            "processes": {"running": 2, "total": 40}
        },
        "core.interfaces": {
            "eth0": {"statistics": {"rx_bytes": rx, "tx_bytes": tx}},
            "wlan0": {
                "statistics": {"rx_bytes": rx * 2, "tx_bytes": tx * 2},
                "wireless": {"clients": clients}
            }
        }
    })
}

fn query(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn config_for(server: &MockServer) -> NodewatcherConfig {
    NodewatcherConfig::from_toml_str(&format!(
        r#"
[monitor]
telemetry_url = "http://{{address}}:{}/telemetry"
concurrent_requests = 2
timeout_seconds = 2
"#,
        server.port()
    ))
    .unwrap()
}

#[tokio::test]
async fn test_monitoring_pass_stores_datastreams() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();

    let mut telemetry_mock = server.mock(|when, then| {
        when.method(GET).path("/telemetry");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(telemetry(1_000, 2_000, 4));
    });

    let repository = Arc::new(
        JsonNodeRepository::load(LocalStorage::new(temp_dir.path()))
            .await
            .unwrap(),
    );
    let online = Node::from_config(NodeConfig::new("online", "lede").with_address("127.0.0.1"));
    // 沒有服務在 127.0.0.2 上監聽
    let offline = Node::from_config(NodeConfig::new("offline", "lede").with_address("127.0.0.2"));
    let no_address = Node::from_config(NodeConfig::new("planned", "lede"));
    for node in [&online, &offline, &no_address] {
        repository.save(node.clone()).await.unwrap();
    }

    let events = Arc::new(EventSinkPool::default());
    let sink = Arc::new(RecordingSink::default());
    events.register_instance(sink.clone()).unwrap();

    let backend = Arc::new(MemoryStreamBackend::new());
    let pipeline = MonitorPipeline::new(
        config_for(&server),
        repository.clone(),
        backend.clone(),
        events,
    )
    .unwrap();
    let engine = MonitorEngine::new(pipeline);

    let report = engine.run().await.unwrap();
    telemetry_mock.assert();
    assert_eq!(report.polled, 2);
    assert_eq!(report.unreachable, 1);
    assert!(report.datapoints > 0);

    let node_id = online.id.to_string();
    let uptime = backend
        .find_streams(&query(json!({"node": node_id, "name": "uptime"})))
        .unwrap();
    assert_eq!(uptime.len(), 1);
    assert_eq!(backend.datapoints(uptime[0].id).unwrap()[0].value, json!(7200));

    let total = backend
        .find_streams(&query(json!({"node": node_id, "name": "clients_total"})))
        .unwrap();
    assert_eq!(backend.datapoints(total[0].id).unwrap()[0].value, json!(4.0));

    {
        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "node_unreachable");
        assert_eq!(events[0].node, Some(offline.id));
    }

    // 第二次輪詢產生速率資料
    telemetry_mock.delete();
    server.mock(|when, then| {
        when.method(GET).path("/telemetry");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(telemetry(5_000, 2_500, 6));
    });
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    engine.run().await.unwrap();

    let rates = backend
        .find_streams(&query(json!({"node": node_id, "interface": "eth0", "name": "rx_rate"})))
        .unwrap();
    let points = backend.datapoints(rates[0].id).unwrap();
    assert_eq!(points.len(), 1);
    assert!(points[0].value.as_f64().unwrap() > 0.0);
    assert_eq!(rates[0].tags["label"], json!("eth0 RX rate"));
}

#[tokio::test]
async fn test_export_writes_csv_per_stream() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/telemetry");
        then.status(200).json_body(telemetry(10, 20, 1));
    });

    let repository = Arc::new(
        JsonNodeRepository::load(LocalStorage::new(temp_dir.path().join("data")))
            .await
            .unwrap(),
    );
    repository
        .save(Node::from_config(
            NodeConfig::new("n", "lede").with_address("127.0.0.1"),
        ))
        .await
        .unwrap();

    let backend = Arc::new(MemoryStreamBackend::new());
    let pipeline = MonitorPipeline::new(
        config_for(&server),
        repository,
        backend.clone(),
        Arc::new(EventSinkPool::default()),
    )
    .unwrap();
    MonitorEngine::new(pipeline).run().await.unwrap();

    let export_dir = temp_dir.path().join("export");
    let files = nodewatcher::core::monitor_pipeline::export_streams(
        &backend,
        &LocalStorage::new(&export_dir),
    )
    .await
    .unwrap();

    assert_eq!(files, backend.stream_count().unwrap());
    let written = std::fs::read_dir(&export_dir).unwrap().count();
    assert_eq!(written, files);

    let uptime_file = std::fs::read_dir(&export_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .find(|path| path.to_string_lossy().ends_with("_uptime.csv"))
        .unwrap();
    let content = std::fs::read_to_string(uptime_file).unwrap();
    assert!(content.starts_with("timestamp,value\n"));
    assert!(content.trim_end().ends_with(",7200"));
}
