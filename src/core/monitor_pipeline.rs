use crate::core::{ConfigProvider, Pipeline, Record, Storage, TransformResult};
use crate::datastream::{
    Field, MemoryStreamBackend, StreamBackend, StreamDescriptor, TagReference, TagValue,
};
use crate::domain::model::RunReport;
use crate::events::{Event, EventSinkPool};
use crate::nodes::{Node, NodeRepository};
use crate::utils::error::Result;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Polls node telemetry and stores it as datastreams.
pub struct MonitorPipeline<C: ConfigProvider> {
    config: C,
    nodes: Arc<dyn NodeRepository>,
    backend: Arc<dyn StreamBackend>,
    events: Arc<EventSinkPool>,
    client: Client,
}

impl<C: ConfigProvider> MonitorPipeline<C> {
    pub fn new(
        config: C,
        nodes: Arc<dyn NodeRepository>,
        backend: Arc<dyn StreamBackend>,
        events: Arc<EventSinkPool>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds()))
            .build()?;

        Ok(Self {
            config,
            nodes,
            backend,
            events,
            client,
        })
    }

    fn telemetry_url(&self, address: &str) -> String {
        // IPv6 位址需要加上中括號
        let host = if address.contains(':') {
            format!("[{}]", address)
        } else {
            address.to_string()
        };
        self.config.telemetry_url().replace("{address}", &host)
    }
}

async fn fetch_telemetry(client: &Client, url: &str) -> Result<Value> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.json().await?)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn section<'a>(telemetry: &'a Value, name: &str) -> Option<&'a Map<String, Value>> {
    telemetry.get(name).and_then(Value::as_object)
}

/// Builds the descriptor of one network interface.
fn interface_descriptor(
    node: &str,
    interface: &str,
    data: &Value,
    config: &impl ConfigProvider,
) -> StreamDescriptor {
    let query_tags = object(json!({ "node": node, "interface": interface }));
    let label = |template: &str| {
        let mut tags = crate::datastream::TagMap::new();
        tags.insert(
            "label".to_string(),
            TagValue::from(TagReference::format(&["interface"], template)),
        );
        tags
    };

    let mut descriptor = StreamDescriptor::new("interface", object(data.clone()))
        .with_tags(query_tags.clone())
        .with_query_tags(query_tags)
        .with_highest_granularity(config.highest_granularity());

    for direction in ["rx", "tx"] {
        let bytes = format!("{}_bytes", direction);
        let reset = format!("{}_reset", direction);
        let rate = format!("{}_rate", direction);

        descriptor = descriptor
            .with_field(Field::counter(&bytes).with_attribute(&format!("statistics.{}", bytes)))
            .with_field(Field::reset(&reset, &format!("#{}", bytes)))
            .with_field(
                Field::rate(&rate, &format!("#{}", reset), &format!("#{}", bytes), None)
                    .with_tags(label(&format!("{{interface}} {} rate", direction.to_uppercase()))),
            );
    }

    if data.get("wireless").is_some() {
        descriptor = descriptor.with_field(
            Field::integer("clients")
                .with_attribute("wireless.clients")
                .with_tags(label("Clients on {interface}")),
        );
    }

    descriptor
}

/// Builds the node descriptor; `clients` sums over the wireless interfaces.
fn node_descriptor(
    node: &str,
    telemetry: &Value,
    wireless: &[Arc<StreamDescriptor>],
    config: &impl ConfigProvider,
) -> StreamDescriptor {
    let mut attributes = Map::new();
    if let Some(general) = section(telemetry, "core.general") {
        attributes.extend(general.clone());
    }
    if let Some(resources) = section(telemetry, "core.resources") {
        attributes.extend(resources.clone());
    }

    let query_tags = object(json!({ "node": node }));
    let mut descriptor = StreamDescriptor::new("node", attributes.clone())
        .with_tags(query_tags.clone())
        .with_query_tags(query_tags)
        .with_highest_granularity(config.highest_granularity())
        .with_field(Field::integer("uptime"));

    for (index, minutes) in ["1", "5", "15"].iter().enumerate() {
        descriptor = descriptor.with_field(
            Field::float(&format!("load_average_{}", minutes))
                .with_attribute(&format!("load_average.{}", index)),
        );
    }

    for group in ["memory", "processes"] {
        if let Some(Value::Object(values)) = attributes.get(group) {
            for key in values.keys() {
                descriptor = descriptor.with_field(
                    Field::integer(&format!("{}_{}", group, key))
                        .with_attribute(&format!("{}.{}", group, key)),
                );
            }
        }
    }

    let mut clients = Field::dynamic_sum("clients_total");
    for interface in wireless {
        if let Err(e) = clients.add_source_field("clients", interface.clone()) {
            tracing::warn!("Cannot sum clients of {}: {}", interface.model_name(), e);
        }
    }
    descriptor.with_field(clients)
}

#[async_trait::async_trait]
impl<C: ConfigProvider> Pipeline for MonitorPipeline<C> {
    async fn extract(&self) -> Result<Vec<Record>> {
        let nodes: Vec<Node> = self
            .nodes
            .list()
            .await?
            .into_iter()
            .filter(|n| n.address.is_some())
            .collect();

        tracing::debug!(
            "Polling {} nodes with {} concurrent requests",
            nodes.len(),
            self.config.concurrent_requests()
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrent_requests().max(1)));
        let mut tasks = JoinSet::new();

        for (index, node) in nodes.into_iter().enumerate() {
            let address = node.address.clone().unwrap_or_default();
            let url = self.telemetry_url(&address);
            let client = self.client.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                tracing::debug!("Fetching telemetry of '{}' from {}", node.name, url);

                let result = fetch_telemetry(&client, &url).await;
                let (telemetry, error) = match result {
                    Ok(telemetry) => (Some(telemetry), None),
                    Err(e) => {
                        tracing::warn!("⚠️ Node '{}' unreachable: {}", node.name, e);
                        (None, Some(e.to_string()))
                    }
                };

                (
                    index,
                    Record {
                        node: node.id,
                        address,
                        fetched_at: Utc::now(),
                        telemetry,
                        error,
                    },
                )
            });
        }

        let mut records = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(record) => records.push(record),
                Err(e) => tracing::error!("❌ Telemetry task failed: {}", e),
            }
        }
        records.sort_by_key(|(index, _)| *index);

        Ok(records.into_iter().map(|(_, record)| record).collect())
    }

    async fn transform(&self, data: Vec<Record>) -> Result<TransformResult> {
        let mut result = TransformResult {
            timestamp: Some(Utc::now()),
            polled: data.len(),
            ..Default::default()
        };

        for record in data {
            let Some(telemetry) = record.telemetry.as_ref() else {
                result.unreachable.push(record);
                continue;
            };

            let node = record.node.to_string();
            let mut wireless = Vec::new();

            if let Some(interfaces) = section(telemetry, "core.interfaces") {
                for (name, data) in interfaces {
                    let descriptor =
                        Arc::new(interface_descriptor(&node, name, data, &self.config));
                    if data.get("wireless").is_some() {
                        wireless.push(descriptor.clone());
                    }
                    result.descriptors.push(descriptor);
                }
            }

            result.descriptors.push(Arc::new(node_descriptor(
                &node,
                telemetry,
                &wireless,
                &self.config,
            )));
        }

        Ok(result)
    }

    async fn load(&self, result: TransformResult) -> Result<RunReport> {
        let timestamp = result.timestamp.unwrap_or_else(Utc::now);
        let mut report = RunReport {
            polled: result.polled,
            unreachable: result.unreachable.len(),
            ..Default::default()
        };

        for descriptor in &result.descriptors {
            for field in descriptor.fields() {
                match field.to_stream(descriptor, self.backend.as_ref(), Some(timestamp)) {
                    Ok(written) => {
                        report.streams += 1;
                        report.datapoints += written;
                    }
                    Err(e) => tracing::warn!(
                        "Skipping field '{}' of {}: {}",
                        field.name(),
                        descriptor.model_name(),
                        e
                    ),
                }
            }
        }

        for record in &result.unreachable {
            let event = Event::new("monitor", "node_unreachable")
                .with_node(record.node)
                .with_data(json!({
                    "address": record.address,
                    "error": record.error,
                }));
            self.events.dispatch(&event).await;
        }

        Ok(report)
    }
}

/// Writes one CSV file per stream and returns the number of files.
pub async fn export_streams<S: Storage>(backend: &MemoryStreamBackend, storage: &S) -> Result<usize> {
    let streams = backend.all_streams()?;

    for stream in &streams {
        // 串流名稱放在檔名最後
        let parts: Vec<String> = stream
            .query_tags
            .iter()
            .filter(|(key, _)| key.as_str() != "name")
            .chain(stream.query_tags.get_key_value("name"))
            .map(|(_, v)| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        let name: String = format!("{}_{}", stream.id, parts.join("_"))
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();

        let mut data = Vec::new();
        backend.export_csv(stream.id, &mut data)?;
        storage.write_file(&format!("{}.csv", name), &data).await?;
    }

    tracing::debug!("Exported {} streams", streams.len());
    Ok(streams.len())
}
