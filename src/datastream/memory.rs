use crate::datastream::backend::{
    tags_match, Datapoint, DeriveOp, DeriveSpec, Downsampler, EnsureStream, StreamBackend,
    StreamId, StreamInfo, ValueType,
};
use crate::datastream::descriptor::Granularity;
use crate::utils::error::{NodewatcherError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug)]
struct StoredStream {
    query_tags: Map<String, Value>,
    tags: Map<String, Value>,
    value_type: ValueType,
    downsamplers: Vec<Downsampler>,
    highest_granularity: Granularity,
    derive: Option<DeriveSpec>,
    /// Last datapoint seen on each derive input.
    inputs_last: Vec<Option<Datapoint>>,
    points: Vec<Datapoint>,
}

impl StoredStream {
    fn info(&self, id: StreamId) -> StreamInfo {
        StreamInfo {
            id,
            query_tags: self.query_tags.clone(),
            tags: self.tags.clone(),
            value_type: self.value_type,
            downsamplers: self.downsamplers.clone(),
            highest_granularity: self.highest_granularity,
            derived: self.derive.as_ref().map(|d| d.op),
            datapoints: self.points.len(),
        }
    }

    fn is_consistent(&self, request: &EnsureStream) -> bool {
        let derivation_matches = match (&self.derive, &request.derive) {
            (None, None) => true,
            (Some(current), Some(requested)) => current.same_derivation(requested),
            _ => false,
        };

        derivation_matches
            && self.value_type == request.value_type
            && self.downsamplers == request.downsamplers
            && self.highest_granularity == request.highest_granularity
    }

    fn input_index(&self, stream: StreamId) -> Vec<usize> {
        self.derive
            .as_ref()
            .map(|d| {
                d.inputs
                    .iter()
                    .enumerate()
                    .filter(|(_, input)| input.stream == stream)
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Feeds one input datapoint through the derivation and returns the
    /// datapoint to emit, if any.
    fn derive_point(&mut self, input: usize, point: &Datapoint) -> Option<Datapoint> {
        let derive = self.derive.as_ref()?;
        let previous = self.inputs_last.get(input).cloned().flatten();

        let output = match derive.op {
            DeriveOp::CounterReset => {
                let current = point.value.as_f64()?;
                previous
                    .and_then(|p| p.value.as_f64())
                    .filter(|last| current < *last)
                    .map(|_| Datapoint {
                        timestamp: point.timestamp,
                        value: Value::from(1),
                    })
            }
            DeriveOp::CounterDerivative => {
                let is_reset_input = derive
                    .inputs
                    .get(input)
                    .and_then(|i| i.name.as_deref())
                    == Some("reset");

                if is_reset_input {
                    None
                } else {
                    let reset_at = derive
                        .inputs
                        .iter()
                        .position(|i| i.name.as_deref() == Some("reset"))
                        .and_then(|idx| self.inputs_last.get(idx).cloned().flatten())
                        .map(|p| p.timestamp);
                    let max_value = derive.arguments.get("max_value").and_then(Value::as_f64);
                    counter_rate(previous.as_ref(), point, reset_at, max_value)
                }
            }
            DeriveOp::Sum => {
                if let Some(slot) = self.inputs_last.get_mut(input) {
                    *slot = Some(point.clone());
                }
                let total: f64 = self
                    .inputs_last
                    .iter()
                    .flatten()
                    .filter_map(|p| p.value.as_f64())
                    .sum();
                Some(Datapoint {
                    timestamp: point.timestamp,
                    value: serde_json::json!(total),
                })
            }
        };

        if let Some(slot) = self.inputs_last.get_mut(input) {
            *slot = Some(point.clone());
        }

        output
    }

    fn push(&mut self, point: Datapoint) {
        // 加總串流在同一時間點只保留最新結果
        let replace = matches!(self.derive.as_ref().map(|d| d.op), Some(DeriveOp::Sum))
            && self.points.last().map(|p| p.timestamp) == Some(point.timestamp);
        if replace {
            if let Some(last) = self.points.last_mut() {
                *last = point;
            }
        } else {
            self.points.push(point);
        }
    }
}

fn counter_rate(
    previous: Option<&Datapoint>,
    point: &Datapoint,
    reset_at: Option<DateTime<Utc>>,
    max_value: Option<f64>,
) -> Option<Datapoint> {
    let previous = previous?;
    let elapsed = (point.timestamp - previous.timestamp).num_milliseconds() as f64 / 1000.0;
    if elapsed <= 0.0 || reset_at == Some(point.timestamp) {
        return None;
    }

    let delta = point.value.as_f64()? - previous.value.as_f64()?;
    if delta < 0.0 {
        return None;
    }

    let rate = delta / elapsed;
    if max_value.is_some_and(|max| rate > max) {
        return None;
    }

    Some(Datapoint {
        timestamp: point.timestamp,
        value: serde_json::json!(rate),
    })
}

#[derive(Debug, Default)]
struct Streams {
    next_id: u64,
    streams: BTreeMap<StreamId, StoredStream>,
}

impl Streams {
    fn get(&self, id: StreamId) -> Result<&StoredStream> {
        self.streams
            .get(&id)
            .ok_or_else(|| NodewatcherError::StreamNotFound {
                stream: id.to_string(),
            })
    }

    fn dependents(&self, id: StreamId) -> Vec<StreamId> {
        self.streams
            .iter()
            .filter(|(_, s)| !s.input_index(id).is_empty())
            .map(|(dependent, _)| *dependent)
            .collect()
    }

    /// Stores `point` in `id` and propagates it to derived streams in
    /// creation order. Returns the number of datapoints written.
    fn insert(&mut self, id: StreamId, point: Datapoint) -> usize {
        let Some(stream) = self.streams.get_mut(&id) else {
            return 0;
        };
        stream.push(point.clone());
        let mut written = 1;

        for dependent in self.dependents(id) {
            let outputs: Vec<Datapoint> = match self.streams.get_mut(&dependent) {
                Some(stream) => stream
                    .input_index(id)
                    .into_iter()
                    .filter_map(|input| stream.derive_point(input, &point))
                    .collect(),
                None => Vec::new(),
            };
            for output in outputs {
                written += self.insert(dependent, output);
            }
        }

        written
    }

    fn backprocess(&mut self, id: StreamId) -> Result<()> {
        let inputs: Vec<StreamId> = match self.get(id)?.derive.as_ref() {
            Some(derive) => derive.inputs.iter().map(|i| i.stream).collect(),
            None => return Ok(()),
        };

        let mut replay = Vec::new();
        for (index, input) in inputs.iter().enumerate() {
            for point in &self.get(*input)?.points {
                replay.push((point.timestamp, index, point.clone()));
            }
        }
        replay.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        if let Some(stream) = self.streams.get_mut(&id) {
            for (_, index, point) in replay {
                if let Some(output) = stream.derive_point(index, &point) {
                    stream.push(output);
                }
            }
        }
        Ok(())
    }
}

/// One downsampled bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<Downsampler, f64>,
}

/// In-process stream backend used by the monitor and the tests.
#[derive(Debug, Default)]
pub struct MemoryStreamBackend {
    inner: RwLock<Streams>,
}

impl MemoryStreamBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Streams>> {
        self.inner
            .read()
            .map_err(|e| NodewatcherError::ProcessingError {
                message: format!("Stream backend lock poisoned: {}", e),
            })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Streams>> {
        self.inner
            .write()
            .map_err(|e| NodewatcherError::ProcessingError {
                message: format!("Stream backend lock poisoned: {}", e),
            })
    }

    pub fn stream_count(&self) -> Result<usize> {
        Ok(self.read()?.streams.len())
    }

    pub fn all_streams(&self) -> Result<Vec<StreamInfo>> {
        self.find_streams(&Map::new())
    }

    /// Aggregates the datapoints of a stream into buckets of `granularity`.
    ///
    /// Values that are not numeric only contribute to the `count` downsampler.
    pub fn downsample(&self, stream: StreamId, granularity: Granularity) -> Result<Vec<Bucket>> {
        let streams = self.read()?;
        let stored = streams.get(stream)?;

        if granularity < stored.highest_granularity {
            return Err(NodewatcherError::InvalidGranularity {
                requested: granularity.to_string(),
                highest: stored.highest_granularity.to_string(),
            });
        }

        let mut grouped: BTreeMap<DateTime<Utc>, Vec<&Value>> = BTreeMap::new();
        for point in &stored.points {
            grouped
                .entry(granularity.bucket_start(point.timestamp))
                .or_default()
                .push(&point.value);
        }

        let buckets = grouped
            .into_iter()
            .map(|(timestamp, values)| {
                let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
                let mut aggregated = BTreeMap::new();
                for downsampler in &stored.downsamplers {
                    let value = match downsampler {
                        Downsampler::Count => Some(values.len() as f64),
                        _ if numbers.is_empty() => None,
                        Downsampler::Sum => Some(numbers.iter().sum()),
                        Downsampler::Mean => Some(mean(&numbers)),
                        Downsampler::Min => numbers.iter().copied().reduce(f64::min),
                        Downsampler::Max => numbers.iter().copied().reduce(f64::max),
                        Downsampler::StdDev => {
                            let mean = mean(&numbers);
                            let variance = numbers.iter().map(|n| (n - mean).powi(2)).sum::<f64>()
                                / numbers.len() as f64;
                            Some(variance.sqrt())
                        }
                    };
                    if let Some(value) = value {
                        aggregated.insert(*downsampler, value);
                    }
                }
                Bucket {
                    timestamp,
                    values: aggregated,
                }
            })
            .collect();

        Ok(buckets)
    }

    /// Writes `timestamp,value` rows for one stream.
    pub fn export_csv<W: Write>(&self, stream: StreamId, writer: W) -> Result<usize> {
        let points = self.datapoints(stream)?;
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(["timestamp", "value"])?;
        for point in &points {
            let value = match &point.value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            csv_writer.write_record([point.timestamp.to_rfc3339(), value])?;
        }
        csv_writer.flush()?;
        Ok(points.len())
    }
}

fn mean(numbers: &[f64]) -> f64 {
    numbers.iter().sum::<f64>() / numbers.len() as f64
}

impl StreamBackend for MemoryStreamBackend {
    fn ensure_stream(&self, request: EnsureStream) -> Result<StreamId> {
        let mut streams = self.write()?;

        let existing = streams
            .streams
            .iter()
            .find(|(_, s)| s.query_tags == request.query_tags)
            .map(|(id, _)| *id);

        if let Some(id) = existing {
            let stored = streams
                .streams
                .get_mut(&id)
                .ok_or_else(|| NodewatcherError::StreamNotFound {
                    stream: id.to_string(),
                })?;
            if !stored.is_consistent(&request) {
                return Err(NodewatcherError::InconsistentStreamConfiguration {
                    query: Value::Object(request.query_tags).to_string(),
                });
            }
            stored.tags = request.tags;
            return Ok(id);
        }

        if let Some(derive) = &request.derive {
            for input in &derive.inputs {
                streams.get(input.stream)?;
            }
        }

        streams.next_id += 1;
        let id = StreamId(streams.next_id);
        let backprocess = request.derive.as_ref().is_some_and(|d| d.backprocess);
        let inputs = request.derive.as_ref().map_or(0, |d| d.inputs.len());

        let query = Value::Object(request.query_tags.clone());
        tracing::debug!("Created stream {} for {}", id, query);
        streams.streams.insert(
            id,
            StoredStream {
                query_tags: request.query_tags,
                tags: request.tags,
                value_type: request.value_type,
                downsamplers: request.downsamplers,
                highest_granularity: request.highest_granularity,
                derive: request.derive,
                inputs_last: vec![None; inputs],
                points: Vec::new(),
            },
        );

        if backprocess {
            streams.backprocess(id)?;
        }
        Ok(id)
    }

    fn append(
        &self,
        stream: StreamId,
        value: Value,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let mut streams = self.write()?;
        streams.get(stream)?;

        let point = Datapoint {
            timestamp: timestamp.unwrap_or_else(Utc::now),
            value,
        };
        Ok(streams.insert(stream, point))
    }

    fn delete_streams(&self, query_tags: &Map<String, Value>) -> Result<usize> {
        let mut streams = self.write()?;
        let before = streams.streams.len();
        streams
            .streams
            .retain(|_, s| !tags_match(&s.query_tags, query_tags));
        Ok(before - streams.streams.len())
    }

    fn delete_stream(&self, stream: StreamId) -> Result<()> {
        match self.write()?.streams.remove(&stream) {
            Some(_) => Ok(()),
            None => Err(NodewatcherError::StreamNotFound {
                stream: stream.to_string(),
            }),
        }
    }

    fn find_streams(&self, query_tags: &Map<String, Value>) -> Result<Vec<StreamInfo>> {
        let streams = self.read()?;
        Ok(streams
            .streams
            .iter()
            .filter(|(_, s)| tags_match(&s.query_tags, query_tags))
            .map(|(id, s)| s.info(*id))
            .collect())
    }

    fn datapoints(&self, stream: StreamId) -> Result<Vec<Datapoint>> {
        Ok(self.read()?.get(stream)?.points.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastream::descriptor::StreamDescriptor;
    use crate::datastream::fields::Field;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use std::sync::Arc;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn request(name: &str) -> EnsureStream {
        EnsureStream {
            query_tags: object(json!({"node": "n1", "name": name})),
            tags: Map::new(),
            downsamplers: Downsampler::numeric(),
            highest_granularity: Granularity::Minutes,
            value_type: ValueType::Numeric,
            derive: None,
        }
    }

    fn interface(tx_bytes: u64) -> StreamDescriptor {
        StreamDescriptor::new("interface", object(json!({"tx_bytes": tx_bytes})))
            .with_query_tags(object(json!({"node": "n1", "interface": "wlan0"})))
            .with_field(Field::counter("tx_bytes"))
            .with_field(Field::reset("tx_reset", "#tx_bytes"))
            .with_field(Field::rate("tx_rate", "#tx_reset", "#tx_bytes", Some(1_000.0)))
    }

    fn write_all(backend: &MemoryStreamBackend, descriptor: &StreamDescriptor, ts: DateTime<Utc>) {
        for field in descriptor.fields() {
            field.to_stream(descriptor, backend, Some(ts)).unwrap();
        }
    }

    fn values(backend: &MemoryStreamBackend, name: &str) -> Vec<Value> {
        let info = backend.find_streams(&object(json!({"name": name}))).unwrap();
        backend
            .datapoints(info[0].id)
            .unwrap()
            .into_iter()
            .map(|p| p.value)
            .collect()
    }

    #[test]
    fn test_ensure_stream_is_idempotent() {
        let backend = MemoryStreamBackend::new();
        let first = backend.ensure_stream(request("a")).unwrap();
        let mut updated = request("a");
        updated.tags = object(json!({"title": "A"}));
        assert_eq!(backend.ensure_stream(updated).unwrap(), first);
        assert_eq!(backend.all_streams().unwrap()[0].tags["title"], json!("A"));
        assert_ne!(backend.ensure_stream(request("b")).unwrap(), first);
    }

    #[test]
    fn test_inconsistent_configuration() {
        let backend = MemoryStreamBackend::new();
        backend.ensure_stream(request("a")).unwrap();

        let mut changed = request("a");
        changed.highest_granularity = Granularity::Hours;
        let err = backend.ensure_stream(changed).unwrap_err();
        assert!(matches!(err, NodewatcherError::InconsistentStreamConfiguration { .. }));

        let mut changed = request("a");
        changed.value_type = ValueType::Nominal;
        assert!(backend.ensure_stream(changed).is_err());
    }

    #[test]
    fn test_counter_rate_and_reset() {
        let backend = MemoryStreamBackend::new();
        write_all(&backend, &interface(1_000), at(0));
        write_all(&backend, &interface(7_000), at(60));
        // 計數器歸零
        write_all(&backend, &interface(500), at(120));
        write_all(&backend, &interface(3_500), at(180));
        // 超過 max_value 的速率會被丟棄
        write_all(&backend, &interface(200_000), at(240));

        assert_eq!(values(&backend, "tx_bytes").len(), 5);
        assert_eq!(values(&backend, "tx_reset"), vec![json!(1)]);
        assert_eq!(values(&backend, "tx_rate"), vec![json!(100.0), json!(50.0)]);
    }

    #[test]
    fn test_backprocess_on_creation() {
        let backend = MemoryStreamBackend::new();
        let counter_only = StreamDescriptor::new("interface", object(json!({"tx_bytes": 0})))
            .with_query_tags(object(json!({"node": "n1", "interface": "wlan0"})))
            .with_field(Field::counter("tx_bytes"));

        for (ts, value) in [(0, 100), (10, 200), (20, 50)] {
            let descriptor = StreamDescriptor::new("interface", object(json!({"tx_bytes": value})))
                .with_query_tags(counter_only.query_tags().clone())
                .with_field(Field::counter("tx_bytes"));
            write_all(&backend, &descriptor, at(ts));
        }

        let full = interface(50);
        full.field("tx_rate")
            .unwrap()
            .ensure_stream(&full, &backend)
            .unwrap();

        assert_eq!(values(&backend, "tx_reset"), vec![json!(1)]);
        assert_eq!(values(&backend, "tx_rate"), vec![json!(10.0)]);
    }

    #[test]
    fn test_dynamic_sum_recreated_when_sources_change() {
        let backend = MemoryStreamBackend::new();
        let radio = |name: &str, clients: u64, ts: i64| {
            let descriptor = Arc::new(
                StreamDescriptor::new("radio", object(json!({"clients": clients})))
                    .with_query_tags(object(json!({"node": "n1", "radio": name})))
                    .with_field(Field::integer("clients")),
            );
            write_all(&backend, &descriptor, at(ts));
            descriptor
        };

        let wifi0 = radio("wifi0", 3, 0);
        let wifi1 = radio("wifi1", 4, 0);

        let mut total = Field::dynamic_sum("clients_total");
        total.add_source_field("clients", wifi0.clone()).unwrap();
        total.add_source_field("clients", wifi1.clone()).unwrap();
        let node = StreamDescriptor::new("node", Map::new())
            .with_query_tags(object(json!({"node": "n1"})))
            .with_field(total.clone());
        node.fields()[0].ensure_stream(&node, &backend).unwrap();
        assert_eq!(values(&backend, "clients_total").last(), Some(&json!(7.0)));

        total.clear_source_fields();
        total.add_source_field("clients", wifi0).unwrap();
        let node = StreamDescriptor::new("node", Map::new())
            .with_query_tags(object(json!({"node": "n1"})))
            .with_field(total);
        node.fields()[0].ensure_stream(&node, &backend).unwrap();

        // 重建後不回溯處理
        assert!(values(&backend, "clients_total").is_empty());
        radio("wifi0", 5, 60);
        assert_eq!(values(&backend, "clients_total"), vec![json!(5.0)]);
    }

    #[test]
    fn test_downsample() {
        let backend = MemoryStreamBackend::new();
        let id = backend.ensure_stream(request("load")).unwrap();
        for (ts, value) in [(0, 1.0), (30, 3.0), (70, 5.0)] {
            backend.append(id, json!(value), Some(at(ts))).unwrap();
        }

        let buckets = backend.downsample(id, Granularity::Minutes).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].values[&Downsampler::Mean], 2.0);
        assert_eq!(buckets[0].values[&Downsampler::StdDev], 1.0);
        assert_eq!(buckets[0].values[&Downsampler::Count], 2.0);
        assert_eq!(buckets[1].values[&Downsampler::Max], 5.0);

        let hourly = backend.downsample(id, Granularity::Hours).unwrap();
        assert_eq!(hourly.len(), 1);
        assert_eq!(hourly[0].values[&Downsampler::Sum], 9.0);

        let err = backend.downsample(id, Granularity::Seconds).unwrap_err();
        assert!(matches!(err, NodewatcherError::InvalidGranularity { .. }));
    }

    #[test]
    fn test_delete_and_export() {
        let backend = MemoryStreamBackend::new();
        let id = backend.ensure_stream(request("status")).unwrap();
        backend.append(id, json!("up"), Some(at(0))).unwrap();
        backend.ensure_stream(request("other")).unwrap();

        let mut out = Vec::new();
        assert_eq!(backend.export_csv(id, &mut out).unwrap(), 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "timestamp,value\n2024-01-01T00:00:00+00:00,up\n"
        );

        assert_eq!(backend.delete_streams(&object(json!({"node": "n1"}))).unwrap(), 2);
        assert_eq!(backend.stream_count().unwrap(), 0);
        assert!(matches!(
            backend.datapoints(id).unwrap_err(),
            NodewatcherError::StreamNotFound { .. }
        ));
    }

    #[test]
    fn test_delete_single_stream() {
        let backend = MemoryStreamBackend::new();
        let status = backend.ensure_stream(request("status")).unwrap();
        let other = backend.ensure_stream(request("other")).unwrap();

        backend.delete_stream(status).unwrap();
        assert_eq!(backend.stream_count().unwrap(), 1);
        assert!(backend.datapoints(other).is_ok());
        assert!(matches!(
            backend.delete_stream(status),
            Err(NodewatcherError::StreamNotFound { .. })
        ));
    }
}
