//! Datastream fields.
//!
//! A field describes how one attribute of a monitored object becomes a
//! stream: which value it reads, how the value is coerced, which tags and
//! downsamplers the stream gets, and for derived fields which other streams
//! it is computed from.

use crate::datastream::backend::{
    DeriveInput, DeriveOp, DeriveSpec, Downsampler, EnsureStream, StreamBackend, StreamId,
    ValueType,
};
use crate::datastream::descriptor::StreamDescriptor;
use crate::datastream::tags::{self, TagMap, TagValue};
use crate::utils::error::{NodewatcherError, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Input of a derived field, `field` is `"reference#field"` where an empty
/// reference means the same descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedInput {
    pub name: Option<String>,
    pub field: String,
}

impl DerivedInput {
    pub fn new(name: Option<&str>, field: &str) -> Self {
        Self {
            name: name.map(str::to_string),
            field: field.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Plain,
    Integer,
    Counter,
    Float,
    MultiPoint,
    Graph,
    Nominal,
    IntegerNominal,
    IntegerArrayNominal,
    Derived {
        inputs: Vec<DerivedInput>,
        op: DeriveOp,
        arguments: Value,
    },
    DynamicSum {
        sources: Vec<(String, Arc<StreamDescriptor>)>,
    },
}

#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    attribute: Option<String>,
    custom_tags: TagMap,
    default_tags: TagMap,
    downsamplers: Vec<Downsampler>,
    value_type: ValueType,
    kind: FieldKind,
}

impl Field {
    fn new(name: &str, kind: FieldKind, value_type: ValueType) -> Self {
        let downsamplers = match value_type {
            ValueType::Numeric => Downsampler::numeric(),
            ValueType::Graph | ValueType::Nominal => vec![Downsampler::Count],
        };

        Self {
            name: name.to_string(),
            attribute: None,
            custom_tags: TagMap::new(),
            default_tags: TagMap::new(),
            downsamplers,
            value_type,
            kind,
        }
    }

    pub fn plain(name: &str, value_type: ValueType) -> Self {
        Self::new(name, FieldKind::Plain, value_type)
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, FieldKind::Integer, ValueType::Numeric)
    }

    /// Monotonic counter; not shown by default and without downsamplers.
    pub fn counter(name: &str) -> Self {
        let mut field = Self::new(name, FieldKind::Counter, ValueType::Numeric);
        field.downsamplers = Vec::new();
        let mut visualization = TagMap::new();
        visualization.insert("initial_set".to_string(), TagValue::from(false));
        field
            .custom_tags
            .insert("visualization".to_string(), TagValue::Map(visualization));
        field.default_tags = field.custom_tags.clone();
        field
    }

    pub fn float(name: &str) -> Self {
        Self::new(name, FieldKind::Float, ValueType::Numeric)
    }

    /// Accepts already downsampled datapoints.
    pub fn multipoint(name: &str) -> Self {
        Self::new(name, FieldKind::MultiPoint, ValueType::Numeric)
    }

    pub fn graph(name: &str) -> Self {
        Self::new(name, FieldKind::Graph, ValueType::Graph)
    }

    pub fn nominal(name: &str) -> Self {
        Self::new(name, FieldKind::Nominal, ValueType::Nominal)
    }

    pub fn integer_nominal(name: &str) -> Self {
        Self::new(name, FieldKind::IntegerNominal, ValueType::Nominal)
    }

    pub fn integer_array_nominal(name: &str) -> Self {
        Self::new(name, FieldKind::IntegerArrayNominal, ValueType::Nominal)
    }

    pub fn derived(
        name: &str,
        inputs: Vec<DerivedInput>,
        op: DeriveOp,
        arguments: Value,
        value_type: ValueType,
    ) -> Self {
        Self::new(
            name,
            FieldKind::Derived {
                inputs,
                op,
                arguments,
            },
            value_type,
        )
    }

    /// Emits a datapoint whenever the counter in `field` resets.
    pub fn reset(name: &str, field: &str) -> Self {
        Self::derived(
            name,
            vec![DerivedInput::new(Some("reset"), field)],
            DeriveOp::CounterReset,
            json!({}),
            ValueType::Nominal,
        )
    }

    /// Rate of change of the counter in `data_field`, ignoring resets
    /// reported by `reset_field` and rates above `max_value`.
    pub fn rate(name: &str, reset_field: &str, data_field: &str, max_value: Option<f64>) -> Self {
        Self::derived(
            name,
            vec![
                DerivedInput::new(Some("reset"), reset_field),
                DerivedInput::new(None, data_field),
            ],
            DeriveOp::CounterDerivative,
            json!({ "max_value": max_value }),
            ValueType::Numeric,
        )
    }

    /// Sum over a set of source fields that may change between runs.
    pub fn dynamic_sum(name: &str) -> Self {
        Self::new(
            name,
            FieldKind::DynamicSum {
                sources: Vec::new(),
            },
            ValueType::Numeric,
        )
    }

    pub fn with_attribute(mut self, attribute: &str) -> Self {
        self.attribute = Some(attribute.to_string());
        self
    }

    /// Sets definition-time tags; they also become the defaults.
    pub fn with_tags(mut self, tags: TagMap) -> Self {
        tags::update_tags(&mut self.custom_tags, tags);
        self.default_tags = self.custom_tags.clone();
        self
    }

    pub fn with_downsamplers(mut self, downsamplers: Vec<Downsampler>) -> Self {
        self.downsamplers = downsamplers;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn downsamplers(&self) -> &[Downsampler] {
        &self.downsamplers
    }

    pub fn custom_tags(&self) -> &TagMap {
        &self.custom_tags
    }

    pub fn prepare_value(&self, value: &Value) -> Result<Value> {
        let invalid = |reason: &str| NodewatcherError::InvalidValue {
            field: self.name.clone(),
            reason: reason.to_string(),
        };

        match &self.kind {
            FieldKind::Integer | FieldKind::Counter | FieldKind::IntegerNominal => {
                to_integer(value).map(Value::from).ok_or_else(|| invalid("expected an integer"))
            }
            FieldKind::Float => to_float(value)
                .map(|f| json!(f))
                .ok_or_else(|| invalid("expected a number")),
            FieldKind::MultiPoint | FieldKind::Graph => match value {
                Value::Object(_) => Ok(value.clone()),
                _ => Err(invalid("expected an object")),
            },
            FieldKind::IntegerArrayNominal => match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| to_integer(item).map(Value::from))
                    .collect::<Option<Vec<_>>>()
                    .map(Value::Array)
                    .ok_or_else(|| invalid("expected an array of integers")),
                _ => Err(invalid("expected an array of integers")),
            },
            _ => Ok(value.clone()),
        }
    }

    pub fn prepare_tags(&self) -> TagMap {
        let mut combined = TagMap::new();
        combined.insert("name".to_string(), TagValue::from(self.name.as_str()));
        combined.extend(self.custom_tags.clone());

        let type_tag = match self.kind {
            FieldKind::Integer | FieldKind::Counter => Some("integer"),
            FieldKind::Float => Some("float"),
            FieldKind::MultiPoint => Some("multipoint"),
            _ => None,
        };
        if let Some(type_tag) = type_tag {
            combined.insert("type".to_string(), TagValue::from(type_tag));
        }
        combined
    }

    pub fn prepare_query_tags(&self) -> Map<String, Value> {
        let mut query = Map::new();
        query.insert("name".to_string(), Value::String(self.name.clone()));
        query
    }

    /// Returns `(query_tags, tags)` for the stream of this field on `descriptor`.
    pub fn process_tags(
        &self,
        descriptor: &StreamDescriptor,
    ) -> Result<(Map<String, Value>, Map<String, Value>)> {
        let mut query_tags = descriptor.query_tags().clone();
        query_tags.extend(self.prepare_query_tags());

        let mut combined = tags::tag_map(descriptor.tags().clone());
        tags::merge_dict(&mut combined, self.prepare_tags());
        let tags = tags::resolve_map(&combined, descriptor)?;

        Ok((query_tags, tags))
    }

    fn request(
        &self,
        descriptor: &StreamDescriptor,
        derive: Option<DeriveSpec>,
    ) -> Result<EnsureStream> {
        let (query_tags, tags) = self.process_tags(descriptor)?;
        Ok(EnsureStream {
            query_tags,
            tags,
            downsamplers: self.downsamplers.clone(),
            highest_granularity: descriptor.highest_granularity(),
            value_type: self.value_type,
            derive,
        })
    }

    /// Creates the stream (and the streams it is derived from) and returns
    /// its identifier. A dynamic sum without sources has no stream.
    pub fn ensure_stream(
        &self,
        descriptor: &StreamDescriptor,
        backend: &dyn StreamBackend,
    ) -> Result<Option<StreamId>> {
        match &self.kind {
            FieldKind::Derived {
                inputs,
                op,
                arguments,
            } => {
                let mut streams = Vec::with_capacity(inputs.len());
                for input in inputs {
                    let stream = ensure_input(descriptor, &input.field, backend)?;
                    streams.push(DeriveInput {
                        name: input.name.clone(),
                        stream,
                    });
                }

                let request = self.request(
                    descriptor,
                    Some(DeriveSpec {
                        inputs: streams,
                        op: *op,
                        arguments: arguments.clone(),
                        backprocess: true,
                    }),
                )?;
                backend.ensure_stream(request).map(Some)
            }
            FieldKind::DynamicSum { sources } => {
                let mut streams = Vec::with_capacity(sources.len());
                for (field_name, source) in sources {
                    let field = source.field(field_name).ok_or_else(|| missing_field(field_name))?;
                    let stream = field
                        .ensure_stream(source, backend)?
                        .ok_or_else(|| missing_field(field_name))?;
                    streams.push(DeriveInput { name: None, stream });
                }

                if streams.is_empty() {
                    return Ok(None);
                }

                let mut request = self.request(
                    descriptor,
                    Some(DeriveSpec {
                        inputs: streams,
                        op: DeriveOp::Sum,
                        arguments: json!({}),
                        backprocess: true,
                    }),
                )?;

                match backend.ensure_stream(request.clone()) {
                    Err(NodewatcherError::InconsistentStreamConfiguration { .. }) => {
                        // 來源改變時重建串流，不回溯處理舊資料以免拖慢監控
                        tracing::debug!(
                            "Source streams of '{}' changed, recreating stream",
                            self.name
                        );
                        // 只刪除本身的串流，查詢標籤較多的來源串流必須保留
                        let previous = backend
                            .find_streams(&request.query_tags)?
                            .into_iter()
                            .filter(|s| s.query_tags == request.query_tags);
                        for stream in previous {
                            backend.delete_stream(stream.id)?;
                        }
                        if let Some(derive) = request.derive.as_mut() {
                            derive.backprocess = false;
                        }
                        backend.ensure_stream(request).map(Some)
                    }
                    other => other.map(Some),
                }
            }
            _ => {
                let request = self.request(descriptor, None)?;
                backend.ensure_stream(request).map(Some)
            }
        }
    }

    /// Ensures the stream and appends the current attribute value. Returns
    /// the number of datapoints written.
    pub fn to_stream(
        &self,
        descriptor: &StreamDescriptor,
        backend: &dyn StreamBackend,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        if matches!(
            self.kind,
            FieldKind::Derived { .. } | FieldKind::DynamicSum { .. }
        ) {
            self.ensure_stream(descriptor, backend)?;
            return Ok(0);
        }

        let attribute = self.attribute.as_deref().unwrap_or(&self.name);
        let value = descriptor.attribute(attribute).cloned();

        let Some(stream) = self.ensure_stream(descriptor, backend)? else {
            return Ok(0);
        };

        match value {
            None | Some(Value::Null) => Ok(0),
            Some(value) => {
                let value = self.prepare_value(&value)?;
                backend.append(stream, value, timestamp)
            }
        }
    }

    /// Restores tags selected by `selection` to their definition-time values.
    ///
    /// `selection` is a nested map whose leaves are `true`, for example
    /// `{"visualization": {"initial_set": true}}`. A tag without a default
    /// is removed.
    pub fn reset_tags_to_default(&mut self, selection: &Value) -> Result<()> {
        match selection {
            Value::Object(selection) => tags::reset_tags(selection, &mut self.custom_tags, &self.default_tags),
            _ => Err(NodewatcherError::InvalidTag {
                message: "Reset specification must be a map".to_string(),
            }),
        }
    }

    pub fn set_tags(&mut self, tags: TagMap) {
        tags::update_tags(&mut self.custom_tags, tags);
    }

    pub fn add_source_field(&mut self, field: &str, descriptor: Arc<StreamDescriptor>) -> Result<()> {
        match &mut self.kind {
            FieldKind::DynamicSum { sources } => {
                sources.push((field.to_string(), descriptor));
                Ok(())
            }
            _ => Err(NodewatcherError::ImproperlyConfigured {
                message: format!("Field '{}' does not accept source fields", self.name),
            }),
        }
    }

    pub fn clear_source_fields(&mut self) {
        if let FieldKind::DynamicSum { sources } = &mut self.kind {
            sources.clear();
        }
    }
}

fn missing_field(reference: &str) -> NodewatcherError {
    NodewatcherError::ImproperlyConfigured {
        message: format!("Datastream field '{}' not found", reference),
    }
}

fn ensure_input(
    descriptor: &StreamDescriptor,
    reference: &str,
    backend: &dyn StreamBackend,
) -> Result<StreamId> {
    let (model_reference, field_name) = reference
        .split_once('#')
        .ok_or_else(|| missing_field(reference))?;

    let source = if model_reference.is_empty() {
        descriptor
    } else {
        descriptor
            .resolve_model_reference(model_reference)
            .map(|d| d.as_ref())
            .ok_or_else(|| missing_field(reference))?
    };

    let field = source.field(field_name).ok_or_else(|| missing_field(reference))?;
    field
        .ensure_stream(source, backend)?
        .ok_or_else(|| missing_field(reference))
}

fn to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastream::memory::MemoryStreamBackend;
    use crate::datastream::tags::TagReference;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn interface(counter: u64) -> StreamDescriptor {
        StreamDescriptor::new("interface", object(json!({"tx_bytes": counter, "mtu": null})))
            .with_tags(object(json!({"node": "n1", "interface": "wlan0"})))
            .with_query_tags(object(json!({"node": "n1", "interface": "wlan0"})))
            .with_field(Field::counter("tx_bytes"))
            .with_field(Field::reset("tx_reset", "#tx_bytes"))
            .with_field(Field::rate("tx_rate", "#tx_reset", "#tx_bytes", None))
            .with_field(Field::integer("mtu"))
    }

    #[test]
    fn test_default_downsamplers() {
        assert_eq!(Field::integer("a").downsamplers(), Downsampler::numeric().as_slice());
        assert_eq!(Field::graph("g").downsamplers(), &[Downsampler::Count]);
        assert_eq!(Field::nominal("n").downsamplers(), &[Downsampler::Count]);
        assert!(Field::counter("c").downsamplers().is_empty());
        assert_eq!(
            Field::counter("c")
                .with_downsamplers(vec![Downsampler::Max])
                .downsamplers(),
            &[Downsampler::Max]
        );
        assert_eq!(Field::reset("r", "#c").value_type(), ValueType::Nominal);
    }

    #[test]
    fn test_prepare_value() {
        assert_eq!(Field::integer("a").prepare_value(&json!("42")).unwrap(), json!(42));
        assert_eq!(Field::integer("a").prepare_value(&json!(3.9)).unwrap(), json!(3));
        assert!(Field::integer("a").prepare_value(&json!("x")).is_err());
        assert_eq!(Field::float("f").prepare_value(&json!(2)).unwrap(), json!(2.0));
        assert_eq!(
            Field::integer_array_nominal("l")
                .prepare_value(&json!([1, "2", 3.5]))
                .unwrap(),
            json!([1, 2, 3])
        );
        assert!(Field::graph("g").prepare_value(&json!([1])).is_err());
        assert_eq!(Field::nominal("n").prepare_value(&json!("up")).unwrap(), json!("up"));
    }

    #[test]
    fn test_process_tags_merges_and_resolves() {
        let descriptor = interface(0);
        let field = Field::float("signal").with_tags(tags::tag_map(object(json!({
            "title": "Signal",
            "visualization": {"type": "line"}
        }))));
        let field = {
            let mut field = field;
            let mut extra = TagMap::new();
            extra.insert(
                "label".to_string(),
                TagValue::from(TagReference::format(&["interface"], "Signal on {interface}")),
            );
            field.set_tags(extra);
            field
        };

        let (query, tags) = field.process_tags(&descriptor).unwrap();
        assert_eq!(
            Value::Object(query),
            json!({"node": "n1", "interface": "wlan0", "name": "signal"})
        );
        assert_eq!(tags["label"], json!("Signal on wlan0"));
        assert_eq!(tags["type"], json!("float"));
        assert_eq!(tags["node"], json!("n1"));
        assert_eq!(tags["visualization"], json!({"type": "line"}));
    }

    #[test]
    fn test_counter_tags_and_reset_to_default() {
        let mut field = Field::counter("rx_bytes");
        let mut visualization = TagMap::new();
        visualization.insert("initial_set".to_string(), TagValue::from(true));
        visualization.insert("hidden".to_string(), TagValue::from(true));
        let mut tags = TagMap::new();
        tags.insert("visualization".to_string(), TagValue::Map(visualization));
        field.set_tags(tags);

        field
            .reset_tags_to_default(&json!({"visualization": {"initial_set": true, "hidden": true}}))
            .unwrap();

        let descriptor = interface(0);
        let (_, tags) = field.process_tags(&descriptor).unwrap();
        assert_eq!(tags["visualization"], json!({"initial_set": false}));
        assert_eq!(tags["type"], json!("integer"));
        assert!(field.reset_tags_to_default(&json!(true)).is_err());
    }

    #[test]
    fn test_to_stream_skips_null_values() {
        let backend = MemoryStreamBackend::new();
        let descriptor = interface(0);
        let mtu = descriptor.field("mtu").unwrap();

        assert_eq!(mtu.to_stream(&descriptor, &backend, None).unwrap(), 0);
        // 即使沒有資料，串流仍然會被建立
        assert_eq!(
            backend
                .find_streams(&object(json!({"name": "mtu"})))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_derived_input_not_found() {
        let backend = MemoryStreamBackend::new();
        let descriptor = StreamDescriptor::new("interface", Map::new())
            .with_field(Field::reset("broken", "#missing"))
            .with_field(Field::reset("remote", "peer#tx_bytes"));

        let err = descriptor
            .field("broken")
            .unwrap()
            .ensure_stream(&descriptor, &backend)
            .unwrap_err();
        assert!(matches!(err, NodewatcherError::ImproperlyConfigured { .. }));

        let err = descriptor
            .field("remote")
            .unwrap()
            .ensure_stream(&descriptor, &backend)
            .unwrap_err();
        assert!(matches!(err, NodewatcherError::ImproperlyConfigured { .. }));
    }

    #[test]
    fn test_dynamic_sum_without_sources() {
        let backend = MemoryStreamBackend::new();
        let descriptor = StreamDescriptor::new("node", Map::new()).with_field(Field::dynamic_sum("clients"));
        let field = descriptor.field("clients").unwrap();
        assert_eq!(field.ensure_stream(&descriptor, &backend).unwrap(), None);
        assert!(Field::integer("x")
            .add_source_field("y", Arc::new(interface(0)))
            .is_err());
    }
}
