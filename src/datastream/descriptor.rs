use crate::datastream::fields::Field;
use crate::datastream::tags::lookup;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl Granularity {
    pub fn seconds(&self) -> i64 {
        match self {
            Granularity::Seconds => 1,
            Granularity::Minutes => 60,
            Granularity::Hours => 3_600,
            Granularity::Days => 86_400,
        }
    }

    /// Start of the bucket containing `timestamp`.
    pub fn bucket_start(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let secs = timestamp.timestamp();
        DateTime::from_timestamp(secs - secs.rem_euclid(self.seconds()), 0).unwrap_or(timestamp)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Granularity::Seconds => "seconds",
            Granularity::Minutes => "minutes",
            Granularity::Hours => "hours",
            Granularity::Days => "days",
        };
        write!(f, "{}", name)
    }
}

/// Binds datastream fields to one monitored object.
///
/// `attributes` holds the current values of the object, `tags` and
/// `query_tags` are shared by every stream created from its fields, and
/// `references` lets derived fields reach fields of related descriptors via
/// `"reference#field"`.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    model_name: String,
    attributes: Map<String, Value>,
    tags: Map<String, Value>,
    query_tags: Map<String, Value>,
    highest_granularity: Granularity,
    fields: Vec<Field>,
    references: BTreeMap<String, Arc<StreamDescriptor>>,
}

impl StreamDescriptor {
    pub fn new(model_name: &str, attributes: Map<String, Value>) -> Self {
        Self {
            model_name: model_name.to_string(),
            attributes,
            tags: Map::new(),
            query_tags: Map::new(),
            highest_granularity: Granularity::Minutes,
            fields: Vec::new(),
            references: BTreeMap::new(),
        }
    }

    pub fn with_tags(mut self, tags: Map<String, Value>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_query_tags(mut self, query_tags: Map<String, Value>) -> Self {
        self.query_tags = query_tags;
        self
    }

    pub fn with_highest_granularity(mut self, granularity: Granularity) -> Self {
        self.highest_granularity = granularity;
        self
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_reference(mut self, name: &str, descriptor: Arc<StreamDescriptor>) -> Self {
        self.references.insert(name.to_string(), descriptor);
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, path: &str) -> Option<&Value> {
        lookup(&self.attributes, path)
    }

    pub fn tags(&self) -> &Map<String, Value> {
        &self.tags
    }

    pub fn query_tags(&self) -> &Map<String, Value> {
        &self.query_tags
    }

    pub fn highest_granularity(&self) -> Granularity {
        self.highest_granularity
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name() == name)
    }

    pub fn resolve_model_reference(&self, reference: &str) -> Option<&Arc<StreamDescriptor>> {
        self.references.get(reference)
    }
}
