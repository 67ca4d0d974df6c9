use crate::datastream::descriptor::Granularity;
use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Numeric,
    Graph,
    Nominal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Downsampler {
    Mean,
    Sum,
    Min,
    Max,
    StdDev,
    Count,
}

impl Downsampler {
    pub fn numeric() -> Vec<Downsampler> {
        vec![
            Downsampler::Mean,
            Downsampler::Sum,
            Downsampler::Min,
            Downsampler::Max,
            Downsampler::StdDev,
            Downsampler::Count,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeriveOp {
    CounterReset,
    CounterDerivative,
    Sum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeriveInput {
    pub name: Option<String>,
    pub stream: StreamId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeriveSpec {
    pub inputs: Vec<DeriveInput>,
    pub op: DeriveOp,
    pub arguments: Value,
    /// Compute the derived stream from datapoints already stored in the inputs.
    pub backprocess: bool,
}

impl DeriveSpec {
    /// Equality ignoring `backprocess`, which only affects creation.
    pub fn same_derivation(&self, other: &DeriveSpec) -> bool {
        self.op == other.op && self.inputs == other.inputs && self.arguments == other.arguments
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnsureStream {
    pub query_tags: Map<String, Value>,
    pub tags: Map<String, Value>,
    pub downsamplers: Vec<Downsampler>,
    pub highest_granularity: Granularity,
    pub value_type: ValueType,
    pub derive: Option<DeriveSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamInfo {
    pub id: StreamId,
    pub query_tags: Map<String, Value>,
    pub tags: Map<String, Value>,
    pub value_type: ValueType,
    pub downsamplers: Vec<Downsampler>,
    pub highest_granularity: Granularity,
    pub derived: Option<DeriveOp>,
    pub datapoints: usize,
}

/// Time-series storage the datastream fields write into.
pub trait StreamBackend: Send + Sync {
    /// Returns the stream identified by `query_tags`, creating it if needed.
    fn ensure_stream(&self, request: EnsureStream) -> Result<StreamId>;

    /// Appends a datapoint and returns how many datapoints were written,
    /// including those of derived streams.
    fn append(&self, stream: StreamId, value: Value, timestamp: Option<DateTime<Utc>>)
        -> Result<usize>;

    /// Deletes every stream whose query tags include `query_tags`.
    fn delete_streams(&self, query_tags: &Map<String, Value>) -> Result<usize>;

    /// Deletes a single stream together with its datapoints.
    fn delete_stream(&self, stream: StreamId) -> Result<()>;

    fn find_streams(&self, query_tags: &Map<String, Value>) -> Result<Vec<StreamInfo>>;

    fn datapoints(&self, stream: StreamId) -> Result<Vec<Datapoint>>;
}

/// True when every entry of `query` is present in `tags`.
pub fn tags_match(tags: &Map<String, Value>, query: &Map<String, Value>) -> bool {
    query.iter().all(|(k, v)| tags.get(k) == Some(v))
}
