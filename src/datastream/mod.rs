//! Time-series streams built from monitored objects.

pub mod backend;
pub mod descriptor;
pub mod fields;
pub mod memory;
pub mod tags;

pub use backend::{
    Datapoint, DeriveOp, Downsampler, StreamBackend, StreamId, StreamInfo, ValueType,
};
pub use descriptor::{Granularity, StreamDescriptor};
pub use fields::{DerivedInput, Field, FieldKind};
pub use memory::{Bucket, MemoryStreamBackend};
pub use tags::{TagMap, TagReference, TagValue};
