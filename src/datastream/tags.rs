//! Stream tags.
//!
//! Tags are nested maps of JSON values attached to every stream. Field tags
//! may contain [`TagReference`]s that are only resolved once the field is
//! bound to a concrete [`StreamDescriptor`].

use crate::datastream::descriptor::StreamDescriptor;
use crate::utils::error::{NodewatcherError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type TagMap = BTreeMap<String, TagValue>;

type ComputeFn = dyn Fn(&Map<String, Value>, &BTreeMap<String, Value>) -> Value + Send + Sync;

#[derive(Clone)]
pub enum TagTransform {
    None,
    /// Template where `{path}` is replaced with the referenced tag value.
    Format(String),
    /// Receives the descriptor's model attributes and the referenced values.
    Computed(Arc<ComputeFn>),
}

impl fmt::Debug for TagTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagTransform::None => write!(f, "None"),
            TagTransform::Format(template) => f.debug_tuple("Format").field(template).finish(),
            TagTransform::Computed(_) => write!(f, "Computed(..)"),
        }
    }
}

/// A reference to tags of the descriptor a field is bound to.
#[derive(Debug, Clone)]
pub struct TagReference {
    pub tags: Vec<String>,
    pub transform: TagTransform,
}

impl TagReference {
    pub fn new(tag: &str) -> Self {
        Self {
            tags: vec![tag.to_string()],
            transform: TagTransform::None,
        }
    }

    pub fn format(tags: &[&str], template: &str) -> Self {
        Self {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            transform: TagTransform::Format(template.to_string()),
        }
    }

    pub fn computed<F>(tags: &[&str], transform: F) -> Self
    where
        F: Fn(&Map<String, Value>, &BTreeMap<String, Value>) -> Value + Send + Sync + 'static,
    {
        Self {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            transform: TagTransform::Computed(Arc::new(transform)),
        }
    }

    pub fn resolve(&self, descriptor: &StreamDescriptor) -> Result<Value> {
        let mut values = BTreeMap::new();
        for path in &self.tags {
            let value = lookup(descriptor.tags(), path).ok_or_else(|| {
                NodewatcherError::InvalidTag {
                    message: format!(
                        "Referenced tag '{}' not found on '{}'",
                        path,
                        descriptor.model_name()
                    ),
                }
            })?;
            values.insert(path.clone(), value.clone());
        }

        match &self.transform {
            TagTransform::Computed(transform) => Ok(transform(descriptor.attributes(), &values)),
            TagTransform::Format(template) => {
                let mut output = template.clone();
                for (path, value) in &values {
                    let text = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    output = output.replace(&format!("{{{}}}", path), &text);
                }
                Ok(Value::String(output))
            }
            TagTransform::None if values.len() == 1 => {
                Ok(values.into_values().next().unwrap_or(Value::Null))
            }
            TagTransform::None => Err(NodewatcherError::InvalidTag {
                message: "Multiple tags specified without transform".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TagValue {
    Value(Value),
    Map(TagMap),
    List(Vec<TagValue>),
    Reference(TagReference),
}

impl From<Value> for TagValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => TagValue::Map(tag_map(map)),
            Value::Array(items) => TagValue::List(items.into_iter().map(TagValue::from).collect()),
            other => TagValue::Value(other),
        }
    }
}

impl From<TagReference> for TagValue {
    fn from(reference: TagReference) -> Self {
        TagValue::Reference(reference)
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Value(Value::String(value.to_string()))
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Value(Value::Bool(value))
    }
}

impl From<TagMap> for TagValue {
    fn from(map: TagMap) -> Self {
        TagValue::Map(map)
    }
}

pub fn tag_map(map: Map<String, Value>) -> TagMap {
    map.into_iter().map(|(k, v)| (k, TagValue::from(v))).collect()
}

/// Follows a dotted path through objects and arrays.
pub fn lookup<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = root.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Recursively updates `target` with `source`; nested maps are merged.
pub fn merge_dict(target: &mut TagMap, source: TagMap) {
    for (key, value) in source {
        if let TagValue::Map(incoming) = value {
            if let Some(TagValue::Map(existing)) = target.get_mut(&key) {
                merge_dict(existing, incoming);
                continue;
            }
            target.insert(key, TagValue::Map(incoming));
        } else {
            target.insert(key, value);
        }
    }
}

/// Replaces every reference with its resolved value.
pub fn resolve(value: &TagValue, descriptor: &StreamDescriptor) -> Result<Value> {
    match value {
        TagValue::Value(v) => Ok(v.clone()),
        TagValue::Map(map) => Ok(Value::Object(resolve_map(map, descriptor)?)),
        TagValue::List(items) => items
            .iter()
            .map(|item| resolve(item, descriptor))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        TagValue::Reference(reference) => reference.resolve(descriptor),
    }
}

pub fn resolve_map(map: &TagMap, descriptor: &StreamDescriptor) -> Result<Map<String, Value>> {
    map.iter()
        .map(|(k, v)| Ok((k.clone(), resolve(v, descriptor)?)))
        .collect()
}

/// Deep update used by `Field::set_tags`.
pub fn update_tags(target: &mut TagMap, tags: TagMap) {
    for (key, value) in tags {
        match value {
            TagValue::Map(incoming) => {
                let mut nested = match target.remove(&key) {
                    Some(TagValue::Map(existing)) => existing,
                    _ => TagMap::new(),
                };
                update_tags(&mut nested, incoming);
                target.insert(key, TagValue::Map(nested));
            }
            other => {
                target.insert(key, other);
            }
        }
    }
}

/// Restores tags selected by `selection` from `defaults`, see `Field::reset_tags_to_default`.
pub fn reset_tags(
    selection: &Map<String, Value>,
    current: &mut TagMap,
    defaults: &TagMap,
) -> Result<()> {
    for (tag, value) in selection {
        match value {
            Value::Object(nested) => {
                let default_value = match defaults.get(tag) {
                    Some(TagValue::Map(map)) => map.clone(),
                    Some(_) => continue,
                    None => TagMap::new(),
                };

                let entry = current
                    .entry(tag.clone())
                    .or_insert_with(|| TagValue::Map(TagMap::new()));
                if !matches!(entry, TagValue::Map(_)) {
                    *entry = TagValue::Map(TagMap::new());
                }

                let now_empty = match entry {
                    TagValue::Map(current_value) => {
                        reset_tags(nested, current_value, &default_value)?;
                        current_value.is_empty()
                    }
                    _ => false,
                };
                if now_empty {
                    current.remove(tag);
                }
            }
            Value::Bool(true) => match defaults.get(tag) {
                Some(default) => {
                    current.insert(tag.clone(), default.clone());
                }
                None => {
                    current.remove(tag);
                }
            },
            _ => {
                return Err(NodewatcherError::InvalidTag {
                    message: "Reset tag value should be either a map or true".to_string(),
                })
            }
        }
    }
    Ok(())
}
