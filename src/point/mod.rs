//! Point abstraction
//!
//! A [`Point`] is the mutable carrier of one telemetry record: a name, string
//! tags, typed fields, a timestamp and a category. Scripts read and write
//! points through key-based accessors that keep the tag and field buckets
//! disjoint.
//!
//! # Bucket rules
//!
//! - `get` looks at tags first, then fields
//! - `set` writes into the bucket the key already lives in, fields otherwise
//! - `set_tag` always wins the slot, removing the key from fields
//! - tag values are never composite and never contain NUL bytes

pub mod value;

pub use value::{DType, Value};

use crate::types::Category;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised by point accessors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PointError {
    #[error("key `{0}` not found")]
    KeyNotFound(String),
}

/// Field name promoted into the point timestamp after a script run
pub const KEY_TIME: &str = "time";

/// One telemetry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    name: String,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
    #[serde(default = "chrono::Utc::now", with = "chrono::serde::ts_nanoseconds")]
    time: DateTime<Utc>,
    #[serde(default)]
    category: Category,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    dropped: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sub_points: Vec<Point>,
    #[serde(skip)]
    composite_fields: bool,
}

impl Point {
    /// Create an empty point stamped with the current time
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            time: Utc::now(),
            category,
            dropped: false,
            sub_points: Vec::new(),
            composite_fields: false,
        }
    }

    /// Builder-style tag insertion
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.fields.remove(&key);
        self.tags.insert(key, strip_nul(value.into()));
        self
    }

    /// Builder-style field insertion
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        self.tags.remove(&key);
        self.fields.insert(key, value.into());
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    /// Allow List/Map values to be stored in fields without JSON lowering
    pub fn with_composite_fields(mut self, enabled: bool) -> Self {
        self.composite_fields = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn set_time(&mut self, time: DateTime<Utc>) {
        self.time = time;
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn set_category(&mut self, category: Category) {
        self.category = category;
    }

    pub fn composite_fields(&self) -> bool {
        self.composite_fields
    }

    pub fn dropped(&self) -> bool {
        self.dropped
    }

    pub fn mark_drop(&mut self, drop: bool) {
        self.dropped = drop;
    }

    pub fn sub_points(&self) -> &[Point] {
        &self.sub_points
    }

    pub fn sub_points_mut(&mut self) -> &mut [Point] {
        &mut self.sub_points
    }

    pub fn append_sub_point(&mut self, point: Point) {
        self.sub_points.push(point);
    }

    pub fn take_sub_points(&mut self) -> Vec<Point> {
        std::mem::take(&mut self.sub_points)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tags.contains_key(key) || self.fields.contains_key(key)
    }

    pub fn is_tag(&self, key: &str) -> bool {
        self.tags.contains_key(key)
    }

    /// Look up a key, tags first.
    pub fn get(&self, key: &str) -> Result<(Value, DType), PointError> {
        if let Some(v) = self.tags.get(key) {
            return Ok((Value::String(v.clone()), DType::String));
        }
        match self.fields.get(key) {
            Some(v) => Ok((v.clone(), v.dtype())),
            None => Err(PointError::KeyNotFound(key.to_string())),
        }
    }

    /// Write a key into the bucket it already occupies, fields otherwise.
    ///
    /// Returns false when the value could not be converted for a tag; the tag
    /// is still written with an empty string in that case.
    pub fn set(&mut self, key: &str, value: Value, dtype: DType) -> bool {
        if let Some(slot) = self.tags.get_mut(key) {
            let (s, ok) = tag_value(value, dtype);
            *slot = s;
            return ok;
        }

        let stored = match dtype {
            DType::Invalid | DType::Void | DType::Nil => Value::Nil,
            DType::List | DType::Map if !self.composite_fields => {
                Value::String(value.to_json_string())
            }
            _ => value,
        };
        self.fields.insert(key.to_string(), stored);
        true
    }

    /// Force a key into the tag bucket
    pub fn set_tag(&mut self, key: &str, value: Value, dtype: DType) -> bool {
        self.fields.remove(key);
        let (s, ok) = tag_value(value, dtype);
        self.tags.insert(key.to_string(), s);
        ok
    }

    /// Remove a key from whichever bucket holds it
    pub fn delete(&mut self, key: &str) {
        if self.tags.remove(key).is_none() {
            self.fields.remove(key);
        }
    }

    /// Move `from` to `to`, keeping the bucket `from` lived in.
    ///
    /// Any existing `to` is overwritten, in either bucket.
    pub fn rename_key(&mut self, from: &str, to: &str) -> Result<(), PointError> {
        if from == to {
            return if self.contains_key(from) {
                Ok(())
            } else {
                Err(PointError::KeyNotFound(from.to_string()))
            };
        }

        if let Some(v) = self.tags.remove(from) {
            self.fields.remove(to);
            self.tags.insert(to.to_string(), v);
            Ok(())
        } else if let Some(v) = self.fields.remove(from) {
            self.tags.remove(to);
            self.fields.insert(to.to_string(), v);
            Ok(())
        } else {
            Err(PointError::KeyNotFound(from.to_string()))
        }
    }

    /// Promote an integer `time` field (unix nanoseconds) into the timestamp.
    ///
    /// The field is removed whenever present.
    pub fn key_time_to_time(&mut self) {
        if let Some(Value::Int(ns)) = self.fields.remove(KEY_TIME) {
            self.time = DateTime::from_timestamp_nanos(ns);
        }
    }

    /// Key/value view used to render a point as a map in scripts and tests
    pub fn to_value_map(&self) -> BTreeMap<String, Value> {
        let mut out: BTreeMap<String, Value> = self
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        out.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }
}

fn tag_value(value: Value, dtype: DType) -> (String, bool) {
    match dtype {
        DType::Invalid | DType::Void => (String::new(), false),
        DType::Nil => (String::new(), true),
        _ => (strip_nul(value.to_tag_string()), true),
    }
}

fn strip_nul(s: String) -> String {
    if s.contains('\0') {
        s.replace('\0', "")
    } else {
        s
    }
}
