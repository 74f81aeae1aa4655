//! Core types for storage mutation and listing
//!
//! This module defines the foundational types:
//! - BatchOp: one put or delete inside an atomic batch
//! - ListOptions: projection and pagination for prefix listing
//! - ListEntry: one item of a listing stream

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// One mutation inside an atomic batch
///
/// Ordering inside a batch matters only for readers of the operation list:
/// children are always emitted before the parents that point at them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BatchOp {
    /// Write `value` at `key`
    Put {
        /// Storage key (an address)
        key: String,
        /// Encoded record
        value: String,
    },
    /// Remove `key`
    Del {
        /// Storage key (an address)
        key: String,
    },
}

impl BatchOp {
    /// A put of raw text
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        BatchOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// A put of a JSON document, encoded as text
    pub fn put_json(key: impl Into<String>, value: &Value) -> Result<Self> {
        Ok(BatchOp::Put {
            key: key.into(),
            value: serde_json::to_string(value)?,
        })
    }

    /// A delete
    pub fn del(key: impl Into<String>) -> Self {
        BatchOp::Del { key: key.into() }
    }

    /// The key this operation touches
    pub fn key(&self) -> &str {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Del { key } => key,
        }
    }

    /// The encoded value of a put
    pub fn value(&self) -> Option<&str> {
        match self {
            BatchOp::Put { value, .. } => Some(value),
            BatchOp::Del { .. } => None,
        }
    }

    /// Decode the value of a put as JSON
    pub fn json(&self) -> Result<Option<Value>> {
        self.value()
            .map(|value| serde_json::from_str(value).map_err(Into::into))
            .transpose()
    }

    /// True for puts
    pub fn is_put(&self) -> bool {
        matches!(self, BatchOp::Put { .. })
    }
}

/// Options for prefix listing
///
/// Listings are always sorted lexicographically by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Only keys starting with this prefix
    #[serde(default)]
    pub prefix: String,
    /// Include keys in entries
    #[serde(default = "default_true")]
    pub keys: bool,
    /// Include values in entries
    #[serde(default = "default_true")]
    pub values: bool,
    /// Render collected listings as an array rather than an object
    #[serde(default, rename = "isArray")]
    pub is_array: bool,
    /// Number of matching entries to skip
    #[serde(default)]
    pub skip: usize,
    /// Maximum number of entries to return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

fn default_true() -> bool {
    true
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            keys: true,
            values: true,
            is_array: false,
            skip: 0,
            limit: None,
        }
    }
}

impl ListOptions {
    /// List everything under `prefix`
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Keys only
    pub fn keys_only(mut self) -> Self {
        self.keys = true;
        self.values = false;
        self
    }

    /// Values only
    pub fn values_only(mut self) -> Self {
        self.keys = false;
        self.values = true;
        self
    }

    /// Collect as an array
    pub fn as_array(mut self) -> Self {
        self.is_array = true;
        self
    }

    /// Skip the first `skip` matches
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Return at most `limit` matches
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Project a stored pair according to `keys`/`values`
    ///
    /// With both projections disabled the key is returned.
    pub fn project(&self, key: &str, value: &str) -> ListEntry {
        match (self.keys, self.values) {
            (true, true) => ListEntry::Pair {
                key: key.to_string(),
                value: value.to_string(),
            },
            (false, true) => ListEntry::Value(value.to_string()),
            _ => ListEntry::Key(key.to_string()),
        }
    }
}

/// One entry of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ListEntry {
    /// Key and value
    Pair {
        /// Storage key
        key: String,
        /// Encoded value
        value: String,
    },
    /// Key only
    Key(String),
    /// Value only
    Value(String),
}

impl ListEntry {
    /// The key, when projected
    pub fn key(&self) -> Option<&str> {
        match self {
            ListEntry::Pair { key, .. } | ListEntry::Key(key) => Some(key),
            ListEntry::Value(_) => None,
        }
    }

    /// The encoded value, when projected
    pub fn value(&self) -> Option<&str> {
        match self {
            ListEntry::Pair { value, .. } | ListEntry::Value(value) => Some(value),
            ListEntry::Key(_) => None,
        }
    }
}

/// Render collected entries the way `options` asks for
///
/// - `is_array`: a JSON array of keys, values, or `{key, value}` objects
/// - otherwise: a JSON object mapping key to value (`null` when values are
///   not projected); value-only entries are skipped since they have no key
pub fn render_entries(entries: Vec<ListEntry>, options: &ListOptions) -> Value {
    if options.is_array {
        return Value::Array(
            entries
                .into_iter()
                .map(|entry| match entry {
                    ListEntry::Pair { key, value } => {
                        let mut pair = Map::new();
                        pair.insert("key".to_string(), Value::String(key));
                        pair.insert("value".to_string(), Value::String(value));
                        Value::Object(pair)
                    }
                    ListEntry::Key(text) | ListEntry::Value(text) => Value::String(text),
                })
                .collect(),
        );
    }

    let mut object = Map::new();
    for entry in entries {
        match entry {
            ListEntry::Pair { key, value } => {
                object.insert(key, Value::String(value));
            }
            ListEntry::Key(key) => {
                object.insert(key, Value::Null);
            }
            ListEntry::Value(_) => {}
        }
    }
    Value::Object(object)
}
