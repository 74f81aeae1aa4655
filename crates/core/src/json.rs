//! Reference fields inside JSON documents
//!
//! Records are JSON objects. A sub-object carrying the marker field `_ref` is a
//! reference to another record:
//!
//! - `{"_ref": "site/components/a"}` is a pure pointer
//! - `{"_ref": "site/components/a", "text": "hi"}` is *referenced-and-real*:
//!   inline data that belongs to the referenced record
//!
//! Walkers here report sub-objects by JSON pointer (RFC 6901) so callers can
//! come back and mutate them with [`Value::pointer_mut`] after doing async work.
//!
//! # Limits
//!
//! | Limit | Value | Constant |
//! |-------|-------|----------|
//! | Max nesting depth | 100 levels | [`MAX_NESTING_DEPTH`] |

use serde_json::{Map, Value};

use crate::address::is_instance;
use crate::error::{Error, Result};

/// The reference marker field
pub const REF_FIELD: &str = "_ref";

/// Maximum nesting depth of a document (100 levels)
///
/// Every walker here is recursive; deeper documents are rejected on write.
pub const MAX_NESTING_DEPTH: usize = 100;

/// Predicate selecting reference objects
pub type RefFilter = fn(&Map<String, Value>) -> bool;

/// The address a reference object points at
pub fn ref_address(node: &Map<String, Value>) -> Option<&str> {
    node.get(REF_FIELD).and_then(Value::as_str)
}

/// Any object carrying a string `_ref`
pub fn has_ref(node: &Map<String, Value>) -> bool {
    ref_address(node).is_some()
}

/// A reference carrying inline data besides the marker
pub fn is_referenced_and_real(node: &Map<String, Value>) -> bool {
    has_ref(node) && node.len() > 1
}

/// A reference to a component/layout instance
pub fn is_instance_ref(node: &Map<String, Value>) -> bool {
    ref_address(node).map_or(false, is_instance)
}

fn push_pointer(base: &str, key: &str) -> String {
    format!("{}/{}", base, key.replace('~', "~0").replace('/', "~1"))
}

/// Pointers to every object matching `filter`, without descending into matches
///
/// Matches are disjoint, so they can be rewritten in any order.
pub fn find_refs(document: &Value, filter: RefFilter) -> Vec<String> {
    let mut found = Vec::new();
    walk(document, String::new(), &mut |path, node| {
        if filter(node) {
            found.push(path.to_string());
            false
        } else {
            true
        }
    });
    found
}

/// Pointers to every object matching `filter`, in pre-order
///
/// Descends into matches, so a nested match always appears after its
/// enclosing match.
pub fn find_all(document: &Value, filter: RefFilter) -> Vec<String> {
    let mut found = Vec::new();
    walk(document, String::new(), &mut |path, node| {
        if filter(node) {
            found.push(path.to_string());
        }
        true
    });
    found
}

// The visitor returns whether to descend into the object it was handed.
fn walk(value: &Value, path: String, visit: &mut dyn FnMut(&str, &Map<String, Value>) -> bool) {
    match value {
        Value::Object(map) => {
            if !path.is_empty() && !visit(&path, map) {
                return;
            }
            for (key, child) in map {
                walk(child, push_pointer(&path, key), visit);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                walk(child, format!("{}/{}", path, index), visit);
            }
        }
        _ => {}
    }
}

/// Call `f` on every reference object reachable from `document`
///
/// The root object is never treated as a reference, only its descendants.
pub fn for_each_ref_mut(document: &mut Value, f: &mut dyn FnMut(&mut Map<String, Value>)) {
    fn descend(value: &mut Value, f: &mut dyn FnMut(&mut Map<String, Value>)) {
        match value {
            Value::Object(map) => {
                if has_ref(map) {
                    f(map);
                }
                for child in map.values_mut() {
                    descend(child, f);
                }
            }
            Value::Array(items) => {
                for child in items {
                    descend(child, f);
                }
            }
            _ => {}
        }
    }

    match document {
        Value::Object(map) => {
            for child in map.values_mut() {
                descend(child, f);
            }
        }
        other => descend(other, f),
    }
}

/// Every reference address reachable from `document`, in pre-order
pub fn ref_addresses(document: &Value) -> Vec<String> {
    find_all(document, has_ref)
        .iter()
        .filter_map(|path| document.pointer(path))
        .filter_map(Value::as_object)
        .filter_map(ref_address)
        .map(str::to_string)
        .collect()
}

/// Nesting depth of `value`; scalars have depth 0
pub fn depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(depth).max().unwrap_or(0),
        Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Reject documents nested deeper than [`MAX_NESTING_DEPTH`]
pub fn check_depth(value: &Value) -> Result<()> {
    let actual = depth(value);
    if actual > MAX_NESTING_DEPTH {
        return Err(Error::client(format!(
            "document nesting depth {} exceeds maximum of {}",
            actual, MAX_NESTING_DEPTH
        )));
    }
    Ok(())
}

/// True for `null` and for objects with no fields
pub fn is_empty_document(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Pointer to the first empty field: an empty string, `null` or `false`
pub fn find_empty_field(value: &Value) -> Option<String> {
    fn search(value: &Value, path: String) -> Option<String> {
        match value {
            Value::Null | Value::Bool(false) => Some(path),
            Value::String(s) if s.is_empty() => Some(path),
            Value::Object(map) => map
                .iter()
                .find_map(|(key, child)| search(child, push_pointer(&path, key))),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .find_map(|(index, child)| search(child, format!("{}/{}", path, index))),
            _ => None,
        }
    }

    match value {
        Value::Object(map) => map
            .iter()
            .find_map(|(key, child)| search(child, push_pointer("", key))),
        other => search(other, String::new()),
    }
}

/// Borrow `value` as an object, or fail with a client error naming `what`
pub fn as_document<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| Error::client(format!("{} must be an object", what)))
}
