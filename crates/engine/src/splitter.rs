//! Cascading persistence splitter
//!
//! Decomposes one nested document into flat, independently addressable
//! writes. Referenced-and-real nodes (a `_ref` plus inline data) become their
//! own writes, and the parent keeps only the pointer.
//!
//! The split is pure and synchronous. It takes the document by value: the
//! caller hands over ownership for the duration of the call and gets the
//! pointer-only root back as the last write. Callers that still need the
//! original must clone it first.

use serde_json::{Map, Value};
use trellis_core::json::{check_depth, find_all, is_referenced_and_real, REF_FIELD};
use trellis_core::{is_propagating, propagate_version, version_of, Error, Result};

/// One record to be written, before its owning type routes it
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    /// Address the record belongs at
    pub address: String,
    /// Record data, pointer-only at every nested reference
    pub value: Value,
}

impl PendingWrite {
    fn new(address: impl Into<String>, value: Value) -> Self {
        Self {
            address: address.into(),
            value,
        }
    }
}

/// Split `document` into writes for `root` and every inline child
///
/// Children come first, deepest before shallowest, and the root write is
/// always last. Under a propagating version every reference is first
/// rewritten to that version.
///
/// # Errors
///
/// Returns a client error if the document nests deeper than the limit.
pub fn split(root: &str, mut document: Value) -> Result<Vec<PendingWrite>> {
    check_depth(&document)?;

    if is_propagating(root) {
        propagate_version(version_of(root), &mut document);
    }

    let paths = find_all(&document, is_referenced_and_real);
    let mut writes = Vec::with_capacity(paths.len() + 1);

    // Reverse pre-order: a nested node is split out before its enclosing
    // node, so the enclosing node's data already holds a pure pointer.
    for path in paths.iter().rev() {
        let node = document
            .pointer_mut(path)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| Error::defect(format!("split lost the node at {}", path)))?;
        let (address, data) = take_inline_data(node)?;
        writes.push(PendingWrite::new(address, Value::Object(data)));
    }

    writes.push(PendingWrite::new(root, document));
    Ok(writes)
}

/// Strip `node` down to its marker, returning the address and the data
fn take_inline_data(node: &mut Map<String, Value>) -> Result<(String, Map<String, Value>)> {
    let marker = node
        .remove(REF_FIELD)
        .ok_or_else(|| Error::defect("referenced node lost its marker"))?;
    let address = marker
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::defect("reference marker is not a string"))?;
    let data = std::mem::take(node);
    node.insert(REF_FIELD.to_string(), marker);
    Ok((address, data))
}
