//! Core types and traits for Trellis
//!
//! This crate defines the foundational types used throughout the system:
//! - Address: record addresses and version-suffix functions
//! - JSON reference walking: `_ref` markers, filters, pointers
//! - BatchOp / ListOptions: storage mutation and listing types
//! - Storage: the async key-value contract every engine implements
//! - Error: error taxonomy (NotFound, Client, Timeout, Defect)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod error;
pub mod json;
pub mod traits;
pub mod types;

pub use address::{
    component_name, is_composable, is_instance, is_propagating, is_published, is_url, kind_of,
    propagate_version, strip_version, uri_to_url, url_to_uri, version_of, with_version, Address,
    RecordKind, PUBLISHED, SCHEDULED,
};
pub use error::{Error, ErrorKind, Result};
pub use json::{
    has_ref, is_instance_ref, is_referenced_and_real, ref_address, RefFilter, MAX_NESTING_DEPTH,
    REF_FIELD,
};
pub use traits::{Storage, StorageExt};
pub use types::{render_entries, BatchOp, ListEntry, ListOptions};
