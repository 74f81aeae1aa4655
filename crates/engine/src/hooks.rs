//! Per-type record hooks
//!
//! Each component or layout name may register a [`RecordHooks`] object with
//! any of three capabilities: `save`, `render`, `del`. Unimplemented methods
//! fall back to the default behavior, so registering nothing is equivalent to
//! registering a hooks object that overrides nothing.
//!
//! Format hooks are keyed by request extension and run after `render`.
//!
//! The registry is built once at startup and never mutated afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use trellis_core::{Address, BatchOp, RecordKind, Result};

use crate::context::RequestContext;

/// What a save hook wants written
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Write this document with default version routing
    Document(Value),
    /// Write exactly these operations
    Operations(Vec<BatchOp>),
}

/// Capabilities a component or layout type can provide
#[async_trait]
pub trait RecordHooks: Send + Sync {
    /// Transform data before it is written
    async fn save(
        &self,
        _address: &str,
        data: Value,
        _ctx: &RequestContext,
    ) -> Result<SaveOutcome> {
        Ok(SaveOutcome::Document(data))
    }

    /// Transform data after it is read; must return an object
    async fn render(&self, _address: &str, data: Value, _ctx: &RequestContext) -> Result<Value> {
        Ok(data)
    }

    /// Operations that delete the record at `address`, whose data was `prior`
    async fn del(
        &self,
        address: &str,
        _prior: &Value,
        _ctx: &RequestContext,
    ) -> Result<Vec<BatchOp>> {
        Ok(vec![BatchOp::del(address)])
    }
}

/// Output transform selected by the request's format extension
#[async_trait]
pub trait FormatHook: Send + Sync {
    /// Transform rendered data for this format; must return an object
    async fn format(&self, address: &str, data: Value, ctx: &RequestContext) -> Result<Value>;
}

/// Typed registry from record type name to hooks
#[derive(Default, Clone)]
pub struct HookRegistry {
    records: HashMap<(RecordKind, String), Arc<dyn RecordHooks>>,
    formats: HashMap<String, Arc<dyn FormatHook>>,
}

impl HookRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register hooks for records of `kind` named `name`
    pub fn register(&mut self, kind: RecordKind, name: impl Into<String>, hooks: Arc<dyn RecordHooks>) {
        self.records.insert((kind, name.into()), hooks);
    }

    /// Register a format hook for `extension`
    pub fn register_format(&mut self, extension: impl Into<String>, hook: Arc<dyn FormatHook>) {
        self.formats.insert(extension.into(), hook);
    }

    /// Hooks owning `address`, if its type registered any
    pub fn for_address(&self, address: &str) -> Option<&Arc<dyn RecordHooks>> {
        let parsed = Address::parse(address).ok()?;
        self.records.get(&(parsed.kind, parsed.name))
    }

    /// Format hook for `extension`
    pub fn format(&self, extension: &str) -> Option<&Arc<dyn FormatHook>> {
        self.formats.get(extension)
    }

    /// Number of registered record hooks
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no record hooks are registered
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut records: Vec<String> = self
            .records
            .keys()
            .map(|(kind, name)| format!("{}/{}", kind, name))
            .collect();
        records.sort();
        let mut formats: Vec<&String> = self.formats.keys().collect();
        formats.sort();
        f.debug_struct("HookRegistry")
            .field("records", &records)
            .field("formats", &formats)
            .finish()
    }
}
