//! Engine facade and builder
//!
//! Every collaborator (storage, hooks, URL rules, event hooks) is handed to
//! [`EngineBuilder`] once at startup. The built [`Engine`] is immutable and
//! can be shared across requests behind an `Arc`.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use trellis_core::json::has_ref;
use trellis_core::{Error, RecordKind, Result, Storage};

use crate::config::EngineConfig;
use crate::context::RequestContext;
use crate::hooks::{FormatHook, HookRegistry, RecordHooks};
use crate::notify::{EventHook, Notifier};
use crate::pages::Pages;
use crate::publish::UrlRule;
use crate::records::{RecordService, Records};
use crate::resolver;
use crate::scheduler::{ScheduleService, Scheduler};
use crate::uris::Uris;

/// The composition engine
pub struct Engine {
    records: Records,
    rules: Vec<Arc<dyn UrlRule>>,
}

impl Engine {
    /// Start configuring an engine
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Component service
    pub fn components(&self) -> RecordService<'_> {
        self.records.components()
    }

    /// Layout service
    pub fn layouts(&self) -> RecordService<'_> {
        self.records.layouts()
    }

    /// The component or layout service owning `address`
    pub fn service_for(&self, address: &str) -> Result<RecordService<'_>> {
        self.records.service_for(address)
    }

    /// Page service
    pub fn pages(&self) -> Pages<'_> {
        Pages::new(&self.records, &self.rules)
    }

    /// URL lookup for the configured site
    pub fn uris(&self) -> Uris<'_> {
        Uris::new(&self.records, self.config().site.prefix())
    }

    /// URL lookup for another prefix
    pub fn uris_for(&self, prefix: &str) -> Uris<'_> {
        Uris::new(&self.records, prefix)
    }

    /// Schedule entries
    pub fn schedule(&self) -> ScheduleService<'_> {
        ScheduleService::new(&self.records)
    }

    /// Background scheduler publishing due pages at the configured interval
    pub fn scheduler(self: &Arc<Self>) -> Scheduler {
        Scheduler::from_config(Arc::clone(self))
    }

    /// Fetch any record, running hooks for components and layouts
    pub async fn get(&self, address: &str, ctx: &RequestContext) -> Result<Value> {
        self.records.get(address, ctx).await
    }

    /// Resolve every reference in `document`
    pub async fn resolve(&self, document: Value, ctx: &RequestContext) -> Result<Value> {
        resolver::resolve(&self.records, document, ctx, has_ref).await
    }

    /// Shared service state
    pub fn records(&self) -> &Records {
        &self.records
    }

    /// The storage engine
    pub fn storage(&self) -> &Arc<dyn Storage> {
        self.records.storage()
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        self.records.config()
    }

    /// A request context for the configured site
    pub fn context(&self) -> RequestContext {
        RequestContext::for_site(self.config().site.clone())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("records", &self.records)
            .field("rules", &self.rules.len())
            .finish()
    }
}

/// Builder for [`Engine`]
///
/// ```ignore
/// let engine = Engine::builder()
///     .storage(Arc::new(MemoryStore::new()))
///     .config_file("trellis.toml")?
///     .component_hooks("article", Arc::new(ArticleHooks))
///     .url_rule(Arc::new(SlugRule::default()))
///     .build()?;
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    storage: Option<Arc<dyn Storage>>,
    config: EngineConfig,
    hooks: HookRegistry,
    rules: Vec<Arc<dyn UrlRule>>,
    notifier: Notifier,
}

impl EngineBuilder {
    /// Builder with default configuration and no storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage engine (required)
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Engine configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Load configuration from a `trellis.toml`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.config = EngineConfig::from_file(path.as_ref())?;
        Ok(self)
    }

    /// Hooks for components named `name`
    pub fn component_hooks(mut self, name: &str, hooks: Arc<dyn RecordHooks>) -> Self {
        self.hooks.register(RecordKind::Component, name, hooks);
        self
    }

    /// Hooks for layouts named `name`
    pub fn layout_hooks(mut self, name: &str, hooks: Arc<dyn RecordHooks>) -> Self {
        self.hooks.register(RecordKind::Layout, name, hooks);
        self
    }

    /// Output transform for requests with `extension`
    pub fn format_hook(mut self, extension: &str, hook: Arc<dyn FormatHook>) -> Self {
        self.hooks.register_format(extension, hook);
        self
    }

    /// Append a URL rule; rules run in the order they are added
    pub fn url_rule(mut self, rule: Arc<dyn UrlRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Receive engine events
    pub fn event_hook(mut self, hook: Arc<dyn EventHook>) -> Self {
        self.notifier.register(hook);
        self
    }

    /// Build the engine
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no storage was given or the
    /// configuration is invalid.
    pub fn build(self) -> Result<Engine> {
        let storage = self
            .storage
            .ok_or_else(|| Error::config("an engine needs a storage backend"))?;
        self.config.validate()?;

        info!(
            prefix = %self.config.site.prefix(),
            record_hooks = self.hooks.len(),
            url_rules = self.rules.len(),
            event_hooks = self.notifier.len(),
            "engine ready"
        );

        Ok(Engine {
            records: Records::new(
                storage,
                Arc::new(self.hooks),
                Arc::new(self.config),
                self.notifier,
            ),
            rules: self.rules,
        })
    }
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("storage", &self.storage.is_some())
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("rules", &self.rules.len())
            .field("notifier", &self.notifier)
            .finish()
    }
}
