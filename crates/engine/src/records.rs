//! Record type services
//!
//! [`Records`] holds the shared state every service needs: storage, the hook
//! registry, configuration and the notifier. A [`RecordService`] is a cheap
//! view over it for one composable kind (components or layouts).
//!
//! Reads go raw fetch, then the type's render hook, then the format hook for
//! the requested extension. Writes go through the splitter, and each split
//! record is routed through its own type's save hook or default version
//! routing.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};
use trellis_core::json::{has_ref, is_empty_document};
use trellis_core::{
    is_instance, is_instance_ref, is_published, kind_of, version_of, with_version, Address,
    BatchOp, Error, RecordKind, Result, Storage, StorageExt, PUBLISHED,
};

use crate::config::EngineConfig;
use crate::context::RequestContext;
use crate::hooks::{HookRegistry, SaveOutcome};
use crate::notify::{EventKind, Notifier};
use crate::resolver;
use crate::splitter::split;
use crate::timeout::with_budget;

/// Shared state behind every record service
#[derive(Clone)]
pub struct Records {
    db: Arc<dyn Storage>,
    hooks: Arc<HookRegistry>,
    config: Arc<EngineConfig>,
    notifier: Notifier,
}

impl Records {
    /// Bundle the collaborators services are built from
    pub fn new(
        db: Arc<dyn Storage>,
        hooks: Arc<HookRegistry>,
        config: Arc<EngineConfig>,
        notifier: Notifier,
    ) -> Self {
        Self {
            db,
            hooks,
            config,
            notifier,
        }
    }

    /// The storage engine
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.db
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registered hooks
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Component service
    pub fn components(&self) -> RecordService<'_> {
        RecordService::new(self, RecordKind::Component)
    }

    /// Layout service
    pub fn layouts(&self) -> RecordService<'_> {
        RecordService::new(self, RecordKind::Layout)
    }

    /// The service owning `address`
    ///
    /// # Errors
    ///
    /// Returns a client error if `address` is not a component or layout.
    pub fn service_for(&self, address: &str) -> Result<RecordService<'_>> {
        match kind_of(address) {
            Some(RecordKind::Component) => Ok(self.components()),
            Some(RecordKind::Layout) => Ok(self.layouts()),
            _ => Err(Error::client(format!(
                "'{}' is not a component or layout",
                address
            ))),
        }
    }

    /// Fetch any record as a document
    ///
    /// Components and layouts go through their service so hooks run. Every
    /// other address is read straight from storage.
    pub async fn get(&self, address: &str, ctx: &RequestContext) -> Result<Value> {
        match kind_of(address) {
            Some(RecordKind::Component) => self.components().get(address, ctx).await,
            Some(RecordKind::Layout) => self.layouts().get(address, ctx).await,
            _ => self.db.get_json(address).await,
        }
    }

    /// Route one split record through its owner's save hook
    ///
    /// Addresses of unknown type use default routing.
    pub(crate) async fn route(
        &self,
        address: &str,
        value: Value,
        ctx: &RequestContext,
    ) -> Result<Vec<BatchOp>> {
        match self.hooks.for_address(address) {
            Some(hooks) => match hooks.save(address, value, ctx).await? {
                SaveOutcome::Document(value) => default_route(address, &value),
                SaveOutcome::Operations(ops) => Ok(ops),
            },
            None => default_route(address, &value),
        }
    }
}

impl std::fmt::Debug for Records {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Records")
            .field("hooks", &self.hooks)
            .field("config", &self.config)
            .field("notifier", &self.notifier)
            .finish()
    }
}

/// Write `value` to the version the address names
///
/// No suffix writes latest, `published` writes the published copy and any
/// other tag writes that tag.
pub fn default_route(address: &str, value: &Value) -> Result<Vec<BatchOp>> {
    let key = with_version(address, version_of(address));
    Ok(vec![BatchOp::put_json(key, value)?])
}

/// Operations for one composable record kind
#[derive(Debug, Clone, Copy)]
pub struct RecordService<'a> {
    records: &'a Records,
    kind: RecordKind,
}

impl<'a> RecordService<'a> {
    fn new(records: &'a Records, kind: RecordKind) -> Self {
        Self { records, kind }
    }

    /// The kind this service owns
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    fn check_owns(&self, address: &str) -> Result<()> {
        if kind_of(address) == Some(self.kind) {
            Ok(())
        } else {
            Err(Error::client(format!("'{}' is not in {}", address, self.kind)))
        }
    }

    /// Stored document at `address`, without hooks
    ///
    /// A default (non-instance) record that was never published reads through
    /// to its latest version.
    pub async fn get_raw(&self, address: &str) -> Result<Value> {
        let db = self.records.storage();
        let value = match db.get_json(address).await {
            Err(e) if e.is_not_found() && is_published(address) && !is_instance(address) => {
                debug!(address, "no published copy, reading latest");
                db.get_json(&with_version(address, None)).await?
            }
            other => other?,
        };
        if !value.is_object() {
            return Err(Error::defect(format!("record at {} is not a document", address)));
        }
        Ok(value)
    }

    /// Read `address` through its render and format hooks, within the get budget
    pub async fn get(&self, address: &str, ctx: &RequestContext) -> Result<Value> {
        self.check_owns(address)?;
        with_budget("get", self.records.config().get_budget(), async {
            let data = self.get_raw(address).await?;
            let data = match self.records.hooks().for_address(address) {
                Some(hooks) => hooks.render(address, data, ctx).await?,
                None => data,
            };
            if !data.is_object() {
                return Err(Error::defect(format!(
                    "render hook for {} returned a non-document",
                    address
                )));
            }

            let format = ctx
                .extension
                .as_deref()
                .and_then(|extension| self.records.hooks().format(extension));
            match format {
                Some(format) => {
                    let data = format.format(address, data, ctx).await?;
                    if !data.is_object() {
                        return Err(Error::defect(format!(
                            "format hook for {} returned a non-document",
                            address
                        )));
                    }
                    Ok(data)
                }
                None => Ok(data),
            }
        })
        .await
    }

    /// Read `address` with every reference resolved
    pub async fn get_composed(&self, address: &str, ctx: &RequestContext) -> Result<Value> {
        let data = self.get(address, ctx).await?;
        resolver::resolve_at(self.records, address, data, ctx, has_ref).await
    }

    /// Operations that write `document` at `address`
    ///
    /// Inline children are split out and each record is routed through its
    /// own type's save hook. Nothing is committed, so the caller's budget
    /// covers the hooks.
    ///
    /// # Errors
    ///
    /// Returns a defect if the root record's save hook produced no operations.
    pub async fn put(
        &self,
        address: &str,
        document: Value,
        ctx: &RequestContext,
    ) -> Result<Vec<BatchOp>> {
        self.check_owns(address)?;
        let writes = split(address, document)?;
        let root = writes.len() - 1;

        let mut ops = Vec::with_capacity(writes.len());
        for (index, write) in writes.into_iter().enumerate() {
            let routed = self.records.route(&write.address, write.value, ctx).await?;
            if index == root && routed.is_empty() {
                return Err(Error::defect(format!(
                    "save hook for {} produced no operations",
                    address
                )));
            }
            ops.extend(routed);
        }
        Ok(ops)
    }

    /// Operations that publish `address`
    ///
    /// With data, that data is written under `published`. Without, the latest
    /// document is read, its instance references are resolved, and the
    /// snapshot is written under `published`. Default components referenced
    /// from it are left to read through to their latest version.
    pub async fn publish(
        &self,
        address: &str,
        data: Option<Value>,
        ctx: &RequestContext,
    ) -> Result<Vec<BatchOp>> {
        let target = with_version(address, Some(PUBLISHED));
        let document = match data.filter(|data| !is_empty_document(data)) {
            Some(data) => data,
            None => {
                let latest = with_version(address, None);
                let storage_ctx = ctx.for_storage();
                let data = self.get(&latest, &storage_ctx).await?;
                resolver::resolve_at(self.records, &latest, data, &storage_ctx, is_instance_ref)
                    .await?
            }
        };
        self.put(&target, document, ctx).await
    }

    /// Write `document` at `address` and fire `save`
    ///
    /// Save hooks and the commit run within the put budget. A timeout leaves
    /// the outcome unknown.
    pub async fn put_and_commit(
        &self,
        address: &str,
        document: Value,
        ctx: &RequestContext,
    ) -> Result<Value> {
        let budget = self.records.config().put_budget();
        let count = with_budget("put", budget, async {
            let ops = self.put(address, document.clone(), ctx).await?;
            let count = ops.len();
            self.records.storage().batch(ops).await?;
            Ok(count)
        })
        .await?;
        info!(address, ops = count, "saved record");

        self.records
            .notifier()
            .emit(EventKind::Save, address, document.clone(), ctx.user.clone());
        Ok(document)
    }

    /// Publish `address` and fire `save` with the published document
    pub async fn publish_and_commit(
        &self,
        address: &str,
        data: Option<Value>,
        ctx: &RequestContext,
    ) -> Result<Value> {
        let target = with_version(address, Some(PUBLISHED));
        let ops = self.publish(address, data, ctx).await?;
        let published = ops
            .iter()
            .rev()
            .find(|op| op.key() == target)
            .map(BatchOp::json)
            .transpose()?
            .flatten()
            .unwrap_or(Value::Null);
        let count = ops.len();
        self.records.storage().batch(ops).await?;
        info!(address = %target, ops = count, "published record");

        self.records
            .notifier()
            .emit(EventKind::Save, &target, published.clone(), ctx.user.clone());
        Ok(published)
    }

    /// Delete `address`, returning the document it held
    ///
    /// # Errors
    ///
    /// Returns not found if nothing is stored at `address`.
    pub async fn del(&self, address: &str, ctx: &RequestContext) -> Result<Value> {
        self.check_owns(address)?;
        let prior = self.records.storage().get_json(address).await?;
        let ops = match self.records.hooks().for_address(address) {
            Some(hooks) => hooks.del(address, &prior, ctx).await?,
            None => vec![BatchOp::del(address)],
        };
        self.records.storage().batch(ops).await?;
        info!(address, "deleted record");

        self.records
            .notifier()
            .emit(EventKind::Delete, address, prior.clone(), ctx.user.clone());
        Ok(prior)
    }

    /// Names of every record of this kind stored under the site
    pub async fn list_names(&self, ctx: &RequestContext) -> Result<Vec<String>> {
        let prefix = format!("{}/{}/", ctx.prefix(), self.kind);
        let keys = self.records.storage().list_keys(&prefix).await?;
        let names: BTreeSet<String> = keys
            .iter()
            .filter_map(|key| Address::parse(key).ok())
            .map(|address| address.name)
            .collect();
        Ok(names.into_iter().collect())
    }

    /// Latest addresses of every instance of `name`
    pub async fn list_instances(&self, name: &str, ctx: &RequestContext) -> Result<Vec<String>> {
        let prefix = format!("{}/{}/{}/instances/", ctx.prefix(), self.kind, name);
        let keys = self.records.storage().list_keys(&prefix).await?;
        Ok(keys
            .into_iter()
            .filter(|key| version_of(key).is_none())
            .collect())
    }
}
