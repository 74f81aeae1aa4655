//! Page service
//!
//! Pages are flat documents whose fields are literals, component/layout
//! addresses, or arrays of addresses. They are never split: a page's
//! components are separate records the page points at by address.

use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::{Map, Value};
use tracing::info;
use trellis_core::json::{for_each_ref_mut, ref_address, REF_FIELD};
use trellis_core::{
    is_instance, is_instance_ref, is_published, url_to_uri, version_of, with_version, Address,
    BatchOp, Error, RecordKind, Result, StorageExt, PUBLISHED,
};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::notify::EventKind;
use crate::publish::{self, page_layout, page_references, UrlRule, URL_FIELD};
use crate::records::Records;
use crate::resolver;
use crate::timeout::with_budget;

/// Operations on pages
#[derive(Clone, Copy)]
pub struct Pages<'a> {
    records: &'a Records,
    rules: &'a [Arc<dyn UrlRule>],
}

impl<'a> Pages<'a> {
    pub(crate) fn new(records: &'a Records, rules: &'a [Arc<dyn UrlRule>]) -> Self {
        Self { records, rules }
    }

    fn check_page(address: &str) -> Result<Address> {
        let parsed = Address::parse(address)?;
        if parsed.kind != RecordKind::Page {
            return Err(Error::client(format!("'{}' is not a page", address)));
        }
        Ok(parsed)
    }

    /// Stored page document
    pub async fn get(&self, address: &str) -> Result<Value> {
        Self::check_page(address)?;
        self.records.storage().get_json(address).await
    }

    /// Write a page
    ///
    /// Writing to `@published` publishes the data instead.
    ///
    /// # Errors
    ///
    /// Returns a client error if the page has no layout.
    pub async fn put(&self, address: &str, data: Value, ctx: &RequestContext) -> Result<Value> {
        Self::check_page(address)?;
        if is_published(address) {
            return self.publish(address, Some(data), ctx).await;
        }
        if !data.is_object() {
            return Err(Error::client("Page data must be an object."));
        }
        if page_layout(&data).is_none() {
            return Err(Error::client("Page must have a layout."));
        }

        let key = with_version(address, version_of(address));
        let budget = self.records.config().put_budget();
        with_budget("put", budget, self.records.storage().put_json(&key, &data)).await?;
        info!(address = %key, "saved page");

        self.records
            .notifier()
            .emit(EventKind::Save, &key, data.clone(), ctx.user.clone());
        Ok(data)
    }

    /// Publish the page, optionally replacing its data
    ///
    /// # Errors
    ///
    /// Returns a client error for invalid data or an unresolvable URL, and a
    /// timeout if the publish exceeded its budget. A timeout does not mean
    /// the publish was rolled back.
    pub async fn publish(
        &self,
        address: &str,
        data: Option<Value>,
        ctx: &RequestContext,
    ) -> Result<Value> {
        Self::check_page(address)?;
        publish::publish_page(self.records, self.rules, address, data, ctx).await
    }

    /// Create a page under `prefix` from `data`
    ///
    /// Every instance the data references is cloned to a fresh instance,
    /// including instances nested inside the cloned ones. Default components
    /// are shared. Returns the new page with its address under `_ref`.
    pub async fn create(&self, prefix: &str, data: Value, ctx: &RequestContext) -> Result<Value> {
        let mut page = match data {
            Value::Object(page) => page,
            _ => return Err(Error::client("Page data must be an object.")),
        };
        if page.get(publish::LAYOUT_FIELD).and_then(Value::as_str).is_none() {
            return Err(Error::client("Page must have a layout."));
        }
        page.remove(REF_FIELD);
        page.remove(URL_FIELD);
        page.remove(publish::URL_HISTORY_FIELD);

        let address = Address::page(prefix, &new_id()).to_string();
        let storage_ctx = ctx.for_storage();

        let instances: Vec<String> = page_references(prefix, &page)
            .into_iter()
            .filter(|reference| is_instance(reference))
            .collect();
        let clones = try_join_all(
            instances
                .iter()
                .map(|instance| self.clone_instance(instance, &storage_ctx)),
        )
        .await?;

        let mut ops = Vec::new();
        let mut renamed = Vec::with_capacity(clones.len());
        for (original, (copy, copy_ops)) in instances.into_iter().zip(clones) {
            ops.extend(copy_ops);
            renamed.push((original, copy));
        }
        rename_fields(&mut page, &renamed);

        let page = Value::Object(page);
        ops.push(BatchOp::put_json(&address, &page)?);
        let count = ops.len();
        self.records.storage().batch(ops).await?;
        info!(address = %address, ops = count, "created page");

        self.records
            .notifier()
            .emit(EventKind::CreatePage, &address, page.clone(), ctx.user.clone());

        let mut created = match page {
            Value::Object(page) => page,
            _ => Map::new(),
        };
        created.insert(REF_FIELD.to_string(), Value::String(address));
        Ok(Value::Object(created))
    }

    /// Copy the instance at `address` (and the instances inside it) to new ids
    async fn clone_instance(
        &self,
        address: &str,
        ctx: &RequestContext,
    ) -> Result<(String, Vec<BatchOp>)> {
        let source = with_version(address, None);
        let service = self.records.service_for(&source)?;
        let copy = async {
            let data = service.get(&source, ctx).await?;
            let mut data =
                resolver::resolve_at(self.records, &source, data, ctx, is_instance_ref).await?;

            // nested instances move to fresh ids; the split writes the ones
            // carrying data, empty ones are written below
            let mut empty = Vec::new();
            for_each_ref_mut(&mut data, &mut |node| {
                if let Some(renewed) = ref_address(node).and_then(renew_instance) {
                    if node.len() == 1 {
                        empty.push(renewed.clone());
                    }
                    node.insert(REF_FIELD.to_string(), Value::String(renewed));
                }
            });

            let copy = renew_instance(&source)
                .ok_or_else(|| Error::client(format!("'{}' is not an instance", source)))?;
            let mut ops = service.put(&copy, data, ctx).await?;
            for address in &empty {
                ops.extend(
                    self.records
                        .route(address, Value::Object(Map::new()), ctx)
                        .await?,
                );
            }
            Ok::<_, Error>((copy, ops))
        }
        .await;
        copy.map_err(|e| e.in_reference(source))
    }

    /// Remove the published page and its URL pointer
    ///
    /// Returns the document that was published.
    pub async fn unpublish(&self, address: &str, ctx: &RequestContext) -> Result<Value> {
        let parsed = Self::check_page(address)?;
        let published = with_version(address, Some(PUBLISHED));
        let prior = self.records.storage().get_json(&published).await?;

        let mut ops = vec![BatchOp::del(&published)];
        if let Some(url) = prior.get(URL_FIELD).and_then(Value::as_str) {
            ops.push(BatchOp::del(url_to_uri(&parsed.prefix, url)));
        }
        self.records.storage().batch(ops).await?;
        info!(address = %published, "unpublished page");

        self.records.notifier().emit(
            EventKind::UnpublishPage,
            &published,
            prior.clone(),
            ctx.user.clone(),
        );
        Ok(prior)
    }

    /// The page with every component and layout field composed
    ///
    /// Address fields become `{_ref, ...}` documents with all references
    /// resolved.
    pub async fn compose(&self, address: &str, ctx: &RequestContext) -> Result<Value> {
        let prefix = Self::check_page(address)?.prefix;
        let mut page = match self.records.storage().get_json(address).await? {
            Value::Object(page) => page,
            _ => return Err(Error::defect(format!("page at {} is not a document", address))),
        };

        let references = page_references(&prefix, &page);
        let composed = try_join_all(references.iter().map(|reference| async move {
            let service = self.records.service_for(reference)?;
            let data = service.get_composed(reference, ctx).await?;
            Ok::<Value, Error>(with_ref(reference, data))
        }))
        .await?;

        let composed: Vec<(String, Value)> = references.into_iter().zip(composed).collect();
        for value in page.values_mut() {
            match value {
                Value::Array(items) => items
                    .iter_mut()
                    .for_each(|item| substitute(item, &composed)),
                other => substitute(other, &composed),
            }
        }
        Ok(Value::Object(page))
    }
}

impl std::fmt::Debug for Pages<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pages")
            .field("rules", &self.rules.len())
            .finish()
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// The same instance address under a fresh id, at latest
fn renew_instance(address: &str) -> Option<String> {
    let parsed = Address::parse(address).ok()?;
    parsed.instance.as_ref()?;
    Some(parsed.with_instance(new_id()).at_version(None).to_string())
}

fn rename_fields(page: &mut Map<String, Value>, renamed: &[(String, String)]) {
    let rename = |value: &mut Value| {
        if let Value::String(address) = value {
            let copy = renamed
                .iter()
                .find(|(original, _)| original.as_str() == address.as_str());
            if let Some((_, copy)) = copy {
                *address = copy.clone();
            }
        }
    };

    for value in page.values_mut() {
        match value {
            Value::Array(items) => items.iter_mut().for_each(rename),
            other => rename(other),
        }
    }
}

fn substitute(value: &mut Value, composed: &[(String, Value)]) {
    if let Value::String(address) = value {
        let found = composed
            .iter()
            .find(|(reference, _)| reference.as_str() == address.as_str());
        if let Some((_, data)) = found {
            *value = data.clone();
        }
    }
}

fn with_ref(address: &str, data: Value) -> Value {
    let mut node = Map::new();
    node.insert(REF_FIELD.to_string(), Value::String(address.to_string()));
    if let Value::Object(fields) = data {
        for (key, value) in fields {
            if key != REF_FIELD {
                node.insert(key, value);
            }
        }
    }
    Value::Object(node)
}
