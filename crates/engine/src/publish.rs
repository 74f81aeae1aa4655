//! Page publish orchestration
//!
//! Publishing a page is one linear pass with a single atomic commit:
//!
//! 1. Resolve input (caller data, or the latest page)
//! 2. Resolve the public URL through the rule chain
//! 3. Extend the URL history and write a redirect from the previous URL
//! 4. Publish every component and layout the page references
//! 5. Point the page's address fields at `published`
//! 6. Write the published page and the URL pointer
//! 7. Commit everything as one batch
//! 8. Log, notify, and enforce the budget
//!
//! Nothing touches storage before step 7, so readers never observe a
//! partial publish. Steps 1 to 7 run within the publish budget, and the
//! elapsed time is checked again after the commit. Either way a timeout
//! means the outcome is unknown, not that it was rolled back.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use trellis_core::json::find_empty_field;
use trellis_core::{
    strip_version, url_to_uri, with_version, Address, BatchOp, Error, Result, StorageExt,
    PUBLISHED,
};

use crate::context::RequestContext;
use crate::notify::EventKind;
use crate::records::Records;
use crate::timeout::with_budget;

/// Field holding the page's layout address
pub const LAYOUT_FIELD: &str = "layout";
/// Field holding the resolved public URL
pub const URL_FIELD: &str = "url";
/// Field overriding any rule-computed URL
pub const CUSTOM_URL_FIELD: &str = "customUrl";
/// Every URL the page has been published at, oldest first
pub const URL_HISTORY_FIELD: &str = "urlHistory";
/// Pages flagged dynamic publish without a URL
pub const DYNAMIC_FIELD: &str = "_dynamic";

/// A site-supplied rule computing a page's public URL
///
/// Rules run in registration order. The first to return `Ok` supplies the
/// URL; an `Err` means the rule does not apply to this page.
#[async_trait]
pub trait UrlRule: Send + Sync {
    /// Compute the URL for the page at `address`
    async fn resolve(
        &self,
        address: &str,
        page: &Map<String, Value>,
        ctx: &RequestContext,
    ) -> Result<String>;
}

/// Builds `<base url>/<slug>.html` from a top-level string field of the page
#[derive(Debug, Clone)]
pub struct SlugRule {
    field: String,
}

impl SlugRule {
    /// Rule reading the slug from `field`
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl Default for SlugRule {
    fn default() -> Self {
        Self::new("slug")
    }
}

#[async_trait]
impl UrlRule for SlugRule {
    async fn resolve(
        &self,
        _address: &str,
        page: &Map<String, Value>,
        ctx: &RequestContext,
    ) -> Result<String> {
        match page.get(&self.field).and_then(Value::as_str) {
            Some(slug) if !slug.is_empty() => {
                Ok(format!("{}/{}.html", ctx.site.base_url(), slug.trim_matches('/')))
            }
            _ => Err(Error::client(format!("page has no {}", self.field))),
        }
    }
}

/// Check caller-supplied page data before publishing it
///
/// # Errors
///
/// Returns a client error for an empty field at any depth, or a missing layout.
pub fn validate_page(data: &Value) -> Result<()> {
    if !data.is_object() {
        return Err(Error::client("Page data must be an object."));
    }
    if let Some(pointer) = find_empty_field(data) {
        return Err(Error::client(format!(
            "Page data has an empty field at {}.",
            pointer
        )));
    }
    if page_layout(data).is_none() {
        return Err(Error::client("Page must have a layout."));
    }
    Ok(())
}

/// The layout address of a page, if it has one
pub fn page_layout(page: &Value) -> Option<&str> {
    page.get(LAYOUT_FIELD).and_then(Value::as_str)
}

/// True if `value` names a component or layout of the site under `prefix`
///
/// Page fields hold literals or addresses. A string counts as an address
/// only when it parses as a component or layout of the page's own site;
/// anything else, including addresses of other sites, stays a literal.
pub fn is_page_reference(prefix: &str, value: &str) -> bool {
    Address::parse(value)
        .map_or(false, |parsed| parsed.kind.is_composable() && parsed.prefix == prefix)
}

/// Every component and layout address the page references, in field order
///
/// Only top-level fields are scanned: a string address or an array of them.
/// Duplicates are reported once.
pub fn page_references(prefix: &str, page: &Map<String, Value>) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |address: &str| {
        if is_page_reference(prefix, address) && !found.iter().any(|seen| seen == address) {
            found.push(address.to_string());
        }
    };

    for value in page.values() {
        match value {
            Value::String(address) => push(address.as_str()),
            Value::Array(items) => items.iter().filter_map(Value::as_str).for_each(&mut push),
            _ => {}
        }
    }
    found
}

/// Rewrite every component and layout address field of the page to `version`
pub fn rewrite_references(prefix: &str, page: &mut Map<String, Value>, version: Option<&str>) {
    let rewrite = |value: &mut Value| {
        if let Value::String(address) = value {
            if is_page_reference(prefix, address) {
                *address = with_version(address, version);
            }
        }
    };

    for value in page.values_mut() {
        match value {
            Value::Array(items) => items.iter_mut().for_each(&rewrite),
            other => rewrite(other),
        }
    }
}

/// Extend `history` with `url` unless it is already the newest entry
pub fn extend_history(previous: Option<&Value>, url: &str) -> Vec<String> {
    let mut history: Vec<String> = previous
        .and_then(|page| page.get(URL_HISTORY_FIELD))
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if history.last().map(String::as_str) != Some(url) {
        history.push(url.to_string());
    }
    history
}

/// Redirect from the second-to-last URL to the newest, once there are two
pub fn redirect_op(prefix: &str, history: &[String]) -> Option<BatchOp> {
    match history {
        [.., previous, newest] if previous != newest => Some(BatchOp::put(
            url_to_uri(prefix, previous),
            url_to_uri(prefix, newest),
        )),
        _ => None,
    }
}

fn non_empty_str<'a>(page: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    page.get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

fn is_dynamic(page: &Map<String, Value>) -> bool {
    page.get(DYNAMIC_FIELD).and_then(Value::as_bool) == Some(true)
}

/// Resolve the page's public URL
///
/// `customUrl` always wins, then the first rule that accepts the page, then
/// an existing `url` field. Dynamic pages may have none.
///
/// # Errors
///
/// Returns a client error if nothing yields a URL for a non-dynamic page.
pub async fn resolve_url(
    rules: &[std::sync::Arc<dyn UrlRule>],
    address: &str,
    page: &Map<String, Value>,
    ctx: &RequestContext,
) -> Result<Option<String>> {
    if let Some(custom) = non_empty_str(page, CUSTOM_URL_FIELD) {
        return Ok(Some(custom.to_string()));
    }

    for (index, rule) in rules.iter().enumerate() {
        match rule.resolve(address, page, ctx).await {
            Ok(url) if !url.is_empty() => return Ok(Some(url)),
            Ok(_) => debug!(address, rule = index, "url rule returned an empty url"),
            Err(e) => debug!(address, rule = index, reason = %e, "url rule rejected page"),
        }
    }

    if let Some(url) = non_empty_str(page, URL_FIELD) {
        return Ok(Some(url.to_string()));
    }
    if is_dynamic(page) {
        return Ok(None);
    }
    Err(Error::client("Page must have valid url to publish."))
}

/// What a committed publish wrote
struct Committed {
    page: Value,
    url: Option<String>,
    ops: usize,
}

/// Publish the page at `address`, returning the published document
///
/// The whole pass runs within the publish budget. A publish that commits but
/// finishes past its budget still reports a timeout.
pub(crate) async fn publish_page(
    records: &Records,
    rules: &[std::sync::Arc<dyn UrlRule>],
    address: &str,
    data: Option<Value>,
    ctx: &RequestContext,
) -> Result<Value> {
    let started = Instant::now();
    let budget = records.config().publish_budget();
    let published = with_version(address, Some(PUBLISHED));

    let committed = with_budget(
        "publish",
        budget,
        commit_page(records, rules, address, &published, data, ctx),
    )
    .await?;

    // 8. post-commit
    let elapsed = started.elapsed();
    let elapsed_ms = elapsed.as_millis() as u64;
    let url = committed.url.as_deref().unwrap_or("");
    if elapsed > budget / 2 {
        warn!(
            address = %published,
            url,
            ops = committed.ops,
            elapsed_ms,
            budget_ms = budget.as_millis() as u64,
            "slow publish"
        );
    } else {
        info!(address = %published, url, ops = committed.ops, elapsed_ms, "published page");
    }
    records.notifier().emit(
        EventKind::PublishPage,
        &published,
        committed.page.clone(),
        ctx.user.clone(),
    );

    if elapsed > budget {
        return Err(Error::timeout("publish", budget));
    }
    Ok(committed.page)
}

/// Steps 1 to 7: build every operation, then commit them as one batch
async fn commit_page(
    records: &Records,
    rules: &[std::sync::Arc<dyn UrlRule>],
    address: &str,
    published: &str,
    data: Option<Value>,
    ctx: &RequestContext,
) -> Result<Committed> {
    let latest = with_version(address, None);
    let prefix = Address::parse(address)?.prefix;
    let storage_ctx = ctx.for_storage();

    // 1. input
    let page = match data.filter(|data| !trellis_core::json::is_empty_document(data)) {
        Some(data) => {
            validate_page(&data)?;
            data
        }
        None => records.storage().get_json(&latest).await?,
    };
    let mut page = match page {
        Value::Object(page) => page,
        _ => return Err(Error::defect(format!("page at {} is not a document", latest))),
    };

    // 2. url
    let url = resolve_url(rules, &latest, &page, ctx).await?;

    // 3. history
    let mut ops = Vec::new();
    if let Some(url) = &url {
        let previous = records.storage().get_json_opt(published).await?;
        let history = extend_history(previous.as_ref(), url);
        if let Some(redirect) = redirect_op(&prefix, &history) {
            ops.push(redirect);
        }
        page.insert(URL_FIELD.to_string(), Value::String(url.clone()));
        page.insert(
            URL_HISTORY_FIELD.to_string(),
            Value::Array(history.into_iter().map(Value::String).collect()),
        );
    }

    // 4. referenced components and layout
    for reference in page_references(&prefix, &page) {
        let reference = strip_version(&reference);
        let service = records.service_for(reference)?;
        let published_ops = service
            .publish(reference, None, &storage_ctx)
            .await
            .map_err(|e| e.in_reference(reference))?;
        ops.extend(published_ops);
    }

    // 5-6. page and pointer
    rewrite_references(&prefix, &mut page, Some(PUBLISHED));
    let page = Value::Object(page);
    ops.push(BatchOp::put_json(published, &page)?);
    if let Some(url) = &url {
        ops.push(BatchOp::put(url_to_uri(&prefix, url), published));
    }

    // 7. commit
    let count = ops.len();
    records.storage().batch(ops).await?;
    Ok(Committed {
        page,
        url,
        ops: count,
    })
}
