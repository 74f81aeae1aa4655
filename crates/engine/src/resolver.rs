//! Reference resolver
//!
//! Expands reference fields into composed documents. Every reference is
//! fetched through [`Records::get`], so per-type render hooks run on the way.
//! Sibling references at one depth are fetched concurrently; a fetched record
//! is resolved only after it has been retrieved.
//!
//! Each branch carries the chain of addresses above it. Revisiting an address
//! already on the chain is a cycle and fails fast. The same record reached
//! through two sibling branches is not a cycle.

use futures::future::{try_join_all, BoxFuture, FutureExt};
use serde_json::Value;
use tracing::trace;
use trellis_core::json::{find_refs, ref_address, REF_FIELD};
use trellis_core::{Error, RefFilter, Result};

use crate::context::RequestContext;
use crate::records::Records;

/// Resolve every reference in `document` that matches `filter`
///
/// Fetched fields are merged onto the placeholder object. The `_ref` marker
/// is kept as provenance.
///
/// # Errors
///
/// A failure below a reference is returned wrapped with that reference's
/// address, one layer per level, so the trail names the failing branch.
pub fn resolve<'a>(
    records: &'a Records,
    document: Value,
    ctx: &'a RequestContext,
    filter: RefFilter,
) -> BoxFuture<'a, Result<Value>> {
    resolve_within(records, document, ctx, filter, Vec::new())
}

/// Resolve a document that was itself read from `address`
///
/// The address seeds the ancestor chain, so a record pointing back at itself
/// is reported as a cycle.
pub(crate) fn resolve_at<'a>(
    records: &'a Records,
    address: &str,
    document: Value,
    ctx: &'a RequestContext,
    filter: RefFilter,
) -> BoxFuture<'a, Result<Value>> {
    resolve_within(records, document, ctx, filter, vec![address.to_string()])
}

fn resolve_within<'a>(
    records: &'a Records,
    mut document: Value,
    ctx: &'a RequestContext,
    filter: RefFilter,
    ancestors: Vec<String>,
) -> BoxFuture<'a, Result<Value>> {
    async move {
        let paths = find_refs(&document, filter);
        if paths.is_empty() {
            return Ok(document);
        }

        let addresses = paths
            .iter()
            .map(|path| {
                document
                    .pointer(path)
                    .and_then(Value::as_object)
                    .and_then(ref_address)
                    .map(str::to_string)
                    .ok_or_else(|| Error::defect(format!("reference at {} has no address", path)))
            })
            .collect::<Result<Vec<String>>>()?;

        let fetches = addresses.into_iter().map(|address| {
            let ancestors = &ancestors;
            async move {
                if ancestors.contains(&address) {
                    return Err(Error::client(format!(
                        "reference cycle detected at {}",
                        address
                    )));
                }
                trace!(address = %address, depth = ancestors.len(), "resolving reference");

                let mut chain = ancestors.clone();
                chain.push(address.clone());
                let fetched = async {
                    let fetched = records.get(&address, ctx).await?;
                    resolve_within(records, fetched, ctx, filter, chain).await
                }
                .await;
                fetched.map_err(|e| e.in_reference(address))
            }
        });
        let fetched = try_join_all(fetches).await?;

        for (path, fetched) in paths.iter().zip(fetched) {
            let node = document.pointer_mut(path).and_then(Value::as_object_mut);
            if let (Some(node), Value::Object(fields)) = (node, fetched) {
                for (key, value) in fields {
                    if key != REF_FIELD {
                        node.insert(key, value);
                    }
                }
            }
        }

        Ok(document)
    }
    .boxed()
}
