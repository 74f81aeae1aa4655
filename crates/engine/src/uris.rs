//! Public URL lookup
//!
//! A uri record maps an encoded public URL to either a published page address
//! or, once a page has moved, to the uri address of its newer URL.

use tracing::{debug, info};
use trellis_core::{kind_of, url_to_uri, BatchOp, Error, RecordKind, Result};

use crate::records::Records;

/// Redirect hops followed before a chain is treated as a loop
pub const MAX_REDIRECTS: usize = 10;

/// The page a URL resolves to, and whether it was reached through a redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTarget {
    /// Page address the URL lands on
    pub page: String,
    /// Uri address that was finally read
    pub uri: String,
    /// Redirects followed on the way
    pub redirects: usize,
}

impl UrlTarget {
    /// True if the URL is no longer the page's current one
    pub fn is_redirect(&self) -> bool {
        self.redirects > 0
    }
}

/// Operations on uri records
#[derive(Debug, Clone)]
pub struct Uris<'a> {
    records: &'a Records,
    prefix: String,
}

impl<'a> Uris<'a> {
    pub(crate) fn new(records: &'a Records, prefix: impl Into<String>) -> Self {
        Self {
            records,
            prefix: prefix.into(),
        }
    }

    /// The uri address `url` is stored under
    pub fn address(&self, url: &str) -> String {
        url_to_uri(&self.prefix, url)
    }

    /// Resolve `url` to the page it currently serves, following redirects
    ///
    /// # Errors
    ///
    /// Returns not found for an unknown URL and a client error for a redirect
    /// chain longer than [`MAX_REDIRECTS`].
    pub async fn lookup(&self, url: &str) -> Result<UrlTarget> {
        let mut uri = self.address(url);
        for redirects in 0..=MAX_REDIRECTS {
            let target = self.records.storage().get(&uri).await?;
            if kind_of(&target) != Some(RecordKind::Uri) {
                debug!(url, page = %target, redirects, "resolved url");
                return Ok(UrlTarget {
                    page: target,
                    uri,
                    redirects,
                });
            }
            uri = target;
        }
        Err(Error::client(format!("redirect loop for {}", url)))
    }

    /// Point `url` at `target`, a page address or another uri address
    pub async fn put(&self, url: &str, target: &str) -> Result<()> {
        let uri = self.address(url);
        self.records
            .storage()
            .batch(vec![BatchOp::put(&uri, target)])
            .await?;
        info!(uri = %uri, target, "wrote url pointer");
        Ok(())
    }

    /// Remove the pointer for `url`, returning where it pointed
    pub async fn del(&self, url: &str) -> Result<String> {
        let uri = self.address(url);
        let prior = self.records.storage().del(&uri).await?;
        info!(uri = %uri, "removed url pointer");
        Ok(prior)
    }
}
