//! The storage engine contract
//!
//! The engine consumes storage only through [`Storage`]. Implementations are
//! passed in as `Arc<dyn Storage>` at construction, so swapping engines is a
//! startup decision rather than a global mutation.
//!
//! Thread safety: all methods may be called concurrently from many tasks.

use async_trait::async_trait;
use futures::stream::{BoxStream, TryStreamExt};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{render_entries, BatchOp, ListEntry, ListOptions};

/// Minimal atomic key-value contract
#[async_trait]
pub trait Storage: Send + Sync {
    /// Get the encoded value at `key`
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the key does not exist.
    async fn get(&self, key: &str) -> Result<String>;

    /// Write `value` at `key`, overwriting any previous value
    async fn put(&self, key: &str, value: String) -> Result<()>;

    /// Delete `key`, returning the value it held
    ///
    /// Of two concurrent deletes of the same key exactly one receives the
    /// value; the other fails with `Error::NotFound`.
    async fn del(&self, key: &str) -> Result<String>;

    /// Apply every operation atomically
    ///
    /// Readers observe either none or all of the batch.
    async fn batch(&self, ops: Vec<BatchOp>) -> Result<()>;

    /// Stream entries matching `options`, sorted by key
    fn list(&self, options: ListOptions) -> BoxStream<'static, Result<ListEntry>>;

    /// Remove everything (test/bootstrap use only)
    async fn clear(&self) -> Result<()>;
}

/// JSON conveniences over any [`Storage`]
#[async_trait]
pub trait StorageExt: Storage {
    /// Get and decode a JSON document
    async fn get_json(&self, key: &str) -> Result<Value> {
        let raw = self.get(key).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Get and decode a JSON document, mapping a miss to `None`
    async fn get_json_opt(&self, key: &str) -> Result<Option<Value>> {
        match self.get_json(key).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Encode and write a JSON document
    async fn put_json(&self, key: &str, value: &Value) -> Result<()> {
        let encoded = serde_json::to_string(value)?;
        self.put(key, encoded).await
    }

    /// Delete a key, mapping a miss to `None`
    async fn del_opt(&self, key: &str) -> Result<Option<String>> {
        match self.del(key).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Drain a listing into a vector
    async fn list_entries(&self, options: ListOptions) -> Result<Vec<ListEntry>> {
        self.list(options).try_collect().await
    }

    /// Keys under `prefix`, sorted
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self
            .list_entries(ListOptions::prefix(prefix).keys_only())
            .await?;
        entries
            .into_iter()
            .map(|entry| match entry {
                ListEntry::Key(key) => Ok(key),
                other => Err(Error::storage(format!(
                    "keys-only listing returned {:?}",
                    other
                ))),
            })
            .collect()
    }

    /// Drain a listing and render it as JSON according to `options`
    async fn collect_list(&self, options: ListOptions) -> Result<Value> {
        let entries = self.list_entries(options.clone()).await?;
        Ok(render_entries(entries, &options))
    }
}

impl<T: Storage + ?Sized> StorageExt for T {}
