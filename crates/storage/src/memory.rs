//! MemoryStore: in-process storage engine
//!
//! This module implements the Storage contract using:
//! - `BTreeMap<String, String>` for lexicographically ordered keys
//! - `parking_lot::RwLock` for thread-safe access
//! - `AtomicU64` for a monotonically increasing write version
//!
//! # Design Notes
//!
//! - **Batches hold the write lock for every operation**: no reader can see a
//!   partial batch.
//! - **Listing snapshots under the read lock**: the returned stream owns its
//!   entries, so slow consumers never block writers.
//! - **One version bump per mutation call**: a batch of any size advances the
//!   version by exactly one.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use tracing::debug;

use trellis_core::{BatchOp, Error, ListEntry, ListOptions, Result, Storage};

/// In-memory storage engine
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    /// Ordered map from key to encoded value
    data: Arc<RwLock<BTreeMap<String, String>>>,
    /// Version of the last applied mutation
    version: Arc<AtomicU64>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `entries`
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        {
            let mut data = store.data.write();
            for (key, value) in entries {
                data.insert(key.into(), value.into());
            }
        }
        store
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Version of the last applied mutation (0 before any write)
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Deep copy of the current contents
    ///
    /// Taken under the read lock, so it never contains a partial batch.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.data.read().clone()
    }

    fn bump(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Entries of `data` matching `options`, in key order
fn select(data: &BTreeMap<String, String>, options: &ListOptions) -> Vec<ListEntry> {
    let matching = data
        .range(options.prefix.clone()..)
        .take_while(|(key, _)| key.starts_with(&options.prefix))
        .skip(options.skip)
        .map(|(key, value)| options.project(key, value));

    match options.limit {
        Some(limit) => matching.take(limit).collect(),
        None => matching.collect(),
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn get(&self, key: &str) -> Result<String> {
        let data = self.data.read();
        data.get(key).cloned().ok_or_else(|| Error::not_found(key))
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        self.data.write().insert(key.to_string(), value);
        self.bump();
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<String> {
        let removed = self.data.write().remove(key);
        match removed {
            Some(value) => {
                self.bump();
                Ok(value)
            }
            None => Err(Error::not_found(key)),
        }
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        let count = ops.len();
        // Acquire the write lock ONCE for the entire batch
        let mut data = self.data.write();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOp::Del { key } => {
                    data.remove(&key);
                }
            }
        }
        let version = self.bump();
        drop(data);

        debug!(ops = count, version, "applied batch");
        Ok(())
    }

    fn list(&self, options: ListOptions) -> BoxStream<'static, Result<ListEntry>> {
        let entries = select(&self.data.read(), &options);
        stream::iter(entries.into_iter().map(Ok)).boxed()
    }

    async fn clear(&self) -> Result<()> {
        self.data.write().clear();
        self.bump();
        Ok(())
    }
}
