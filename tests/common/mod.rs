//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
pub use serde_json::{json, Value};
use tokio::sync::mpsc;
pub use trellis::{
    Engine, EngineConfig, ErrorKind, EventHook, EventKind, MemoryStore, Notification,
    RequestContext, SiteConfig, SlugRule, Storage, StorageExt, UrlRule,
};

/// Site prefix every test engine uses
pub const SITE: &str = "example.com";

/// An engine over a fresh in-memory store
pub struct TestEngine {
    pub engine: Arc<Engine>,
    pub store: MemoryStore,
    pub events: mpsc::UnboundedReceiver<Notification>,
}

impl TestEngine {
    /// Engine with the slug rule and default budgets
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Engine with a custom configuration
    pub fn with_config(config: EngineConfig) -> Self {
        let store = MemoryStore::new();
        let (tx, events) = mpsc::unbounded_channel();
        let engine = Engine::builder()
            .storage(Arc::new(store.clone()))
            .config(config)
            .url_rule(Arc::new(SlugRule::default()))
            .event_hook(Arc::new(Recorder(tx)))
            .build()
            .expect("test engine builds");
        Self {
            engine: Arc::new(engine),
            store,
            events,
        }
    }

    pub fn ctx(&self) -> RequestContext {
        self.engine.context()
    }

    /// Write raw JSON records straight to storage
    pub async fn seed<K: AsRef<str>>(&self, records: &[(K, Value)]) {
        for (address, value) in records {
            self.store.put_json(address.as_ref(), value).await.unwrap();
        }
    }

    pub async fn read(&self, address: &str) -> Value {
        self.store.get_json(address).await.unwrap()
    }

    pub async fn exists(&self, address: &str) -> bool {
        self.store.get(address).await.is_ok()
    }

    /// Next event, waiting up to a second for the dispatch task
    pub async fn next_event(&mut self) -> Notification {
        tokio::time::timeout(Duration::from_secs(1), self.events.recv())
            .await
            .expect("event arrives in time")
            .expect("event channel open")
    }

    /// Skip events until one of `kind` arrives
    pub async fn wait_for(&mut self, kind: EventKind) -> Notification {
        loop {
            let event = self.next_event().await;
            if event.event == kind {
                return event;
            }
        }
    }

    /// A published page with a layout and one article instance
    pub async fn seed_site(&self) {
        self.seed(&[
            (addr("layouts/main"), json!({"head": "Site"})),
            (
                addr("components/article/instances/1"),
                json!({
                    "title": "Hello",
                    "body": {"_ref": addr("components/text/instances/1")}
                }),
            ),
            (addr("components/text/instances/1"), json!({"text": "first"})),
            (
                addr("pages/p"),
                json!({
                    "layout": addr("layouts/main"),
                    "main": [addr("components/article/instances/1")],
                    "slug": "hello"
                }),
            ),
        ])
        .await;
    }
}

/// Config for the `example.com` site
pub fn test_config() -> EngineConfig {
    EngineConfig {
        site: SiteConfig::new(SITE),
        ..EngineConfig::default()
    }
}

/// `example.com/<rest>`
pub fn addr(rest: &str) -> String {
    format!("{}/{}", SITE, rest)
}

struct Recorder(mpsc::UnboundedSender<Notification>);

#[async_trait]
impl EventHook for Recorder {
    async fn handle(&self, notification: &Notification) -> trellis::Result<()> {
        let _ = self.0.send(notification.clone());
        Ok(())
    }
}
