//! Notification dispatch
//!
//! After a successful write the engine fires a named event at every registered
//! [`EventHook`]. Dispatch is fire-and-forget: each hook runs on its own task,
//! and a failing hook is logged, never reported to the caller whose write has
//! already committed.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};
use trellis_core::Result;

use crate::context::User;

/// Events the engine emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    /// A page was published
    #[serde(rename = "publishPage")]
    PublishPage,
    /// A page was created
    #[serde(rename = "createPage")]
    CreatePage,
    /// A page was unpublished
    #[serde(rename = "unpublishPage")]
    UnpublishPage,
    /// A record was saved
    #[serde(rename = "save")]
    Save,
    /// A record was deleted
    #[serde(rename = "delete")]
    Delete,
}

impl EventKind {
    /// Event name as seen by hooks
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PublishPage => "publishPage",
            EventKind::CreatePage => "createPage",
            EventKind::UnpublishPage => "unpublishPage",
            EventKind::Save => "save",
            EventKind::Delete => "delete",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload handed to event hooks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Event name
    pub event: EventKind,
    /// Address the event concerns
    pub uri: String,
    /// Document written (or removed)
    pub data: Value,
    /// Acting user
    pub user: Option<User>,
}

/// Receiver of engine events
#[async_trait]
pub trait EventHook: Send + Sync {
    /// Handle one event
    async fn handle(&self, notification: &Notification) -> Result<()>;
}

/// Fans events out to every registered hook
#[derive(Clone, Default)]
pub struct Notifier {
    hooks: Vec<Arc<dyn EventHook>>,
}

impl Notifier {
    /// Notifier with no hooks
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hook
    pub fn register(&mut self, hook: Arc<dyn EventHook>) {
        self.hooks.push(hook);
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// True if no hooks are registered
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Fire `event` at every hook without waiting for them
    pub fn emit(&self, event: EventKind, uri: &str, data: Value, user: Option<User>) {
        if self.hooks.is_empty() {
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(%event, uri, "no async runtime, dropping notification");
                return;
            }
        };

        let notification = Arc::new(Notification {
            event,
            uri: uri.to_string(),
            data,
            user,
        });
        debug!(%event, uri, hooks = self.hooks.len(), "dispatching notification");

        for hook in &self.hooks {
            let hook = Arc::clone(hook);
            let notification = Arc::clone(&notification);
            runtime.spawn(async move {
                if let Err(e) = hook.handle(&notification).await {
                    error!(
                        event = %notification.event,
                        uri = %notification.uri,
                        error = %e,
                        "notification hook failed"
                    );
                }
            });
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
