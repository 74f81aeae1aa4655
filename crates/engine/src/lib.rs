//! Composition engine for Trellis
//!
//! This crate builds on the storage contract from `trellis-core`:
//! - Records: component/layout services composing the splitter and resolver
//! - Resolver: read-side expansion of reference fields
//! - Splitter: write-side decomposition of nested documents
//! - Pages: page writes, creation, composition and publishing
//! - Uris: public URL lookup through redirect chains
//! - Scheduler: time-triggered publishing
//!
//! The engine is the only component that knows about:
//! - Per-type hooks and URL rules
//! - Operation budgets
//! - Event notifications

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod engine;
pub mod hooks;
pub mod notify;
pub mod pages;
pub mod publish;
pub mod records;
pub mod resolver;
pub mod scheduler;
pub mod splitter;
pub mod timeout;
pub mod uris;

pub use config::{EngineConfig, SiteConfig, CONFIG_FILE_NAME};
pub use context::{RequestContext, User};
pub use engine::{Engine, EngineBuilder};
pub use hooks::{FormatHook, HookRegistry, RecordHooks, SaveOutcome};
pub use notify::{EventHook, EventKind, Notification, Notifier};
pub use pages::Pages;
pub use publish::{SlugRule, UrlRule};
pub use records::{RecordService, Records};
pub use resolver::resolve;
pub use scheduler::{ScheduleEntry, ScheduleService, Scheduler};
pub use splitter::{split, PendingWrite};
pub use uris::{UrlTarget, Uris, MAX_REDIRECTS};
