//! Trellis - composition and persistence engine for component-based content
//!
//! Content is a graph of addressable records (components, layouts, pages)
//! that point at each other by address. Trellis splits nested documents into
//! flat records on write, composes them back on read, keeps versions
//! consistent across a referenced subgraph, and publishes pages to public
//! URLs.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use trellis::{Engine, MemoryStore, SlugRule};
//!
//! let engine = Engine::builder()
//!     .storage(Arc::new(MemoryStore::new()))
//!     .url_rule(Arc::new(SlugRule::default()))
//!     .build()?;
//! let ctx = engine.context();
//!
//! engine
//!     .components()
//!     .put_and_commit("localhost/components/text/instances/1", json!({"text": "hi"}), &ctx)
//!     .await?;
//! ```
//!
//! # Architecture
//!
//! - `trellis-core`: addresses, reference walking, errors, the storage contract
//! - `trellis-storage`: the in-memory storage engine
//! - `trellis-engine`: record services, publishing, scheduling

pub use trellis_core::*;
pub use trellis_engine::*;
pub use trellis_storage::MemoryStore;
