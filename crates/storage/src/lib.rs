//! Storage engines for Trellis
//!
//! This crate implements the `trellis_core::Storage` contract:
//! - MemoryStore: BTreeMap-based storage with RwLock and atomic batches
//!
//! Other engines plug in by implementing the same trait and are handed to the
//! engine builder as `Arc<dyn Storage>`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;

pub use memory::MemoryStore;
