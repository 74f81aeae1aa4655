//! Composition integration tests
//!
//! Write documents through the record services, read them back composed.

#[path = "../common/mod.rs"]
mod common;

mod hooks;
mod resolving;
mod splitting;
