//! Publishing integration tests
//!
//! Page publishing, URL history and redirects, page lifecycle and scheduling.

#[path = "../common/mod.rs"]
mod common;

mod lifecycle;
mod schedule;
