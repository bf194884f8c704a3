//! Library target for the `webhook-patcher` binary.
//!
//! Exposes the modules so integration tests in `tests/` can drive the
//! pipeline against a fake API. The binary entry point is `src/main.rs`.

pub mod cli;
pub mod config;
pub mod error;
pub mod github;
pub mod logging;
pub mod model;
pub mod patcher;
pub mod rewrite;
