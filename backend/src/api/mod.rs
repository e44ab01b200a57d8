//! HTTP API module.
//!
//! This module provides the HTTP server, response types and the import log
//! feed for the bulkload backend.

pub mod server;
pub mod types;
pub mod logs;

pub use server::{build_router, start_server, AppState};
pub use types::*;
pub use logs::*;
