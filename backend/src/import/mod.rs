//! Import stages that touch the backend.
//!
//! - [`creator`] - Persist one validated candidate
//! - [`pipeline`] - Run a whole upload through decode, validate and create

pub mod creator;
pub mod pipeline;

pub use creator::{create, translate};
pub use pipeline::{check_rows, process_row, validate_only, BulkImporter, DEFAULT_CONCURRENCY};
