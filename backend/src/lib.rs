//! # Bulkload - Bulk entity import for the education admin console
//!
//! Bulkload takes a CSV of districts, schools, students, teachers or content
//! managers and creates one backend record per valid row, reporting every
//! row's outcome.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Decoder   │────▶│  Validator  │────▶│   Creator   │
//! │  (ISO/UTF8) │     │  (auto-enc) │     │ (per column)│     │ (REST/mem)  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                                                                    │
//!                                            BatchResult ◀───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bulkload::{BulkImporter, EntityKind};
//! use bulkload::store::{BearerToken, RestConfig, RestConnector, StoreConnector};
//!
//! #[tokio::main]
//! async fn main() {
//!     let connector = RestConnector::new(RestConfig::new("https://admin.example.org/api")).unwrap();
//!     let store = connector.connect(&BearerToken::new("token")).await.unwrap();
//!     let bytes = std::fs::read("schools.csv").unwrap();
//!     let result = BulkImporter::new(store).run(&bytes, EntityKind::School).await.unwrap();
//!     println!("Created {} of {} rows", result.summary.created_count, result.summary.total_rows);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Domain models (EntityKind, ColumnSpec, Candidate, RowOutcome)
//! - [`schema`] - Column contract per entity kind
//! - [`parser`] - CSV decoding with auto-detection
//! - [`validation`] - Per-row column validation
//! - [`store`] - Backend and in-memory entity stores
//! - [`import`] - Entity creation and batch orchestration
//! - [`config`] - Environment configuration
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Schema registry
pub mod schema;

// Decoding
pub mod parser;

// Validation
pub mod validation;

// Persistence
pub mod store;

// Orchestration
pub mod import;

// Configuration
pub mod config;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    DecodeError,
    ImportError,
    ServerError,
    StoreError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    BatchResult,
    BatchSummary,
    Candidate,
    CheckOutcome,
    CheckResult,
    ColumnKind,
    ColumnSpec,
    EntityId,
    EntityKind,
    FieldErrors,
    RawRow,
    RowOutcome,
};

// =============================================================================
// Re-exports - CSV Decoding
// =============================================================================

pub use parser::{
    decode,
    decode_file,
    decode_with_metadata,
    detect_delimiter,
    detect_encoding,
    ParseResult,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{validate, validate_row};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use import::{validate_only, BulkImporter};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{
    CheckResponse,
    ColumnInfo,
    RowResult,
    RowStatus,
    UploadResponse,
    error_response,
};

// Server
pub mod server {
    pub use crate::api::server::{build_router, start_server, AppState};
}
