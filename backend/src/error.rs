//! Error types for the bulk import pipeline.
//!
//! Two tiers exist and are kept apart on purpose:
//!
//! - Batch-fatal errors ([`DecodeError`], [`ImportError`]) abort a whole
//!   import before any row is processed.
//! - Row-scoped problems are never errors at all. They are carried as
//!   [`crate::models::FieldErrors`] inside a failed row outcome.
//!
//! [`StoreError`] sits between the two: it is what an entity store returns
//! for one create call, and the creator folds it into row errors.

use thiserror::Error;

use crate::models::FieldErrors;

// =============================================================================
// Decoder Errors (MalformedInput)
// =============================================================================

/// Structural problems with an uploaded file.
///
/// Every variant is a `MalformedInput` condition: the file cannot be turned
/// into rows at all, so no partial result is produced.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Failed to read the file from disk.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// The upload contains no bytes (or only whitespace).
    #[error("File is empty")]
    EmptyInput,

    /// The first line carries no column names.
    #[error("No header row found")]
    MissingHeader,

    /// Required columns are absent from the header.
    #[error("Missing required column(s): {}", columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    /// The bytes are not in an encoding we can decode.
    #[error("Unsupported text encoding: {0}")]
    UnsupportedEncoding(String),

    /// The bytes look like a binary file rather than delimited text.
    #[error("File is not delimited text")]
    BinaryContent,

    /// The CSV reader rejected the content.
    #[error("Invalid CSV at line {line}: {message}")]
    Parse { line: u64, message: String },
}

// =============================================================================
// Store Errors
// =============================================================================

/// Failure of a single create call against an entity store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// A referenced parent entity does not exist.
    #[error("{entity} not found (field '{field}')")]
    ParentNotFound { field: String, entity: String },

    /// A uniqueness constraint was violated.
    #[error("Conflict on field '{field}': {message}")]
    Conflict { field: String, message: String },

    /// The store answered with a structured field-error body.
    #[error("Rejected by backend: {0:?}")]
    Rejected(FieldErrors),

    /// The bearer token was missing or refused.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The request did not complete in time.
    #[error("Request timed out")]
    Timeout,

    /// The store could not be reached.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Any other backend failure, message kept verbatim.
    #[error("{0}")]
    Backend(String),
}

// =============================================================================
// Import Errors (batch-fatal)
// =============================================================================

/// Errors that abort a whole import call.
///
/// This is the only error type returned by
/// [`crate::import::BulkImporter::run`]; anything past decoding is row-scoped.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The file could not be decoded into rows.
    #[error("Malformed input: {0}")]
    MalformedInput(#[from] DecodeError),

    /// Authentication was missing or rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The backend could not be reached before the batch started.
    #[error("Backend unavailable: {0}")]
    Transport(String),
}

impl From<StoreError> for ImportError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unauthorized(msg) => ImportError::Unauthorized(msg),
            other => ImportError::Transport(other.to_string()),
        }
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue { var: String, value: String },

    /// A backend URL is required for this mode.
    #[error("No backend URL configured (set BULKLOAD_BACKEND_URL or pass --backend-url)")]
    MissingBackendUrl,

    /// A bearer token is required for this command.
    #[error("No bearer token configured (set BULKLOAD_TOKEN or pass --token)")]
    MissingToken,
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Failed to build the backend client.
    #[error("Backend client error: {0}")]
    Client(String),

    /// Socket or listener failure.
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Result type for store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for import calls.
pub type ImportResult<T> = Result<T, ImportError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
