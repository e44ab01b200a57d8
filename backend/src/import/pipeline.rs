//! Batch orchestrator: decode, validate and create every row of an upload.
//!
//! # Example
//!
//! ```rust,ignore
//! use bulkload::{BulkImporter, EntityKind};
//! use bulkload::store::InMemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let importer = BulkImporter::new(Arc::new(InMemoryStore::new()));
//!     let result = importer.run(b"name,code\nNorth,N1\n", EntityKind::District).await?;
//!     println!("{} created, {} failed", result.summary.created_count, result.summary.failed_count);
//!     Ok(())
//! }
//! ```
//!
//! Rows are processed as independent units on a bounded pool of concurrent
//! tasks. Outcomes land in a slot vector indexed by decode position, so the
//! result is in ascending row order whatever order the backend answers in.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use uuid::Uuid;

use super::creator;
use crate::api::logs::ImportLog;
use crate::error::ImportResult;
use crate::models::{
    BatchResult, CheckOutcome, CheckResult, ColumnSpec, DisplayFields, EntityKind, RawRow,
    RowOutcome,
};
use crate::parser::{self, ParseResult};
use crate::schema;
use crate::store::EntityStore;
use crate::validation;

/// Default number of rows in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// How many failed rows are written to the log individually.
const LOGGED_FAILURES: usize = 10;

/// Runs bulk imports against one store.
#[derive(Clone)]
pub struct BulkImporter {
    store: Arc<dyn EntityStore>,
    concurrency: usize,
}

impl BulkImporter {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store, concurrency: DEFAULT_CONCURRENCY }
    }

    /// Set the number of rows processed concurrently (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Import every row of `bytes` as `kind`.
    ///
    /// Fails only when the file cannot be decoded; every decoded row yields
    /// exactly one outcome otherwise.
    pub async fn run(&self, bytes: &[u8], kind: EntityKind) -> ImportResult<BatchResult> {
        let log = ImportLog::new(Uuid::new_v4().to_string());
        tracing::debug!(import_id = log.import_id(), %kind, concurrency = self.concurrency, "import started");
        log.info(format!("Importing {} file ({} bytes)", kind.label(), bytes.len()));

        let parsed = decode_logged(&log, bytes, kind)?;
        log.info(format!(
            "Processing {} rows ({} at a time)",
            parsed.rows.len(),
            self.concurrency
        ));

        let outcomes = self.process_rows(parsed.rows, kind).await;
        let result = BatchResult::new(outcomes);
        log_outcomes(&log, &result);

        Ok(result)
    }

    /// Validate and create already-decoded rows.
    pub async fn process_rows(&self, rows: Vec<RawRow>, kind: EntityKind) -> Vec<RowOutcome> {
        let specs = schema::spec_for(kind);
        let store = self.store.as_ref();

        let mut slots: Vec<Option<RowOutcome>> = (0..rows.len()).map(|_| None).collect();
        let mut results = stream::iter(rows.into_iter().enumerate())
            .map(|(slot, row)| async move { (slot, process_row(store, &row, specs, kind).await) })
            .buffer_unordered(self.concurrency);

        while let Some((slot, outcome)) = results.next().await {
            slots[slot] = Some(outcome);
        }

        // buffer_unordered yields exactly one item per input, so every slot is filled.
        slots.into_iter().flatten().collect()
    }
}

/// Validate then, if clean, create one row.
pub async fn process_row(
    store: &dyn EntityStore,
    row: &RawRow,
    specs: &[ColumnSpec],
    kind: EntityKind,
) -> RowOutcome {
    let display = display_of(row, kind);

    let candidate = match validation::validate(row, specs, kind) {
        Ok(candidate) => candidate,
        Err(errors) => {
            return RowOutcome::Failed { row_number: row.row_number, display, errors };
        }
    };

    match creator::create(store, &candidate).await {
        Ok(entity_id) => RowOutcome::Created { row_number: row.row_number, entity_id, display },
        Err(errors) => RowOutcome::Failed { row_number: row.row_number, display, errors },
    }
}

/// Decode and validate only; nothing is written anywhere.
pub fn validate_only(bytes: &[u8], kind: EntityKind) -> ImportResult<CheckResult> {
    let log = ImportLog::new(Uuid::new_v4().to_string());
    let parsed = decode_logged(&log, bytes, kind)?;
    Ok(check_rows(&parsed.rows, kind))
}

/// Dry-run validation of decoded rows.
pub fn check_rows(rows: &[RawRow], kind: EntityKind) -> CheckResult {
    let specs = schema::spec_for(kind);
    let outcomes = rows
        .iter()
        .map(|row| {
            let display = display_of(row, kind);
            match validation::validate(row, specs, kind) {
                Ok(candidate) => CheckOutcome::Valid { row_number: row.row_number, display, candidate },
                Err(errors) => CheckOutcome::Invalid { row_number: row.row_number, display, errors },
            }
        })
        .collect();
    CheckResult::new(outcomes)
}

/// Raw values of the kind's display columns.
pub fn display_of(row: &RawRow, kind: EntityKind) -> DisplayFields {
    schema::display_fields(kind)
        .iter()
        .map(|name| (name.to_string(), row.get(name).to_string()))
        .collect()
}

fn decode_logged(log: &ImportLog, bytes: &[u8], kind: EntityKind) -> ImportResult<ParseResult> {
    let parsed = parser::decode_with_metadata(bytes, kind).map_err(|e| {
        log.error(format!("Upload rejected: {e}"));
        e
    })?;

    log.success(format!(
        "Decoded {} rows (encoding {}, delimiter '{}')",
        parsed.rows.len(),
        parsed.encoding,
        format_delimiter(parsed.delimiter)
    ));
    if !parsed.ignored_columns.is_empty() {
        log.warning(format!("Ignoring unknown columns: {}", parsed.ignored_columns.join(", ")));
    }
    Ok(parsed)
}

fn log_outcomes(log: &ImportLog, result: &BatchResult) {
    let failed: Vec<&RowOutcome> = result.outcomes.iter().filter(|o| !o.is_created()).collect();

    for outcome in failed.iter().take(LOGGED_FAILURES) {
        if let Some(errors) = outcome.errors() {
            let fields: Vec<&str> = errors.keys().map(String::as_str).collect();
            log.warning_indent(
                format!("Row {}: {}", outcome.row_number(), fields.join(", ")),
                1,
            );
        }
    }
    if failed.len() > LOGGED_FAILURES {
        log.warning_indent(format!("... +{} more failed rows", failed.len() - LOGGED_FAILURES), 1);
    }

    let summary = &result.summary;
    if summary.failed_count == 0 {
        log.success(format!("All {} rows created", summary.total_rows));
    } else {
        log.warning(format!(
            "{} of {} rows created, {} failed",
            summary.created_count, summary.total_rows, summary.failed_count
        ));
    }
}

/// Format delimiter for display
fn format_delimiter(d: char) -> &'static str {
    match d {
        ';' => ";",
        ',' => ",",
        '\t' => "TAB",
        '|' => "|",
        _ => "?",
    }
}
