use async_trait::async_trait;
use bulkload::error::StoreResult;
use bulkload::models::{DisplayFields, GENERAL_FIELD};
use bulkload::store::{EntityStore, InMemoryStore};
use bulkload::{BulkImporter, Candidate, EntityId, EntityKind, FieldErrors, ImportError, RowOutcome, StoreError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counts calls and delegates to an in-memory store.
struct CountingStore {
    inner: InMemoryStore,
    calls: AtomicUsize,
}

impl CountingStore {
    fn new(inner: InMemoryStore) -> Self {
        Self { inner, calls: AtomicUsize::new(0) }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityStore for CountingStore {
    async fn create(&self, candidate: &Candidate) -> StoreResult<EntityId> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create(candidate).await
    }
}

/// Answers earlier rows last, so completion order is the reverse of row order.
struct ReversedLatencyStore {
    inner: InMemoryStore,
}

#[async_trait]
impl EntityStore for ReversedLatencyStore {
    async fn create(&self, candidate: &Candidate) -> StoreResult<EntityId> {
        if let Candidate::District(d) = candidate {
            let n: u64 = d.code.trim_start_matches('D').parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(n * 2))).await;
        }
        self.inner.create(candidate).await
    }
}

/// Always fails with a backend error.
struct BrokenStore;

#[async_trait]
impl EntityStore for BrokenStore {
    async fn create(&self, _candidate: &Candidate) -> StoreResult<EntityId> {
        Err(StoreError::Backend("database is locked".to_string()))
    }
}

fn district_csv(rows: usize) -> String {
    let mut csv = String::from("name,code,contact_email\n");
    for n in 1..=rows {
        if n % 4 == 0 {
            csv.push_str(&format!("District {n},D{n},not-an-email\n"));
        } else {
            csv.push_str(&format!("District {n},D{n},\n"));
        }
    }
    csv
}

/// Outcome without the backend-assigned id.
fn comparable(outcome: &RowOutcome) -> (usize, bool, DisplayFields, Option<FieldErrors>) {
    (
        outcome.row_number(),
        outcome.is_created(),
        match outcome {
            RowOutcome::Created { display, .. } | RowOutcome::Failed { display, .. } => display.clone(),
        },
        outcome.errors().cloned(),
    )
}

#[tokio::test]
async fn school_upload_reports_each_row() {
    let store = Arc::new(InMemoryStore::new().with_existing(EntityKind::District, [4]));
    let importer = BulkImporter::new(store.clone());
    let csv = "name,district\nLincoln High,4\n,4\nGhost School,9999\n";

    let result = importer.run(csv.as_bytes(), EntityKind::School).await.unwrap();

    assert_eq!(result.summary.total_rows, 3);
    assert_eq!(result.summary.created_count, 1);
    assert_eq!(result.summary.failed_count, 2);

    let rows: Vec<usize> = result.outcomes.iter().map(RowOutcome::row_number).collect();
    assert_eq!(rows, vec![1, 2, 3]);

    assert!(result.outcomes[0].is_created());
    assert!(result.outcomes[1].errors().unwrap().contains_key("name"));
    assert!(result.outcomes[2].errors().unwrap().contains_key("district"));
}

#[tokio::test]
async fn invalid_enum_never_reaches_creator() {
    let store = Arc::new(CountingStore::new(
        InMemoryStore::new().with_existing(EntityKind::District, [4]),
    ));
    let importer = BulkImporter::new(store.clone());
    let csv = "name,district,status\nLincoln High,4,Foo\nWest High,4,PENDING\n";

    let result = importer.run(csv.as_bytes(), EntityKind::School).await.unwrap();

    assert_eq!(store.calls(), 1);
    assert_eq!(result.summary.created_count, 1);
    let status_errors = &result.outcomes[0].errors().unwrap()["status"];
    assert_eq!(
        status_errors,
        &vec!["'Foo' is not a valid choice. Accepted values: APPROVED, PENDING.".to_string()]
    );
}

#[tokio::test]
async fn missing_required_column_fails_whole_batch() {
    let store = Arc::new(CountingStore::new(InMemoryStore::new()));
    let importer = BulkImporter::new(store.clone());

    let err = importer
        .run(b"first_name,email\nAda,ada@example.org\n", EntityKind::Teacher)
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::MalformedInput(_)));
    assert!(err.to_string().contains("last_name"));
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn outcomes_sorted_despite_completion_order() {
    let store = Arc::new(ReversedLatencyStore { inner: InMemoryStore::new() });
    let importer = BulkImporter::new(store).with_concurrency(8);

    let result = importer.run(district_csv(16).as_bytes(), EntityKind::District).await.unwrap();

    let rows: Vec<usize> = result.outcomes.iter().map(RowOutcome::row_number).collect();
    assert_eq!(rows, (1..=16).collect::<Vec<_>>());
}

#[tokio::test]
async fn concurrent_and_sequential_runs_agree() {
    let csv = district_csv(20);

    let concurrent = BulkImporter::new(Arc::new(InMemoryStore::new().with_latency(Duration::from_millis(2))))
        .with_concurrency(8)
        .run(csv.as_bytes(), EntityKind::District)
        .await
        .unwrap();
    let sequential = BulkImporter::new(Arc::new(InMemoryStore::new()))
        .with_concurrency(1)
        .run(csv.as_bytes(), EntityKind::District)
        .await
        .unwrap();

    assert_eq!(concurrent.summary, sequential.summary);
    let a: Vec<_> = concurrent.outcomes.iter().map(comparable).collect();
    let b: Vec<_> = sequential.outcomes.iter().map(comparable).collect();
    assert_eq!(a, b);
}

#[tokio::test]
async fn summary_counts_always_balance() {
    let store = Arc::new(InMemoryStore::new());
    let result = BulkImporter::new(store)
        .run(district_csv(12).as_bytes(), EntityKind::District)
        .await
        .unwrap();

    let summary = result.summary;
    assert_eq!(summary.created_count + summary.failed_count, summary.total_rows);
    assert_eq!(result.outcomes.len(), summary.total_rows);
    assert_eq!(summary.failed_count, 3);
    for outcome in &result.outcomes {
        assert_eq!(outcome.errors().is_some(), !outcome.is_created());
    }
}

#[tokio::test]
async fn multiple_violations_reported_together() {
    let store = Arc::new(CountingStore::new(InMemoryStore::new()));
    let csv = "first_name,last_name,school,grade,date_of_birth\n,Smith,abc,13,2010-02-30\n";

    let result = BulkImporter::new(store.clone()).run(csv.as_bytes(), EntityKind::Student).await.unwrap();

    let errors = result.outcomes[0].errors().unwrap();
    for field in ["first_name", "school", "grade", "date_of_birth"] {
        assert!(errors.contains_key(field), "missing error for {field}");
    }
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn duplicate_key_in_same_file_fails_second_row() {
    let store = Arc::new(InMemoryStore::new());
    let csv = "name,code\nNorth,N1\nNorth again,N1\n";

    let result = BulkImporter::new(store).with_concurrency(1).run(csv.as_bytes(), EntityKind::District).await.unwrap();

    assert!(result.outcomes[0].is_created());
    assert_eq!(
        result.outcomes[1].errors().unwrap()["code"],
        vec!["District with this code already exists.".to_string()]
    );
}

#[tokio::test]
async fn store_failure_is_row_scoped() {
    let result = BulkImporter::new(Arc::new(BrokenStore))
        .run(b"name,code\nNorth,N1\nSouth,S1\n", EntityKind::District)
        .await
        .unwrap();

    assert_eq!(result.summary.failed_count, 2);
    for outcome in &result.outcomes {
        assert_eq!(outcome.errors().unwrap()[GENERAL_FIELD], vec!["database is locked".to_string()]);
    }
}

#[tokio::test]
async fn blank_lines_keep_physical_row_numbers() {
    let store = Arc::new(InMemoryStore::new());
    let csv = "name,code\nNorth,N1\n\n,S1\n";

    let result = BulkImporter::new(store).run(csv.as_bytes(), EntityKind::District).await.unwrap();

    assert_eq!(result.summary.total_rows, 2);
    assert_eq!(result.outcomes[1].row_number(), 3);
    assert!(result.outcomes[1].errors().unwrap().contains_key("name"));
}
