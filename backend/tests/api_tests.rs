use bulkload::config::AppConfig;
use bulkload::server::{build_router, AppState};
use bulkload::store::{InMemoryStore, MemoryConnector};
use bulkload::{EntityKind, UploadResponse};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::sync::Arc;

const TOKEN: &str = "console-session-token";

fn memory_state(max_upload_bytes: usize) -> (AppState, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new().with_existing(EntityKind::District, [4]));
    let connector = MemoryConnector::new(store.clone()).with_tokens([TOKEN]);
    let config = AppConfig { max_upload_bytes, concurrency: 4, ..AppConfig::default() };
    (AppState::new(Arc::new(connector), &config), store)
}

/// Spin up the HTTP server on an OS-assigned port, returning the base URL.
async fn spawn_test_server(state: AppState) -> String {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}

async fn default_server() -> (String, Arc<InMemoryStore>) {
    let (state, store) = memory_state(10 * 1024 * 1024);
    (spawn_test_server(state).await, store)
}

fn csv_form(file_name: &str, content: &str) -> Form {
    Form::new().part("file", Part::bytes(content.as_bytes().to_vec()).file_name(file_name.to_string()))
}

async fn upload(base: &str, kind: &str, form: Form, token: Option<&str>) -> reqwest::Response {
    let mut request = reqwest::Client::new()
        .post(format!("{}/api/{}/bulk-upload", base, kind))
        .multipart(form);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    request.send().await.unwrap()
}

#[tokio::test]
async fn health_endpoint_lists_kinds() {
    let (base, _) = default_server().await;
    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["kinds"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn template_download_matches_column_order() {
    let (base, _) = default_server().await;
    let resp = reqwest::Client::new()
        .get(format!("{}/api/district/bulk-template", base))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("text/csv"));
    let disposition = resp.headers().get("content-disposition").unwrap().to_str().unwrap();
    assert!(disposition.contains("district_bulk_template.csv"));

    let body = resp.text().await.unwrap();
    assert_eq!(body, "name,code,state,contact_email,contact_phone\n");
}

#[tokio::test]
async fn columns_endpoint_describes_references() {
    let (base, _) = default_server().await;
    let resp = reqwest::Client::new()
        .get(format!("{}/api/schools/columns", base))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let columns: Vec<Value> = resp.json().await.unwrap();
    let district = columns.iter().find(|c| c["name"] == "district").unwrap();
    assert_eq!(district["required"], true);
    assert_eq!(district["references"], "district");
}

#[tokio::test]
async fn missing_token_returns_401() {
    let (base, store) = default_server().await;
    let resp = upload(&base, "school", csv_form("schools.csv", "name,district\nA,4\n"), None).await;

    assert_eq!(resp.status(), 401);
    assert_eq!(store.created(EntityKind::School).len(), 0);
}

#[tokio::test]
async fn rejected_token_returns_401() {
    let (base, store) = default_server().await;
    let resp = upload(&base, "school", csv_form("schools.csv", "name,district\nA,4\n"), Some("stale")).await;

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(store.created(EntityKind::School).len(), 0);
}

#[tokio::test]
async fn unknown_kind_returns_404() {
    let (base, _) = default_server().await;
    let resp = upload(&base, "courses", csv_form("courses.csv", "name\nA\n"), Some(TOKEN)).await;

    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn upload_reports_every_row() {
    let (base, store) = default_server().await;
    let csv = "name,district\nLincoln High,4\n,4\nGhost School,9999\n";
    let resp = upload(&base, "school", csv_form("schools.csv", csv), Some(TOKEN)).await;

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();

    assert_eq!(body["summary"]["total_rows"], 3);
    assert_eq!(body["summary"]["created"], 1);
    assert_eq!(body["summary"]["failed"], 2);

    let results = body["results"].as_array().unwrap();
    assert_eq!(results[0]["row"], 1);
    assert_eq!(results[0]["status"], "created");
    assert_eq!(results[0]["name"], "Lincoln High");
    assert!(results[0].get("errors").is_none());

    assert_eq!(results[1]["status"], "error");
    assert_eq!(results[1]["errors"]["name"][0], "Name is required.");
    assert_eq!(results[2]["errors"]["district"][0], "District not found.");

    assert_eq!(store.created(EntityKind::School).len(), 1);
}

#[tokio::test]
async fn upload_response_deserializes() {
    let (base, _) = default_server().await;
    let csv = "first_name,last_name,email,school\nAda,Lovelace,ada@example.org,1\n";
    let resp = upload(&base, "teacher", csv_form("teachers.csv", csv), Some(TOKEN)).await;

    let body: UploadResponse = resp.json().await.unwrap();
    assert_eq!(body.summary.total_rows, 1);
    assert_eq!(body.results[0].fields["email"], "ada@example.org");
    // School 1 was never seeded
    assert_eq!(body.summary.failed, 1);
}

#[tokio::test]
async fn missing_required_column_returns_400() {
    let (base, store) = default_server().await;
    let resp = upload(&base, "school", csv_form("schools.csv", "title\nA\n"), Some(TOKEN)).await;

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert!(body["error"].as_str().unwrap().contains("name"));
    assert_eq!(store.created(EntityKind::School).len(), 0);
}

#[tokio::test]
async fn non_csv_extension_returns_400() {
    let (base, _) = default_server().await;
    let resp = upload(&base, "district", csv_form("districts.xlsx", "name,code\nA,B\n"), Some(TOKEN)).await;

    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn missing_file_field_returns_400() {
    let (base, _) = default_server().await;
    let form = Form::new().text("comment", "no file here");
    let resp = upload(&base, "district", form, Some(TOKEN)).await;

    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn oversized_file_returns_413() {
    let (state, store) = memory_state(64);
    let base = spawn_test_server(state).await;

    let mut csv = String::from("name,code\n");
    for n in 0..20 {
        csv.push_str(&format!("District {n},D{n}\n"));
    }
    let resp = upload(&base, "district", csv_form("districts.csv", &csv), Some(TOKEN)).await;

    assert_eq!(resp.status(), 413);
    assert_eq!(store.created(EntityKind::District).len(), 0);
}
