//! REST client for the admin backend's single-create endpoints.
//!
//! Each candidate is POSTed as JSON to `<base_url>/<collection>/` with the
//! caller's bearer token. Failure bodies are mapped onto [`StoreError`] so the
//! creator can attribute them to fields.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bulkload::store::{RestConfig, RestConnector, StoreConnector, BearerToken};
//!
//! let connector = RestConnector::new(RestConfig::new("https://admin.example.org/api"))?;
//! let store = connector.connect(&BearerToken::new(token)).await?;
//! let id = store.create(&candidate).await?;
//! ```

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::{BearerToken, EntityStore, StoreConnector};
use crate::error::{StoreError, StoreResult};
use crate::models::{Candidate, EntityId, EntityKind, FieldErrors, GENERAL_FIELD};
use crate::schema;

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of retries for requests that never reached the backend.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Delay between retries in milliseconds
const RETRY_DELAY_MS: u64 = 500;

/// Keys that carry a whole-request message rather than a field error.
const DETAIL_KEYS: [&str; 3] = ["detail", "message", "error"];

/// Backend connection settings.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// API root, e.g. `https://admin.example.org/api`.
    pub base_url: String,
    /// Path used to verify a token, relative to `base_url`.
    pub auth_check_path: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries for connection failures only.
    pub max_retries: u32,
    /// Delay between those retries.
    pub retry_delay: Duration,
}

impl RestConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_check_path: "/auth/me/".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }

    /// Set the token verification path
    pub fn with_auth_check_path(mut self, path: &str) -> Self {
        self.auth_check_path = path.to_string();
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set max retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Builds [`RestStore`]s for verified tokens.
#[derive(Clone)]
pub struct RestConnector {
    client: reqwest::Client,
    config: Arc<RestConfig>,
}

impl RestConnector {
    pub fn new(config: RestConfig) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self { client, config: Arc::new(config) })
    }

    /// Store for a token without checking it first.
    pub fn store_for(&self, token: &BearerToken) -> RestStore {
        RestStore {
            client: self.client.clone(),
            config: Arc::clone(&self.config),
            token: token.clone(),
        }
    }
}

#[async_trait]
impl StoreConnector for RestConnector {
    async fn connect(&self, token: &BearerToken) -> StoreResult<Arc<dyn EntityStore>> {
        let store = self.store_for(token);
        let url = self.config.url(&self.config.auth_check_path);

        let response = store
            .send_with_retry(|| store.client.get(&url).bearer_auth(store.token.as_str()))
            .await?;
        let status = response.status();

        if status.is_success() {
            return Ok(Arc::new(store));
        }
        tracing::debug!(%status, "token check refused");
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StoreError::Unauthorized(
                "token rejected by backend".to_string(),
            )),
            other => Err(StoreError::Transport(format!("token check failed: HTTP {other}"))),
        }
    }
}

/// Entity store backed by the admin REST API.
#[derive(Clone)]
pub struct RestStore {
    client: reqwest::Client,
    config: Arc<RestConfig>,
    token: BearerToken,
}

impl RestStore {
    /// Send a request, retrying only when the connection could not be made.
    ///
    /// A request that reached the backend is never repeated, so a create is
    /// attempted at most once server-side.
    async fn send_with_retry<F>(&self, build: F) -> StoreResult<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            match build().send().await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_connect() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max = self.config.max_retries,
                        "backend connection failed, retrying: {e}"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(map_reqwest_error(e)),
            }
        }
    }
}

#[async_trait]
impl EntityStore for RestStore {
    async fn create(&self, candidate: &Candidate) -> StoreResult<EntityId> {
        let kind = candidate.kind();
        let url = self.config.url(&format!("{}/", kind.collection()));

        let response = self
            .send_with_retry(|| {
                self.client
                    .post(&url)
                    .bearer_auth(self.token.as_str())
                    .json(candidate)
            })
            .await?;

        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;

        if !status.is_success() {
            return Err(interpret_failure(kind, status, &body));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| StoreError::Backend(format!("Invalid JSON from backend: {e}")))?;
        value
            .get("id")
            .and_then(|id| id.as_i64().or_else(|| id.as_str().and_then(|s| s.parse().ok())))
            .ok_or_else(|| StoreError::Backend("Backend response did not include an id".to_string()))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Transport(e.to_string())
    }
}

/// Map a non-2xx create response onto a [`StoreError`].
pub fn interpret_failure(kind: EntityKind, status: StatusCode, body: &str) -> StoreError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let detail = parsed.as_ref().and_then(detail_message);
    let field_errors = parsed.as_ref().map(parse_field_errors).unwrap_or_default();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StoreError::Unauthorized(detail.unwrap_or_else(|| status.to_string()))
        }
        StatusCode::NOT_FOUND => match schema::reference_column(kind) {
            Some((field, parent)) => StoreError::ParentNotFound {
                field: field.to_string(),
                entity: parent.label().to_string(),
            },
            None => StoreError::Backend(detail.unwrap_or_else(|| "Not found".to_string())),
        },
        StatusCode::CONFLICT if field_errors.is_empty() => StoreError::Conflict {
            field: schema::natural_key(kind).to_string(),
            message: detail.unwrap_or_else(|| {
                format!("{} with this {} already exists.", kind.label(), schema::natural_key(kind))
            }),
        },
        s if s.is_client_error() && !field_errors.is_empty() => StoreError::Rejected(field_errors),
        _ => StoreError::Backend(detail.unwrap_or_else(|| {
            let snippet: String = body.chars().take(200).collect();
            format!("HTTP {status}: {snippet}")
        })),
    }
}

/// Top-level `detail` / `message` / `error` string, if present.
fn detail_message(body: &Value) -> Option<String> {
    let obj = body.as_object()?;
    DETAIL_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Read a `{field: [msg, ...]}` or `{field: msg}` body.
fn parse_field_errors(body: &Value) -> FieldErrors {
    let mut errors = FieldErrors::new();

    match body {
        Value::Object(obj) => {
            for (key, value) in obj {
                if DETAIL_KEYS.contains(&key.as_str()) {
                    continue;
                }
                let field = if key == "non_field_errors" { GENERAL_FIELD } else { key.as_str() };
                let messages = messages_of(value);
                if !messages.is_empty() {
                    errors.entry(field.to_string()).or_default().extend(messages);
                }
            }
        }
        Value::Array(_) => {
            let messages = messages_of(body);
            if !messages.is_empty() {
                errors.insert(GENERAL_FIELD.to_string(), messages);
            }
        }
        _ => {}
    }

    errors
}

fn messages_of(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::Null => vec![],
        other => vec![other.to_string()],
    }
}
