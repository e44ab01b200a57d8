//! In-process entity store.
//!
//! Enforces the same parent-existence and uniqueness rules the admin backend
//! applies, without any network. Used by `serve --memory` and by tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{BearerToken, EntityStore, StoreConnector};
use crate::error::{StoreError, StoreResult};
use crate::models::{Candidate, EntityId, EntityKind};

#[derive(Default)]
struct MemoryState {
    next_id: EntityId,
    ids: HashMap<EntityKind, BTreeMap<EntityId, Option<Candidate>>>,
    unique_keys: HashSet<(EntityKind, String)>,
}

/// Thread-safe store keeping every created record in memory.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate backend latency on every create.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register ids that already exist for `kind` (e.g. parent districts).
    pub fn with_existing(self, kind: EntityKind, ids: impl IntoIterator<Item = EntityId>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            let table = state.ids.entry(kind).or_default();
            for id in ids {
                table.insert(id, None);
            }
            let max_id = state.ids.values().filter_map(|t| t.keys().last()).max().copied();
            state.next_id = state.next_id.max(max_id.unwrap_or(0));
        }
        self
    }

    /// Records created through [`EntityStore::create`], by id.
    pub fn created(&self, kind: EntityKind) -> Vec<(EntityId, Candidate)> {
        let Ok(state) = self.state.lock() else {
            return Vec::new();
        };
        state
            .ids
            .get(&kind)
            .map(|table| {
                table
                    .iter()
                    .filter_map(|(id, c)| c.clone().map(|c| (*id, c)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of known ids for `kind`, seeded ones included.
    pub fn count(&self, kind: EntityKind) -> usize {
        self.state
            .lock()
            .map(|s| s.ids.get(&kind).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    fn insert(&self, candidate: &Candidate) -> StoreResult<EntityId> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))?;
        let kind = candidate.kind();

        if let Some((field, parent, parent_id)) = candidate.parent() {
            let exists = state.ids.get(&parent).is_some_and(|t| t.contains_key(&parent_id));
            if !exists {
                return Err(StoreError::ParentNotFound {
                    field: field.to_string(),
                    entity: parent.label().to_string(),
                });
            }
        }

        let unique = unique_key(candidate);
        if let Some((field, ref key, ref message)) = unique {
            if state.unique_keys.contains(&(kind, key.clone())) {
                return Err(StoreError::Conflict {
                    field: field.to_string(),
                    message: message.clone(),
                });
            }
        }

        state.next_id += 1;
        let id = state.next_id;
        state.ids.entry(kind).or_default().insert(id, Some(candidate.clone()));
        if let Some((_, key, _)) = unique {
            state.unique_keys.insert((kind, key));
        }
        Ok(id)
    }
}

/// (field, normalized key, conflict message) for kinds with a natural key.
fn unique_key(candidate: &Candidate) -> Option<(&'static str, String, String)> {
    match candidate {
        Candidate::District(d) => Some((
            "code",
            d.code.to_lowercase(),
            "District with this code already exists.".to_string(),
        )),
        Candidate::School(s) => Some((
            "name",
            format!("{}/{}", s.district, s.name.to_lowercase()),
            "School with this name already exists in the district.".to_string(),
        )),
        Candidate::Student(s) => s.email.as_ref().map(|email| {
            (
                "email",
                email.to_lowercase(),
                "Student with this email already exists.".to_string(),
            )
        }),
        Candidate::Teacher(t) => Some((
            "email",
            t.email.to_lowercase(),
            "Teacher with this email already exists.".to_string(),
        )),
        Candidate::ContentManager(c) => Some((
            "email",
            c.email.to_lowercase(),
            "Content manager with this email already exists.".to_string(),
        )),
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn create(&self, candidate: &Candidate) -> StoreResult<EntityId> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.insert(candidate)
    }
}

/// Connector handing out one shared [`InMemoryStore`].
pub struct MemoryConnector {
    store: Arc<InMemoryStore>,
    accepted_tokens: Option<HashSet<String>>,
}

impl MemoryConnector {
    /// Accept any non-empty token.
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store, accepted_tokens: None }
    }

    /// Accept only the listed tokens.
    pub fn with_tokens(mut self, tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.accepted_tokens = Some(tokens.into_iter().map(Into::into).collect());
        self
    }

    pub fn store(&self) -> Arc<InMemoryStore> {
        Arc::clone(&self.store)
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self, token: &BearerToken) -> StoreResult<Arc<dyn EntityStore>> {
        let accepted = match &self.accepted_tokens {
            Some(tokens) => tokens.contains(token.as_str()),
            None => !token.as_str().is_empty(),
        };
        if !accepted {
            return Err(StoreError::Unauthorized("token rejected".to_string()));
        }
        let store: Arc<dyn EntityStore> = self.store.clone();
        Ok(store)
    }
}
