//! Entity stores: where validated candidates are persisted.
//!
//! The pipeline talks to storage only through [`EntityStore`]. A
//! [`StoreConnector`] turns a caller's bearer token into a store handle,
//! refusing bad tokens before any row is looked at.
//!
//! - [`rest::RestStore`] - the admin REST backend (production)
//! - [`memory::InMemoryStore`] - in-process store for local runs and tests

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::StoreResult;
use crate::models::{Candidate, EntityId};

pub use memory::{InMemoryStore, MemoryConnector};
pub use rest::{RestConfig, RestConnector, RestStore};

/// Single-record creation for every entity kind.
///
/// Implementations must be safe to call concurrently, including for several
/// records that reference the same parent.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Persist one candidate, returning the backend's id for it.
    async fn create(&self, candidate: &Candidate) -> StoreResult<EntityId>;
}

/// Opens an [`EntityStore`] on behalf of an authenticated caller.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Verify `token` and return a store acting with it.
    async fn connect(&self, token: &BearerToken) -> StoreResult<Arc<dyn EntityStore>>;
}

/// Opaque bearer credential supplied by the session layer.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Parse an `Authorization` header value (`Bearer <token>`).
    pub fn from_header(value: &str) -> Option<Self> {
        let (scheme, token) = value.trim().split_once(' ')?;
        let token = token.trim();
        if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
            return None;
        }
        Some(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}
