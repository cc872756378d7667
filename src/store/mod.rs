//! User store contract.
//!
//! The protocol core only ever talks to persistence through this narrow
//! interface: records keyed by `(id, kind)` with create/get/update/delete.
//! `update` can be made conditional on a version so that single-use values
//! (the signin challenge) cannot be consumed twice under concurrent load.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Record kinds stored per user: the primary record keyed by the generated
/// user id, and the username lookup record keyed by the chosen username.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    User,
    UsernameLookup,
}

impl RecordKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::UsernameLookup => "username",
        }
    }
}

/// A stored record. The payload is opaque JSON; the version starts at 1 and
/// is bumped by the store on every update.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub kind: RecordKind,
    pub version: i64,
    pub payload: Value,
}

impl Record {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: RecordKind, payload: Value) -> Self {
        Self {
            id: id.into(),
            kind,
            version: 1,
            payload,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists")]
    AlreadyExists,
    #[error("record not found")]
    NotFound,
    #[error("version conflict")]
    Conflict,
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Narrow persistence contract the authentication core depends on.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, id: &str, kind: RecordKind) -> Result<Option<Record>, StoreError>;

    /// Fails with [`StoreError::AlreadyExists`] if a record is already stored
    /// under `(record.id, record.kind)`.
    async fn create(&self, record: Record) -> Result<(), StoreError>;

    /// Replaces the payload stored under `(id, kind)` and bumps the version.
    ///
    /// When `expected_version` is given the write only happens if the stored
    /// version still matches; otherwise [`StoreError::Conflict`] is returned.
    /// This is the serialization point for single-use challenge consumption.
    async fn update(
        &self,
        id: &str,
        kind: RecordKind,
        payload: Value,
        expected_version: Option<i64>,
    ) -> Result<Record, StoreError>;

    async fn delete(&self, id: &str, kind: RecordKind) -> Result<(), StoreError>;

    /// Liveness probe for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}
