// ============================================================================
// Identity Core - Record Backend Port
// File: crates/identity-core/src/backend.rs
// ============================================================================
//! Backend trait (port) for hash-shaped records with TTL and single-key
//! transactions. Adapters live in `identity-infrastructure`.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;

/// Write condition for [`RecordBackend::set_field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Upsert: creates the record when missing.
    Any,
    /// Only write when the record is already present.
    MustExist,
}

/// Remaining lifetime of a record as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTtl {
    Missing,
    Persistent,
    Remaining(Duration),
}

/// Precondition checked on the key before a transaction writes anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxGuard {
    Unconditional,
    /// The key must not hold a record.
    Absent,
    /// The key must already hold a record.
    Present,
}

/// Result of [`RecordBackend::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Committed,
    /// The guard failed, or another client touched the key between the
    /// guard and the commit. Nothing was written.
    Conflict,
}

/// An all-or-nothing unit against a single key:
/// begin, guard, write fields, set expiration, commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub key: String,
    pub guard: TxGuard,
    pub fields: Vec<(String, String)>,
    pub expire: Option<Duration>,
}

impl Transaction {
    pub fn on(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            guard: TxGuard::Unconditional,
            fields: Vec::new(),
            expire: None,
        }
    }

    pub fn require_absent(mut self) -> Self {
        self.guard = TxGuard::Absent;
        self
    }

    pub fn require_present(mut self) -> Self {
        self.guard = TxGuard::Present;
        self
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }

    pub fn expire(mut self, ttl: Duration) -> Self {
        self.expire = Some(ttl);
        self
    }
}

/// Hash-oriented key-value primitives the store is built on.
///
/// Implementations are shared by every handle, so they must be safe for
/// concurrent use. None of them retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordBackend: Send + Sync {
    /// True iff a record is present for `key`, regardless of its fields.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// `None` when the field or the whole record is absent.
    async fn get_field(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Returns false when `presence` is `MustExist` and the record is absent.
    /// Never changes the record's TTL.
    async fn set_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
        presence: Presence,
    ) -> StoreResult<bool>;

    /// Returns false when the field was not present.
    async fn delete_field(&self, key: &str, field: &str) -> StoreResult<bool>;

    /// Returns false when the record was not present.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Sets or renews the TTL. Returns false when the record is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    async fn ttl(&self, key: &str) -> StoreResult<RecordTtl>;

    /// Applies the whole transaction or nothing. A TTL the backend cannot
    /// honour fails `ExpirationRejected` and leaves no record behind.
    async fn commit(&self, tx: Transaction) -> StoreResult<TxOutcome>;

    /// Releases the connection. Idempotent.
    async fn close(&self) -> StoreResult<()>;
}
