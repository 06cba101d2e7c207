// ============================================================================
// Identity Infrastructure - In-Memory Record Backend
// File: crates/identity-infrastructure/src/memory/store.rs
// ============================================================================
//! DashMap-backed implementation of `RecordBackend`.
//!
//! Expired records are dropped lazily on access, the same way a real
//! key-value server reports them as absent. The clock is `tokio::time`, so
//! paused-time tests can move past a TTL with `tokio::time::advance`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use identity_core::{
    Presence, RecordBackend, RecordTtl, StoreError, StoreResult, Transaction, TxGuard, TxOutcome,
};

use super::entry::Record;

/// Points inside `commit` where an injected fault can abort the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStep {
    Guard,
    WriteFields,
    Expire,
}

pub struct MemoryBackend {
    map: DashMap<String, Record>,
    closed: AtomicBool,
    fault: Mutex<Option<TxStep>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            map: DashMap::new(),
            closed: AtomicBool::new(false),
            fault: Mutex::new(None),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aborts the next `commit` right after `step`. One-shot.
    pub fn fail_transaction_after(&self, step: TxStep) {
        *self.fault.lock() = Some(step);
    }

    /// Number of stored records, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drops every expired record. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let start_len = self.map.len();
        self.map.retain(|_, record| !record.is_expired(now));
        let count = start_len.saturating_sub(self.map.len());
        if count > 0 {
            debug!("Purged {} expired records", count);
        }
        count
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::BackendUnavailable("memory backend closed".into()));
        }
        Ok(())
    }

    /// Runs `f` on the live record under `key`, evicting it first if expired.
    fn with_live<R>(&self, key: &str, f: impl FnOnce(&mut Record) -> R) -> Option<R> {
        let now = Instant::now();
        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_expired(now) {
                    slot.remove();
                    None
                } else {
                    Some(f(slot.get_mut()))
                }
            }
            Entry::Vacant(_) => None,
        }
    }

    fn deadline(key: &str, now: Instant, ttl: Duration) -> StoreResult<Instant> {
        now.checked_add(ttl).ok_or_else(|| StoreError::ExpirationRejected {
            key: key.to_string(),
            reason: format!("ttl {:?} is out of range", ttl),
        })
    }

    fn check_fault(&self, key: &str, step: TxStep, armed: Option<TxStep>) -> StoreResult<()> {
        if armed == Some(step) {
            warn!("Injected fault after {:?} on {}", step, key);
            return Err(StoreError::TransactionFailed {
                key: key.to_string(),
                reason: format!("aborted after {:?}", step),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordBackend for MemoryBackend {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        Ok(self.with_live(key, |_| ()).is_some())
    }

    async fn get_field(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.ensure_open()?;
        Ok(self
            .with_live(key, |record| record.fields.get(field).cloned())
            .flatten())
    }

    async fn set_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
        presence: Presence,
    ) -> StoreResult<bool> {
        self.ensure_open()?;
        let now = Instant::now();
        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_expired(now) {
                    if presence == Presence::MustExist {
                        slot.remove();
                        return Ok(false);
                    }
                    // An expired key is gone; HSET starts a fresh, persistent one.
                    slot.insert(Record::default());
                }
                slot.get_mut().fields.insert(field.to_string(), value.to_string());
                Ok(true)
            }
            Entry::Vacant(slot) => {
                if presence == Presence::MustExist {
                    return Ok(false);
                }
                let mut record = Record::default();
                record.fields.insert(field.to_string(), value.to_string());
                slot.insert(record);
                Ok(true)
            }
        }
    }

    async fn delete_field(&self, key: &str, field: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        let removed = self
            .with_live(key, |record| record.fields.remove(field).is_some())
            .unwrap_or(false);
        // A hash without fields does not exist.
        self.map.remove_if(key, |_, record| record.fields.is_empty());
        Ok(removed)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        let now = Instant::now();
        Ok(self
            .map
            .remove(key)
            .map(|(_, record)| !record.is_expired(now))
            .unwrap_or(false))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.ensure_open()?;
        let deadline = Self::deadline(key, Instant::now(), ttl)?;
        Ok(self
            .with_live(key, |record| record.expires_at = Some(deadline))
            .is_some())
    }

    async fn ttl(&self, key: &str) -> StoreResult<RecordTtl> {
        self.ensure_open()?;
        let now = Instant::now();
        Ok(self
            .with_live(key, |record| match record.expires_at {
                Some(at) => RecordTtl::Remaining(at.saturating_duration_since(now)),
                None => RecordTtl::Persistent,
            })
            .unwrap_or(RecordTtl::Missing))
    }

    async fn commit(&self, tx: Transaction) -> StoreResult<TxOutcome> {
        self.ensure_open()?;
        let armed = self.fault.lock().take();
        let now = Instant::now();
        self.map.remove_if(&tx.key, |_, record| record.is_expired(now));

        // The entry guard is held until the end: nothing else touches this key
        // while the transaction is staged, and nothing is visible before the swap.
        let slot = self.map.entry(tx.key.clone());
        let mut staged = match (&slot, tx.guard) {
            (Entry::Occupied(_), TxGuard::Absent) | (Entry::Vacant(_), TxGuard::Present) => {
                debug!("Transaction guard {:?} failed on {}", tx.guard, tx.key);
                return Ok(TxOutcome::Conflict);
            }
            (Entry::Occupied(existing), _) => existing.get().clone(),
            (Entry::Vacant(_), _) => Record::default(),
        };
        self.check_fault(&tx.key, TxStep::Guard, armed)?;

        for (field, value) in &tx.fields {
            staged.fields.insert(field.clone(), value.clone());
        }
        self.check_fault(&tx.key, TxStep::WriteFields, armed)?;

        if let Some(ttl) = tx.expire {
            staged.expires_at = Some(Self::deadline(&tx.key, now, ttl)?);
        }
        self.check_fault(&tx.key, TxStep::Expire, armed)?;

        if staged.fields.is_empty() {
            return Ok(TxOutcome::Committed);
        }
        match slot {
            Entry::Occupied(mut existing) => {
                existing.insert(staged);
            }
            Entry::Vacant(empty) => {
                empty.insert(staged);
            }
        }
        Ok(TxOutcome::Committed)
    }

    async fn close(&self) -> StoreResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Memory backend closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expired_record_reads_as_missing() {
        let backend = MemoryBackend::new();
        backend.set_field("k", "f", "v", Presence::Any).await.unwrap();
        assert!(backend.expire("k", Duration::from_secs(5)).await.unwrap());

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(backend.get_field("k", "f").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!backend.exists("k").await.unwrap());
        assert_eq!(backend.ttl("k").await.unwrap(), RecordTtl::Missing);
        assert!(!backend.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_field_keeps_ttl() {
        let backend = MemoryBackend::new();
        backend.set_field("k", "a", "1", Presence::Any).await.unwrap();
        backend.expire("k", Duration::from_secs(60)).await.unwrap();
        backend.set_field("k", "b", "2", Presence::MustExist).await.unwrap();

        assert!(matches!(backend.ttl("k").await.unwrap(), RecordTtl::Remaining(_)));
    }

    #[tokio::test]
    async fn test_must_exist_write_does_not_create() {
        let backend = MemoryBackend::new();
        assert!(!backend.set_field("k", "f", "v", Presence::MustExist).await.unwrap());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_exists_with_absent_field() {
        let backend = MemoryBackend::new();
        backend.set_field("k", "a", "1", Presence::Any).await.unwrap();

        assert!(backend.exists("k").await.unwrap());
        assert_eq!(backend.get_field("k", "missing").await.unwrap(), None);
        assert_eq!(backend.ttl("k").await.unwrap(), RecordTtl::Persistent);
    }

    #[tokio::test]
    async fn test_removing_last_field_removes_record() {
        let backend = MemoryBackend::new();
        backend.set_field("k", "a", "1", Presence::Any).await.unwrap();

        assert!(backend.delete_field("k", "a").await.unwrap());
        assert!(!backend.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_guarded_commit_conflicts_on_existing_key() {
        let backend = MemoryBackend::new();
        backend.set_field("k", "a", "1", Presence::Any).await.unwrap();

        let outcome = backend
            .commit(Transaction::on("k").require_absent().set("a", "2"))
            .await
            .unwrap();
        assert_eq!(outcome, TxOutcome::Conflict);
        assert_eq!(backend.get_field("k", "a").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_fault_after_any_step_leaves_nothing_behind() {
        for step in [TxStep::Guard, TxStep::WriteFields, TxStep::Expire] {
            let backend = MemoryBackend::new();
            backend.fail_transaction_after(step);

            let err = backend
                .commit(
                    Transaction::on("k")
                        .require_absent()
                        .set("user", "alice")
                        .expire(Duration::from_secs(60)),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::TransactionFailed { .. }));
            assert!(!backend.exists("k").await.unwrap(), "partial record after {:?}", step);
        }
    }

    #[tokio::test]
    async fn test_present_guard_conflicts_on_missing_key() {
        let backend = MemoryBackend::new();

        let outcome = backend
            .commit(Transaction::on("k").require_present().set("a", "1"))
            .await
            .unwrap();
        assert_eq!(outcome, TxOutcome::Conflict);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_rejected_not_panicking() {
        let backend = MemoryBackend::new();

        let err = backend
            .commit(
                Transaction::on("k")
                    .require_absent()
                    .set("user", "alice")
                    .expire(Duration::MAX),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ExpirationRejected { .. }));
        assert!(!backend.exists("k").await.unwrap());

        backend.set_field("k", "f", "v", Presence::Any).await.unwrap();
        let err = backend.expire("k", Duration::MAX).await.unwrap_err();
        assert!(matches!(err, StoreError::ExpirationRejected { .. }));
        assert_eq!(backend.ttl("k").await.unwrap(), RecordTtl::Persistent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let backend = MemoryBackend::new();
        backend
            .commit(Transaction::on("a").set("f", "v").expire(Duration::from_secs(1)))
            .await
            .unwrap();
        backend.commit(Transaction::on("b").set("f", "v")).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(backend.purge_expired(), 1);
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_backend_is_unavailable() {
        let backend = MemoryBackend::new();
        backend.close().await.unwrap();
        backend.close().await.unwrap();

        assert!(matches!(
            backend.exists("k").await,
            Err(StoreError::BackendUnavailable(_))
        ));
    }
}
