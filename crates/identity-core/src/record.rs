//! Named hash record with get/set/delete and expiration control.
//!
//! `UserAccount` and `Session` are thin specializations of this type.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use identity_shared::constants::MAX_RECORD_TTL;

use crate::backend::{Presence, RecordBackend, RecordTtl};
use crate::error::{StoreError, StoreResult};

#[derive(Clone)]
pub struct AttributeRecord {
    key: String,
    backend: Arc<dyn RecordBackend>,
}

impl fmt::Debug for AttributeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeRecord").field("key", &self.key).finish()
    }
}

impl AttributeRecord {
    pub fn new(backend: Arc<dyn RecordBackend>, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            backend,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn exists(&self) -> StoreResult<bool> {
        self.backend.exists(&self.key).await
    }

    /// `Ok(None)` when the field or the record is absent.
    pub async fn get_field(&self, field: &str) -> StoreResult<Option<String>> {
        debug!("hget {} {}", self.key, field);
        self.backend.get_field(&self.key, field).await
    }

    /// Like [`get_field`](Self::get_field) but absence is `NotFound`.
    pub async fn require_field(&self, field: &str) -> StoreResult<String> {
        self.get_field(field)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{}#{}", self.key, field)))
    }

    /// Upserts one field. The TTL is left untouched.
    pub async fn set_field(&self, field: &str, value: &str) -> StoreResult<()> {
        debug!("hset {} {}", self.key, field);
        self.backend
            .set_field(&self.key, field, value, Presence::Any)
            .await
            .map(|_| ())
    }

    /// Writes one field of a record that must already exist.
    pub async fn update_field(&self, field: &str, value: &str) -> StoreResult<()> {
        debug!("hset(xx) {} {}", self.key, field);
        let written = self
            .backend
            .set_field(&self.key, field, value, Presence::MustExist)
            .await?;
        if !written {
            return Err(StoreError::NotFound(self.key.clone()));
        }
        Ok(())
    }

    pub async fn delete_field(&self, field: &str) -> StoreResult<bool> {
        self.backend.delete_field(&self.key, field).await
    }

    pub async fn delete(&self) -> StoreResult<()> {
        if !self.backend.delete(&self.key).await? {
            return Err(StoreError::NotFound(self.key.clone()));
        }
        Ok(())
    }

    pub async fn set_expiration(&self, ttl: Duration) -> StoreResult<()> {
        check_ttl(&self.key, ttl)?;
        if !self.backend.expire(&self.key, ttl).await? {
            return Err(StoreError::NotFound(self.key.clone()));
        }
        Ok(())
    }

    pub async fn remaining_ttl(&self) -> StoreResult<RecordTtl> {
        self.backend.ttl(&self.key).await
    }
}

/// Backends count expirations in whole milliseconds; anything shorter would
/// evict the record on the spot. The upper bound is `MAX_RECORD_TTL`.
pub(crate) fn check_ttl(key: &str, ttl: Duration) -> StoreResult<()> {
    let reason = if ttl.as_millis() == 0 {
        format!("ttl must be at least 1ms, got {:?}", ttl)
    } else if ttl > MAX_RECORD_TTL {
        format!("ttl {:?} exceeds the {:?} limit", ttl, MAX_RECORD_TTL)
    } else {
        return Ok(());
    };
    Err(StoreError::ExpirationRejected {
        key: key.to_string(),
        reason,
    })
}
