// ============================================================================
// Identity Core - Session Handle
// File: crates/identity-core/src/domain/session.rs
// ============================================================================
//! Session records (`sess:<id>`): an owner link written once at creation,
//! caller-defined string attributes, and a TTL the caller must keep renewing.
//!
//! The backend evicts expired sessions on its own. Any call may therefore
//! observe `NotFound` even right after a successful lookup; callers treat that
//! as a normal outcome.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use identity_shared::constants::FIELD_SESSION_OWNER;

use super::{StoreContext, UserAccount};
use crate::backend::RecordTtl;
use crate::error::{StoreError, StoreResult};
use crate::record::AttributeRecord;

#[derive(Clone)]
pub struct Session {
    id: String,
    record: AttributeRecord,
    ctx: Arc<StoreContext>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

impl Session {
    pub(crate) fn new(ctx: Arc<StoreContext>, id: impl Into<String>) -> Self {
        let id = id.into();
        let record = AttributeRecord::new(ctx.backend.clone(), ctx.keys.session(&id));
        Self { id, record, ctx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn exists(&self) -> StoreResult<bool> {
        self.record.exists().await
    }

    /// Renews the expiration. A zero `ttl` selects the default lifetime.
    pub async fn prolong_session(&self, ttl: Duration) -> StoreResult<()> {
        let ttl = self.ctx.resolve_ttl(ttl);
        self.record.set_expiration(ttl).await?;
        debug!("Session {} prolonged by {}s", self.id, ttl.as_secs());
        Ok(())
    }

    pub async fn remaining_ttl(&self) -> StoreResult<Duration> {
        match self.record.remaining_ttl().await? {
            RecordTtl::Remaining(ttl) => Ok(ttl),
            RecordTtl::Missing => Err(StoreError::NotFound(self.record.key().to_string())),
            RecordTtl::Persistent => Err(StoreError::Backend(format!(
                "session {} has no expiration",
                self.record.key()
            ))),
        }
    }

    pub async fn delete(&self) -> StoreResult<()> {
        self.record.delete().await?;
        info!("Session deleted: {}", self.id);
        Ok(())
    }

    /// Stores a caller-defined attribute. The owner field is off limits and a
    /// vanished session is never re-created.
    pub async fn put_string(&self, field: &str, value: &str) -> StoreResult<()> {
        if field == FIELD_SESSION_OWNER {
            return Err(StoreError::ReservedField(field.to_string()));
        }
        self.record.update_field(field, value).await
    }

    /// `NotFound` when the field or the session is absent. An empty string is
    /// a stored value like any other.
    pub async fn get_string(&self, field: &str) -> StoreResult<String> {
        self.record.require_field(field).await
    }

    pub async fn delete_string(&self, field: &str) -> StoreResult<bool> {
        if field == FIELD_SESSION_OWNER {
            return Err(StoreError::ReservedField(field.to_string()));
        }
        self.record.delete_field(field).await
    }

    /// Handle for the owning account. Whether that account still exists is
    /// not checked here; call `UserAccount::exists` if it matters.
    pub async fn get_user(&self) -> StoreResult<UserAccount> {
        let owner = self.record.require_field(FIELD_SESSION_OWNER).await?;
        if owner.is_empty() {
            return Err(StoreError::NotFound(format!(
                "{}#{}",
                self.record.key(),
                FIELD_SESSION_OWNER
            )));
        }
        Ok(UserAccount::new(self.ctx.clone(), owner))
    }
}
