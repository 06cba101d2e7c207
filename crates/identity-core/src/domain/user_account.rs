// ============================================================================
// Identity Core - User Account Handle
// File: crates/identity-core/src/domain/user_account.rs
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use identity_shared::constants::{
    FIELD_SESSION_OWNER, FIELD_USER_CONFIRMED, FIELD_USER_CONFIRM_ID, FIELD_USER_EMAIL,
    FIELD_USER_NAME, FIELD_USER_PASSWORD, FIELD_USER_REGISTERED_AT,
};
use identity_shared::ids::new_confirm_id;

use super::{Session, StoreContext};
use crate::backend::{Transaction, TxOutcome};
use crate::error::{StoreError, StoreResult};
use crate::record::{check_ttl, AttributeRecord};

/// Account keyed by login identity (`user:<identity>`).
///
/// Field writes require the account to exist; accounts only come into being
/// through `StoreGateway::create_user`.
#[derive(Clone)]
pub struct UserAccount {
    identity: String,
    record: AttributeRecord,
    ctx: Arc<StoreContext>,
}

impl fmt::Debug for UserAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserAccount")
            .field("identity", &self.identity)
            .finish()
    }
}

impl UserAccount {
    pub(crate) fn new(ctx: Arc<StoreContext>, identity: impl Into<String>) -> Self {
        let identity = identity.into();
        let record = AttributeRecord::new(ctx.backend.clone(), ctx.keys.user(&identity));
        Self { identity, record, ctx }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub async fn exists(&self) -> StoreResult<bool> {
        self.record.exists().await
    }

    pub async fn get_password(&self) -> StoreResult<String> {
        self.record.require_field(FIELD_USER_PASSWORD).await
    }

    /// Stores the hash as given; its format is the caller's concern.
    pub async fn set_password(&self, password_hash: &str) -> StoreResult<()> {
        self.record.update_field(FIELD_USER_PASSWORD, password_hash).await
    }

    pub async fn get_name(&self) -> StoreResult<String> {
        self.record.require_field(FIELD_USER_NAME).await
    }

    pub async fn set_name(&self, name: &str) -> StoreResult<()> {
        self.record.update_field(FIELD_USER_NAME, name).await
    }

    pub async fn get_email(&self) -> StoreResult<String> {
        self.record.require_field(FIELD_USER_EMAIL).await
    }

    pub async fn set_email(&self, email: &str) -> StoreResult<()> {
        self.record.update_field(FIELD_USER_EMAIL, email).await
    }

    pub async fn registered_at(&self) -> StoreResult<DateTime<Utc>> {
        let raw = self.record.require_field(FIELD_USER_REGISTERED_AT).await?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| {
                StoreError::Backend(format!(
                    "malformed {} on {}: {}",
                    FIELD_USER_REGISTERED_AT,
                    self.record.key(),
                    e
                ))
            })
    }

    pub async fn is_confirmed(&self) -> StoreResult<bool> {
        Ok(self.record.get_field(FIELD_USER_CONFIRMED).await?.as_deref() == Some("1"))
    }

    /// Issues a fresh confirmation id and marks the account unconfirmed,
    /// both in one transaction. `NotFound` when the account is gone.
    pub async fn begin_confirmation(&self) -> StoreResult<String> {
        let confirm_id = new_confirm_id();
        let tx = Transaction::on(self.record.key())
            .require_present()
            .set(FIELD_USER_CONFIRM_ID, confirm_id.as_str())
            .set(FIELD_USER_CONFIRMED, "0");

        match self.ctx.backend.commit(tx).await? {
            TxOutcome::Committed => {
                info!("Confirmation pending for user: {}", self.identity);
                Ok(confirm_id)
            }
            TxOutcome::Conflict => Err(StoreError::NotFound(self.record.key().to_string())),
        }
    }

    /// Returns false on a mismatching id; `NotFound` when nothing is pending.
    pub async fn confirm(&self, confirm_id: &str) -> StoreResult<bool> {
        let pending = self.record.require_field(FIELD_USER_CONFIRM_ID).await?;
        if pending != confirm_id {
            warn!("Confirmation id mismatch for user: {}", self.identity);
            return Ok(false);
        }
        self.record.update_field(FIELD_USER_CONFIRMED, "1").await?;
        self.record.delete_field(FIELD_USER_CONFIRM_ID).await?;
        info!("User confirmed: {}", self.identity);
        Ok(true)
    }

    /// Removes the account record only. Sessions issued to this account stay
    /// valid until they expire or are deleted themselves.
    pub async fn delete(&self) -> StoreResult<()> {
        self.record.delete().await?;
        info!("User deleted: {}", self.identity);
        Ok(())
    }

    /// Writes the owner link and the expiration as one transaction. A zero
    /// `ttl` selects the default lifetime. Fails `AlreadyExists` when the
    /// session id is taken.
    pub async fn create_session(&self, session_id: &str, ttl: Duration) -> StoreResult<Session> {
        let ttl = self.ctx.resolve_ttl(ttl);
        let key = self.ctx.keys.session(session_id);
        check_ttl(&key, ttl)?;

        let tx = Transaction::on(key.clone())
            .require_absent()
            .set(FIELD_SESSION_OWNER, self.identity.as_str())
            .expire(ttl);

        match self.ctx.backend.commit(tx).await? {
            TxOutcome::Committed => {
                info!(
                    "Session created for user {} (ttl {}s)",
                    self.identity,
                    ttl.as_secs()
                );
                Ok(Session::new(self.ctx.clone(), session_id))
            }
            TxOutcome::Conflict => {
                warn!("Session id already in use: {}", key);
                Err(StoreError::AlreadyExists(key))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockRecordBackend, Presence, TxGuard};
    use crate::keys::KeySpace;
    use identity_shared::constants::DEFAULT_SESSION_LIFETIME;

    fn account(mock: MockRecordBackend) -> UserAccount {
        let ctx = Arc::new(StoreContext {
            backend: Arc::new(mock),
            keys: KeySpace::default(),
            default_ttl: DEFAULT_SESSION_LIFETIME,
        });
        UserAccount::new(ctx, "alice")
    }

    #[tokio::test]
    async fn test_create_session_commits_owner_and_ttl_together() {
        let mut mock = MockRecordBackend::new();
        mock.expect_commit()
            .withf(|tx: &Transaction| {
                tx.key == "sess:s1"
                    && tx.guard == TxGuard::Absent
                    && tx.fields == vec![("user".to_string(), "alice".to_string())]
                    && tx.expire == Some(Duration::from_secs(3600))
            })
            .times(1)
            .returning(|_| Ok(TxOutcome::Committed));
        mock.expect_set_field().never();
        mock.expect_expire().never();

        let session = account(mock)
            .create_session("s1", Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(session.id(), "s1");
    }

    #[tokio::test]
    async fn test_create_session_zero_ttl_uses_default_lifetime() {
        let mut mock = MockRecordBackend::new();
        mock.expect_commit()
            .withf(|tx: &Transaction| tx.expire == Some(DEFAULT_SESSION_LIFETIME))
            .returning(|_| Ok(TxOutcome::Committed));

        assert!(account(mock).create_session("s1", Duration::ZERO).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_session_conflict_is_already_exists() {
        let mut mock = MockRecordBackend::new();
        mock.expect_commit().returning(|_| Ok(TxOutcome::Conflict));

        assert_eq!(
            account(mock).create_session("s1", Duration::ZERO).await.unwrap_err(),
            StoreError::AlreadyExists("sess:s1".to_string())
        );
    }

    #[tokio::test]
    async fn test_create_session_propagates_transaction_failure() {
        let mut mock = MockRecordBackend::new();
        mock.expect_commit().returning(|tx| {
            Err(StoreError::TransactionFailed {
                key: tx.key,
                reason: "EXEC aborted".into(),
            })
        });

        let err = account(mock).create_session("s1", Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, StoreError::TransactionFailed { .. }));
    }

    #[tokio::test]
    async fn test_create_session_sub_millisecond_ttl_rejected() {
        let mut mock = MockRecordBackend::new();
        mock.expect_commit().never();

        let err = account(mock)
            .create_session("s1", Duration::from_micros(10))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ExpirationRejected { .. }));
    }

    #[tokio::test]
    async fn test_create_session_oversized_ttl_rejected() {
        let mut mock = MockRecordBackend::new();
        mock.expect_commit().never();

        let err = account(mock)
            .create_session("s1", Duration::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ExpirationRejected { .. }));
    }

    #[tokio::test]
    async fn test_begin_confirmation_writes_both_fields_together() {
        let mut mock = MockRecordBackend::new();
        mock.expect_commit()
            .withf(|tx: &Transaction| {
                let names: Vec<&str> = tx.fields.iter().map(|(f, _)| f.as_str()).collect();
                tx.key == "user:alice"
                    && tx.guard == TxGuard::Present
                    && tx.expire.is_none()
                    && names == ["confirm_id", "confirmed"]
                    && tx.fields[1].1 == "0"
            })
            .times(1)
            .returning(|_| Ok(TxOutcome::Committed));
        mock.expect_set_field().never();

        let confirm_id = account(mock).begin_confirmation().await.unwrap();
        assert!(!confirm_id.is_empty());
    }

    #[tokio::test]
    async fn test_begin_confirmation_on_deleted_account_is_not_found() {
        let mut mock = MockRecordBackend::new();
        mock.expect_commit().returning(|_| Ok(TxOutcome::Conflict));

        assert!(account(mock).begin_confirmation().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_set_name_on_deleted_account_is_not_found() {
        let mut mock = MockRecordBackend::new();
        mock.expect_set_field()
            .withf(|key: &str, field: &str, _: &str, presence: &Presence| {
                key == "user:alice" && field == "name" && *presence == Presence::MustExist
            })
            .returning(|_, _, _, _| Ok(false));

        assert!(account(mock).set_name("Alice").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_confirm_with_wrong_id_leaves_account_unconfirmed() {
        let mut mock = MockRecordBackend::new();
        mock.expect_get_field()
            .withf(|_: &str, field: &str| field == "confirm_id")
            .returning(|_, _| Ok(Some("expected".to_string())));
        mock.expect_set_field().never();

        assert_eq!(account(mock).confirm("other").await, Ok(false));
    }

    #[tokio::test]
    async fn test_confirm_without_pending_id_is_not_found() {
        let mut mock = MockRecordBackend::new();
        mock.expect_get_field().returning(|_, _| Ok(None));

        assert!(account(mock).confirm("any").await.unwrap_err().is_not_found());
    }
}
