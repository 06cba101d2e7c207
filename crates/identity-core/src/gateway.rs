// ============================================================================
// Identity Core - Store Gateway
// File: crates/identity-core/src/gateway.rs
// ============================================================================
//! Entry point of the identity store. Owns the backend connection for its
//! whole lifetime and hands out account/session handles that share it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use identity_shared::config::StoreConfig;
use identity_shared::constants::{
    FIELD_USER_CONFIRMED, FIELD_USER_NAME, FIELD_USER_PASSWORD, FIELD_USER_REGISTERED_AT,
};

use crate::backend::{RecordBackend, Transaction, TxOutcome};
use crate::domain::{Session, StoreContext, UserAccount};
use crate::error::{StoreError, StoreResult};
use crate::keys::KeySpace;

pub struct StoreGateway {
    ctx: Arc<StoreContext>,
}

impl fmt::Debug for StoreGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreGateway")
            .field("keys", &self.ctx.keys)
            .field("default_ttl", &self.ctx.default_ttl)
            .finish()
    }
}

impl StoreGateway {
    pub fn new(backend: Arc<dyn RecordBackend>, keys: KeySpace, default_ttl: Duration) -> Self {
        Self {
            ctx: Arc::new(StoreContext {
                backend,
                keys,
                default_ttl,
            }),
        }
    }

    pub fn with_config(backend: Arc<dyn RecordBackend>, config: &StoreConfig) -> Self {
        Self::new(
            backend,
            KeySpace::new(config.store.namespace.clone()),
            config.session.default_ttl(),
        )
    }

    pub fn default_ttl(&self) -> Duration {
        self.ctx.default_ttl
    }

    /// Handle for `identity` without touching the backend.
    pub fn user(&self, identity: &str) -> UserAccount {
        UserAccount::new(self.ctx.clone(), identity)
    }

    /// Handle for `session_id` without touching the backend.
    pub fn session(&self, session_id: &str) -> Session {
        Session::new(self.ctx.clone(), session_id)
    }

    /// Creates the account atomically; an existing identity is never overwritten.
    pub async fn create_user(
        &self,
        identity: &str,
        display_name: &str,
        password_hash: &str,
    ) -> StoreResult<UserAccount> {
        let key = self.ctx.keys.user(identity);
        let tx = Transaction::on(key.clone())
            .require_absent()
            .set(FIELD_USER_NAME, display_name)
            .set(FIELD_USER_PASSWORD, password_hash)
            .set(FIELD_USER_REGISTERED_AT, Utc::now().to_rfc3339())
            .set(FIELD_USER_CONFIRMED, "0");

        match self.ctx.backend.commit(tx).await? {
            TxOutcome::Committed => {
                info!("User created: {}", identity);
                Ok(self.user(identity))
            }
            TxOutcome::Conflict => {
                warn!("User already exists: {}", identity);
                Err(StoreError::AlreadyExists(key))
            }
        }
    }

    pub async fn find_user(&self, identity: &str) -> StoreResult<UserAccount> {
        let user = self.user(identity);
        if !user.exists().await? {
            return Err(StoreError::NotFound(self.ctx.keys.user(identity)));
        }
        Ok(user)
    }

    /// `NotFound` for unknown ids, including expired and evicted ones.
    pub async fn find_session_by_id(&self, session_id: &str) -> StoreResult<Session> {
        let session = self.session(session_id);
        if !session.exists().await? {
            return Err(StoreError::NotFound(self.ctx.keys.session(session_id)));
        }
        Ok(session)
    }

    /// Releases the backend connection. Safe to call more than once.
    pub async fn close(&self) -> StoreResult<()> {
        self.ctx.backend.close().await?;
        info!("Identity store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockRecordBackend, TxGuard};
    use identity_shared::constants::DEFAULT_SESSION_LIFETIME;

    fn gateway(mock: MockRecordBackend) -> StoreGateway {
        StoreGateway::new(Arc::new(mock), KeySpace::default(), DEFAULT_SESSION_LIFETIME)
    }

    #[tokio::test]
    async fn test_create_user_writes_profile_in_one_guarded_transaction() {
        let mut mock = MockRecordBackend::new();
        mock.expect_commit()
            .withf(|tx: &Transaction| {
                let field = |name: &str| {
                    tx.fields
                        .iter()
                        .find(|(f, _)| f == name)
                        .map(|(_, v)| v.as_str())
                };
                tx.key == "user:alice"
                    && tx.guard == TxGuard::Absent
                    && tx.expire.is_none()
                    && field("name") == Some("Alice A.")
                    && field("pass") == Some("hash1")
                    && field("registered_at").is_some()
            })
            .times(1)
            .returning(|_| Ok(TxOutcome::Committed));

        let user = gateway(mock).create_user("alice", "Alice A.", "hash1").await.unwrap();
        assert_eq!(user.identity(), "alice");
    }

    #[tokio::test]
    async fn test_create_user_conflict_is_already_exists() {
        let mut mock = MockRecordBackend::new();
        mock.expect_commit().returning(|_| Ok(TxOutcome::Conflict));

        assert_eq!(
            gateway(mock).create_user("alice", "A", "h").await.unwrap_err(),
            StoreError::AlreadyExists("user:alice".to_string())
        );
    }

    #[tokio::test]
    async fn test_find_session_by_unknown_id_is_not_found() {
        let mut mock = MockRecordBackend::new();
        mock.expect_exists()
            .withf(|key: &str| key == "sess:gone")
            .returning(|_| Ok(false));

        assert_eq!(
            gateway(mock).find_session_by_id("gone").await.unwrap_err(),
            StoreError::NotFound("sess:gone".to_string())
        );
    }

    #[tokio::test]
    async fn test_find_session_propagates_backend_failure() {
        let mut mock = MockRecordBackend::new();
        mock.expect_exists()
            .returning(|_| Err(StoreError::BackendUnavailable("closed".into())));

        assert_eq!(
            gateway(mock).find_session_by_id("s1").await.unwrap_err(),
            StoreError::BackendUnavailable("closed".into())
        );
    }

    #[tokio::test]
    async fn test_namespace_from_config_applies_to_handles() {
        let mut config = StoreConfig::default();
        config.store.namespace = Some("chat".to_string());
        config.session.default_ttl_secs = 120;

        let mut mock = MockRecordBackend::new();
        mock.expect_exists()
            .withf(|key: &str| key == "chat:user:bob")
            .returning(|_| Ok(true));

        let gateway = StoreGateway::with_config(Arc::new(mock), &config);
        assert_eq!(gateway.default_ttl(), Duration::from_secs(120));
        assert!(gateway.find_user("bob").await.is_ok());
    }

    #[tokio::test]
    async fn test_close_delegates_to_backend() {
        let mut mock = MockRecordBackend::new();
        mock.expect_close().times(2).returning(|| Ok(()));

        let gateway = gateway(mock);
        assert!(gateway.close().await.is_ok());
        assert!(gateway.close().await.is_ok());
    }
}
