//! # Identity Core - Domain Module
//! 
//! Account and session handles. Each handle is a lightweight value that
//! shares the gateway's backend connection.

pub mod session;
pub mod user_account;

pub use session::Session;
pub use user_account::UserAccount;

use std::sync::Arc;
use std::time::Duration;

use crate::backend::RecordBackend;
use crate::keys::KeySpace;

/// What every handle needs from the gateway that created it.
pub(crate) struct StoreContext {
    pub backend: Arc<dyn RecordBackend>,
    pub keys: KeySpace,
    pub default_ttl: Duration,
}

impl StoreContext {
    /// A zero TTL means "use the default lifetime".
    pub fn resolve_ttl(&self, ttl: Duration) -> Duration {
        if ttl.is_zero() {
            self.default_ttl
        } else {
            ttl
        }
    }
}
