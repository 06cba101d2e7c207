// ============================================================================
// Identity Infrastructure - Redis Record Backend
// File: crates/identity-infrastructure/src/redis_backend.rs
// ============================================================================
//! `RecordBackend` over a single multiplexed Redis connection.
//!
//! Records are Redis hashes. Transactions run as one Lua script on the shared
//! connection; Redis executes a script without interleaving other commands,
//! so the guard and the writes see the same state.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError, Script};
use tracing::{error, info, warn};

use identity_core::{
    Presence, RecordBackend, RecordTtl, StoreError, StoreResult, Transaction, TxGuard, TxOutcome,
};

const SET_IF_PRESENT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
return 1
"#;

// ARGV: guard ('absent' | 'present' | ''), ttl in ms or '', then field/value pairs.
// Returns 1 committed, 0 guard failed, -1 expiration refused (record removed).
const COMMIT: &str = r#"
local key = KEYS[1]
local exists = redis.call('EXISTS', key) == 1
if (ARGV[1] == 'absent' and exists) or (ARGV[1] == 'present' and not exists) then
    return 0
end
if #ARGV > 2 then
    redis.call('HSET', key, unpack(ARGV, 3))
end
if ARGV[2] ~= '' and redis.call('EXISTS', key) == 1 then
    local applied = redis.pcall('PEXPIRE', key, ARGV[2])
    if type(applied) ~= 'number' or applied ~= 1 then
        redis.call('DEL', key)
        return -1
    end
end
return 1
"#;

pub struct RedisBackend {
    conn: RwLock<Option<MultiplexedConnection>>,
    set_if_present: Script,
    commit_script: Script,
}

impl RedisBackend {
    /// Connects once. No retry or backoff; a failure is returned right away.
    pub async fn connect(address: &str) -> StoreResult<Self> {
        let url = redis_url(address);
        let client = Client::open(url.as_str()).map_err(map_redis_err)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!("Failed to connect to backend at {}: {}", address, e);
                StoreError::BackendUnavailable(e.to_string())
            })?;
        info!("Connected to backend at {}", address);

        Ok(Self {
            conn: RwLock::new(Some(conn)),
            set_if_present: Script::new(SET_IF_PRESENT),
            commit_script: Script::new(COMMIT),
        })
    }

    fn connection(&self) -> StoreResult<MultiplexedConnection> {
        self.conn
            .read()
            .clone()
            .ok_or_else(|| StoreError::BackendUnavailable("connection closed".into()))
    }
}

#[async_trait]
impl RecordBackend for RedisBackend {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)
    }

    async fn get_field(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection()?;
        redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)
    }

    async fn set_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
        presence: Presence,
    ) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        match presence {
            Presence::Any => {
                let _: i64 = redis::cmd("HSET")
                    .arg(key)
                    .arg(field)
                    .arg(value)
                    .query_async(&mut conn)
                    .await
                    .map_err(map_redis_err)?;
                Ok(true)
            }
            Presence::MustExist => {
                let written: i64 = self
                    .set_if_present
                    .key(key)
                    .arg(field)
                    .arg(value)
                    .invoke_async(&mut conn)
                    .await
                    .map_err(map_redis_err)?;
                Ok(written == 1)
            }
        }
    }

    async fn delete_field(&self, key: &str, field: &str) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        let removed: i64 = redis::cmd("HDEL")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(removed > 0)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(removed > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        let applied: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(key, ttl)?)
            .query_async(&mut conn)
            .await
            .map_err(|e| match map_redis_err(e) {
                StoreError::Backend(reason) => StoreError::ExpirationRejected {
                    key: key.to_string(),
                    reason,
                },
                other => other,
            })?;
        Ok(applied == 1)
    }

    async fn ttl(&self, key: &str) -> StoreResult<RecordTtl> {
        let mut conn = self.connection()?;
        let millis: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(match millis {
            -2 => RecordTtl::Missing,
            ms if ms < 0 => RecordTtl::Persistent,
            ms => RecordTtl::Remaining(Duration::from_millis(ms as u64)),
        })
    }

    async fn commit(&self, tx: Transaction) -> StoreResult<TxOutcome> {
        let ttl = match tx.expire {
            Some(ttl) => ttl_millis(&tx.key, ttl)?.to_string(),
            None => String::new(),
        };
        let guard = match tx.guard {
            TxGuard::Unconditional => "",
            TxGuard::Absent => "absent",
            TxGuard::Present => "present",
        };
        let mut conn = self.connection()?;

        let mut invocation = self.commit_script.key(&tx.key);
        invocation.arg(guard).arg(ttl);
        for (field, value) in &tx.fields {
            invocation.arg(field).arg(value);
        }
        let status: i64 = invocation.invoke_async(&mut conn).await.map_err(|e| {
            error!("Transaction on {} failed: {}", tx.key, e);
            match map_redis_err(e) {
                StoreError::Backend(reason) => StoreError::TransactionFailed {
                    key: tx.key.clone(),
                    reason,
                },
                other => other,
            }
        })?;

        match status {
            1 => Ok(TxOutcome::Committed),
            0 => Ok(TxOutcome::Conflict),
            _ => {
                warn!("Expiration refused on {}, record removed", tx.key);
                Err(StoreError::ExpirationRejected {
                    key: tx.key.clone(),
                    reason: "PEXPIRE refused by the server".into(),
                })
            }
        }
    }

    async fn close(&self) -> StoreResult<()> {
        if self.conn.write().take().is_some() {
            info!("Backend connection closed");
        }
        Ok(())
    }
}

/// Accepts either `host:port` or a full `redis://` / `rediss://` / `unix://` URL.
fn redis_url(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{}", address)
    }
}

/// PEXPIRE takes a signed 64-bit millisecond count.
fn ttl_millis(key: &str, ttl: Duration) -> StoreResult<i64> {
    i64::try_from(ttl.as_millis()).map_err(|_| StoreError::ExpirationRejected {
        key: key.to_string(),
        reason: format!("ttl {:?} does not fit in a signed millisecond count", ttl),
    })
}

/// Connection-class failures become `BackendUnavailable`; everything else is
/// passed through as `Backend` with the server's message.
fn map_redis_err(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        StoreError::BackendUnavailable(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}
