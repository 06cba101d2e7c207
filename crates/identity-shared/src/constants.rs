//! Store-wide constants

use std::time::Duration;

/// One lunar month. Used whenever a caller passes a zero TTL.
pub const DEFAULT_SESSION_LIFETIME: Duration = Duration::from_secs(31 * 24 * 60 * 60);

/// Longest accepted expiration. Backends keep the absolute deadline as signed
/// milliseconds, so half the range leaves room for the current time.
pub const MAX_RECORD_TTL: Duration = Duration::from_millis(i64::MAX as u64 / 2);

pub const DEFAULT_BACKEND_ADDRESS: &str = "127.0.0.1:6379";

pub const USER_KEY_PREFIX: &str = "user";
pub const SESSION_KEY_PREFIX: &str = "sess";

// Hash field names shared with already deployed data.
pub const FIELD_USER_NAME: &str = "name";
pub const FIELD_USER_PASSWORD: &str = "pass";
pub const FIELD_USER_EMAIL: &str = "email";
pub const FIELD_USER_REGISTERED_AT: &str = "registered_at";
pub const FIELD_USER_CONFIRMED: &str = "confirmed";
pub const FIELD_USER_CONFIRM_ID: &str = "confirm_id";
pub const FIELD_SESSION_OWNER: &str = "user";
