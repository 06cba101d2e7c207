//! Identifier helpers

use uuid::Uuid;

/// Random opaque session id for callers that do not bring their own.
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Random token used for account confirmation.
pub fn new_confirm_id() -> String {
    Uuid::new_v4().to_string()
}
