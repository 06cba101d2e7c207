use std::collections::HashMap;

use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct Record {
    pub fields: HashMap<String, String>,
    pub expires_at: Option<Instant>, // None: persistent
}

impl Record {
    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}
