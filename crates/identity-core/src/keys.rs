//! Record key naming

use identity_shared::constants::{SESSION_KEY_PREFIX, USER_KEY_PREFIX};

/// Builds `user:<identity>` and `sess:<id>` keys, optionally under a namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySpace {
    namespace: Option<String>,
}

impl KeySpace {
    pub fn new(namespace: Option<String>) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()),
        }
    }

    pub fn user(&self, identity: &str) -> String {
        self.compose(USER_KEY_PREFIX, identity)
    }

    pub fn session(&self, session_id: &str) -> String {
        self.compose(SESSION_KEY_PREFIX, session_id)
    }

    fn compose(&self, prefix: &str, id: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}:{}", ns, prefix, id),
            None => format!("{}:{}", prefix, id),
        }
    }
}
