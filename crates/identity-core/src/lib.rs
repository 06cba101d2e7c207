//! # Identity Core
//! 
//! Account and session handles, the record primitive they share, and the
//! backend port (trait) the infrastructure crate implements.

pub mod backend;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod keys;
pub mod record;

pub use backend::{Presence, RecordBackend, RecordTtl, Transaction, TxGuard, TxOutcome};
pub use domain::{Session, UserAccount};
pub use error::{StoreError, StoreResult};
pub use gateway::StoreGateway;
pub use keys::KeySpace;
pub use record::AttributeRecord;
