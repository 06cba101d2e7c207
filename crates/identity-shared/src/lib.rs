//! # Identity Shared
//! 
//! Shared configuration, constants, telemetry, and id helpers for the identity store.

pub mod constants;
pub mod ids;
pub mod telemetry;
pub mod config;
pub mod error;

pub use config::StoreConfig;
pub use error::AppError;
pub use ids::new_session_id;
