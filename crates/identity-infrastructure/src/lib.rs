//! # Identity Infrastructure
//! 
//! Backend adapters (Redis, in-memory) and the connection entry point.

pub mod connection;
pub mod memory;
pub mod redis_backend;

pub use connection::{open, open_with_config};
pub use memory::{MemoryBackend, TxStep};
pub use redis_backend::RedisBackend;
