//! In-process backend with lazy TTL eviction and staged transactions.

pub mod entry;
pub mod store;

pub use store::{MemoryBackend, TxStep};
