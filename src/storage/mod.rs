//! Data storage
//!
//! This module holds the block sink the chain persists accepted blocks into
//! and the memory pool for pending transactions. Both are in-memory only.

pub mod block_store;
pub mod memory_pool;

pub use block_store::{MemoryStore, Storage};
pub use memory_pool::{MemoryPool, DEFAULT_INCLUDED_HISTORY, DEFAULT_MEMPOOL_CAPACITY};
