//! # Relay Ledger - A Single-Writer Ledger Node
//!
//! One node holds the validator key and produces a signed block on a timer;
//! every other node checks those blocks and appends them to its own header
//! chain. Transactions are opaque signed payloads that wait in a memory pool
//! until the producer picks them up.
//!
//! ## How the Code Is Organized
//! - `core/`: hashing, transactions, blocks, the header chain and its validator
//! - `storage/`: the block sink and the memory pool
//! - `network/`: transports, wire messages, outbound queue, the server loop
//! - `config/`: node settings from defaults, TOML and the environment
//! - `utils/`: signing keys, digests, clocks and the binary codec
//! - `cli/`: command-line interface for the node binary
//!
//! ## Where to Start Reading
//! 1. `network/server.rs` for the event loop and block production
//! 2. `core/blockchain.rs` for how the chain grows
//! 3. `core/validator.rs` for the rules a block must pass
//! 4. `storage/memory_pool.rs` for transaction ordering

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::NodeConfig;
pub use core::{
    Block, BlockBuilder, BlockHasher, BlockValidator, Blockchain, ChainView, Hash, Hasher, Header,
    Transaction, TxHasher, Validator,
};
pub use error::{BlockchainError, Result, ValidationError};
pub use network::{
    LocalTransport, Message, MessageKind, NetAddr, Rpc, Server, ServerHandle, ServerOpts,
    Transport,
};
pub use storage::{MemoryPool, MemoryStore, Storage};
pub use utils::{current_timestamp, sha256_digest, Address, PrivateKey, PublicKey, Signature};
