//! Core ledger functionality
//!
//! This module contains the fundamental ledger components: content hashing,
//! signed transactions, immutable signed blocks, the header chain and the
//! rules that decide whether a block may extend it.

pub mod block;
pub mod blockchain;
pub mod hasher;
pub mod transaction;
pub mod validator;

pub use block::{calculate_data_hash, Block, BlockBuilder, Header, BLOCK_VERSION};
pub use blockchain::Blockchain;
pub use hasher::{BlockHasher, Hash, Hasher, TxHasher, HASH_LEN};
pub use transaction::Transaction;
pub use validator::{BlockValidator, ChainView, Validator};
