//! Test utilities for ledger testing

use crate::core::{Block, BlockBuilder, BlockHasher, Blockchain, Hash, Hasher, Header, Transaction};
use crate::utils::{current_timestamp_nanos, PrivateKey};
use rand::Rng;

/// A transaction with a random payload signed by a throwaway key
pub fn random_tx_with_signature() -> Transaction {
    let key = PrivateKey::generate().expect("key generation");
    let payload: [u8; 16] = rand::thread_rng().gen();
    let mut tx = Transaction::new(payload.to_vec());
    tx.sign(&key).expect("sign transaction");
    tx
}

/// A signed block carrying one random transaction
pub fn random_block(height: u32, prev_block_hash: Hash) -> Block {
    random_block_signed_by(&PrivateKey::generate().expect("key generation"), height, prev_block_hash)
}

pub fn random_block_signed_by(key: &PrivateKey, height: u32, prev_block_hash: Hash) -> Block {
    let header = Header {
        version: 1,
        prev_block_hash,
        data_hash: Hash::zero(),
        height,
        timestamp: current_timestamp_nanos().expect("clock"),
    };

    let mut builder = BlockBuilder::new(header);
    builder.add_transaction(random_tx_with_signature());
    builder.sign(key).expect("sign block")
}

/// A chain holding only the genesis block
pub fn chain_with_genesis() -> Blockchain {
    Blockchain::new(Block::genesis()).expect("genesis is valid")
}

/// Hash of the header just below `height`, i.e. what a block at `height` must link to
pub fn previous_block_hash(chain: &Blockchain, height: u32) -> Hash {
    let header = chain.get_header(height - 1).expect("previous header exists");
    BlockHasher.hash(&header)
}
