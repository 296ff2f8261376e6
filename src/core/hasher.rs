//! Content addressing for headers and transactions

use crate::core::{Block, Header, Transaction};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bytes in a [`Hash`]
pub const HASH_LEN: usize = 32;

/// A SHA-256 digest identifying a header or transaction
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    pub const fn zero() -> Hash {
        Hash([0u8; HASH_LEN])
    }

    /// Build a hash from a digest; anything that is not exactly 32 bytes is rejected.
    pub fn from_slice(bytes: &[u8]) -> Option<Hash> {
        let array: [u8; HASH_LEN] = bytes.try_into().ok()?;
        Some(Hash(array))
    }

    pub fn digest(data: &[u8]) -> Hash {
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&sha256_digest(data));
        Hash(out)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", HEXLOWER.encode(&self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({self})")
    }
}

/// A pluggable content-addressing function.
pub trait Hasher<T: ?Sized> {
    fn hash(&self, value: &T) -> Hash;
}

/// Hashes the canonical header bytes; signature and validator key are not covered.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockHasher;

impl Hasher<Header> for BlockHasher {
    fn hash(&self, header: &Header) -> Hash {
        Hash::digest(&header.to_bytes())
    }
}

impl Hasher<Block> for BlockHasher {
    fn hash(&self, block: &Block) -> Hash {
        self.hash(block.get_header())
    }
}

/// Hashes the raw transaction payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxHasher;

impl Hasher<Transaction> for TxHasher {
    fn hash(&self, tx: &Transaction) -> Hash {
        Hash::digest(tx.get_data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(height: u32) -> Header {
        Header {
            version: 1,
            prev_block_hash: Hash::zero(),
            data_hash: Hash::digest(b"data"),
            height,
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_identical_headers_hash_identically() {
        assert_eq!(BlockHasher.hash(&header(3)), BlockHasher.hash(&header(3)));
    }

    #[test]
    fn test_every_header_field_is_covered() {
        let base = BlockHasher.hash(&header(3));

        let mut changed = header(3);
        changed.height = 4;
        assert_ne!(base, BlockHasher.hash(&changed));

        let mut changed = header(3);
        changed.timestamp += 1;
        assert_ne!(base, BlockHasher.hash(&changed));

        let mut changed = header(3);
        changed.prev_block_hash = Hash::digest(b"parent");
        assert_ne!(base, BlockHasher.hash(&changed));

        let mut changed = header(3);
        changed.version = 2;
        assert_ne!(base, BlockHasher.hash(&changed));
    }

    #[test]
    fn test_tx_hash_depends_on_payload_only() {
        let a = Transaction::new(b"foo".to_vec());
        let b = Transaction::new(b"foo".to_vec());
        let c = Transaction::new(b"bar".to_vec());

        assert_eq!(TxHasher.hash(&a), TxHasher.hash(&b));
        assert_ne!(TxHasher.hash(&a), TxHasher.hash(&c));
    }

    #[test]
    fn test_zero_hash() {
        assert!(Hash::zero().is_zero());
        assert!(!Hash::digest(b"x").is_zero());
        assert_eq!(Hash::from_slice(&[1u8; 31]), None);
    }
}
