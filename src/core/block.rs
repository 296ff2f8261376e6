use crate::core::{BlockHasher, Hash, Hasher, Transaction, TxHasher};
use crate::error::{BlockchainError, Result, ValidationError};
use crate::utils::{current_timestamp_nanos, deserialize, serialize, PrivateKey, PublicKey, Signature};
use log::debug;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// Header version stamped on every block this node builds
pub const BLOCK_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub version: u32,
    pub prev_block_hash: Hash,
    pub data_hash: Hash,
    pub height: u32,
    pub timestamp: i64,
}

impl Header {
    /// Canonical fixed-width encoding of every header field, the input of [`BlockHasher`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + 32 + 32 + 4 + 8);
        bytes.extend_from_slice(&self.version.to_be_bytes());
        bytes.extend_from_slice(self.prev_block_hash.as_bytes());
        bytes.extend_from_slice(self.data_hash.as_bytes());
        bytes.extend_from_slice(&self.height.to_be_bytes());
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes
    }
}

/// A signed, immutable block.
///
/// Blocks are only assembled through [`BlockBuilder`] or decoded from the wire,
/// so the header can never change under a cached hash. [`Block::verify`] still
/// recomputes the header hash from the fields instead of trusting the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    header: Header,
    transactions: Vec<Transaction>,
    validator: Option<PublicKey>,
    signature: Option<Signature>,

    #[serde(skip)]
    hash: OnceCell<Hash>,
}

impl Block {
    /// The pre-agreed first block: height 0, no transactions, no signature.
    pub fn genesis() -> Block {
        Block {
            header: Header {
                version: BLOCK_VERSION,
                prev_block_hash: Hash::zero(),
                data_hash: Hash::zero(),
                height: 0,
                timestamp: 0,
            },
            transactions: Vec::new(),
            validator: None,
            signature: None,
            hash: OnceCell::new(),
        }
    }

    pub fn verify(&self) -> Result<()> {
        let (validator, signature) = match (&self.validator, &self.signature) {
            (Some(validator), Some(signature)) => (validator, signature),
            _ => return Err(BlockchainError::NoSignature),
        };

        let hash = BlockHasher.hash(&self.header);
        if !validator.verify(hash.as_bytes(), signature) {
            return Err(BlockchainError::InvalidSignature);
        }

        for tx in &self.transactions {
            tx.verify().map_err(|e| ValidationError::InvalidTransaction {
                hash: tx.hash(&TxHasher),
                reason: e.to_string(),
            })?;
        }

        let data_hash = calculate_data_hash(&self.transactions)?;
        if data_hash != self.header.data_hash {
            return Err(ValidationError::InvalidDataHash {
                expected: self.header.data_hash,
                got: data_hash,
            }
            .into());
        }

        Ok(())
    }

    /// Identity hash of the header, memoized after the first call.
    pub fn hash<H: Hasher<Header>>(&self, hasher: &H) -> Hash {
        *self.hash.get_or_init(|| hasher.hash(&self.header))
    }

    pub fn get_header(&self) -> &Header {
        &self.header
    }

    pub fn get_height(&self) -> u32 {
        self.header.height
    }

    pub fn get_prev_block_hash(&self) -> Hash {
        self.header.prev_block_hash
    }

    pub fn get_timestamp(&self) -> i64 {
        self.header.timestamp
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_validator(&self) -> Option<&PublicKey> {
        self.validator.as_ref()
    }

    pub fn get_signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }
}

#[cfg(test)]
impl Block {
    pub(crate) fn without_signature(mut self) -> Block {
        self.signature = None;
        self
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
            && self.transactions == other.transactions
            && self.validator == other.validator
            && self.signature == other.signature
    }
}

impl Eq for Block {}

/// Commitment over the transaction set: SHA-256 of every encoded transaction, in order.
pub fn calculate_data_hash(transactions: &[Transaction]) -> Result<Hash> {
    let mut buf = Vec::new();
    for tx in transactions {
        buf.extend(tx.serialize()?);
    }
    Ok(Hash::digest(&buf))
}

/// The only mutable stage of a block's life. Signing consumes the builder.
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    header: Header,
    transactions: Vec<Transaction>,
}

impl BlockBuilder {
    pub fn new(header: Header) -> BlockBuilder {
        BlockBuilder {
            header,
            transactions: Vec::new(),
        }
    }

    /// Start the block that extends `prev`.
    pub fn from_prev_header(prev: &Header) -> Result<BlockBuilder> {
        Ok(BlockBuilder::new(Header {
            version: BLOCK_VERSION,
            prev_block_hash: BlockHasher.hash(prev),
            data_hash: Hash::zero(),
            height: prev.height + 1,
            timestamp: current_timestamp_nanos()?,
        }))
    }

    pub fn add_transaction(&mut self, tx: Transaction) {
        self.transactions.push(tx);
    }

    pub fn with_transactions(mut self, transactions: Vec<Transaction>) -> BlockBuilder {
        self.transactions.extend(transactions);
        self
    }

    pub fn get_header(&self) -> &Header {
        &self.header
    }

    /// Fill in the data hash, sign the header hash and freeze the block.
    pub fn sign(self, key: &PrivateKey) -> Result<Block> {
        let BlockBuilder {
            mut header,
            transactions,
        } = self;

        header.data_hash = calculate_data_hash(&transactions)?;
        let hash = BlockHasher.hash(&header);
        let signature = key.sign(hash.as_bytes())?;
        debug!("Signed block {hash} at height {}", header.height);

        Ok(Block {
            header,
            transactions,
            validator: Some(key.public_key()),
            signature: Some(signature),
            hash: OnceCell::with_value(hash),
        })
    }
}
