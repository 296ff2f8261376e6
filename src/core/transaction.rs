// A transaction is an opaque signed payload. The node does not interpret the
// bytes; it only checks that the sender's key signed exactly these bytes.

use crate::core::{Hash, Hasher};
use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize, PrivateKey, PublicKey, Signature};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    data: Vec<u8>,
    pub(crate) from: Option<PublicKey>,
    signature: Option<Signature>,

    // Local bookkeeping, never on the wire and never signed
    #[serde(skip)]
    hash: OnceCell<Hash>,
    #[serde(skip)]
    first_seen: i64,
}

impl Transaction {
    pub fn new(data: Vec<u8>) -> Transaction {
        Transaction {
            data,
            from: None,
            signature: None,
            hash: OnceCell::new(),
            first_seen: 0,
        }
    }

    // Signing covers the raw payload, so it never disturbs the cached hash
    pub fn sign(&mut self, key: &PrivateKey) -> Result<()> {
        let signature = key.sign(&self.data)?;
        self.from = Some(key.public_key());
        self.signature = Some(signature);
        Ok(())
    }

    pub fn verify(&self) -> Result<()> {
        let (from, signature) = match (&self.from, &self.signature) {
            (Some(from), Some(signature)) => (from, signature),
            _ => return Err(BlockchainError::NoSignature),
        };

        if !from.verify(&self.data, signature) {
            return Err(BlockchainError::InvalidSignature);
        }

        Ok(())
    }

    /// Identity hash, computed by the first hasher that asks and then memoized.
    pub fn hash<H: Hasher<Transaction>>(&self, hasher: &H) -> Hash {
        *self.hash.get_or_init(|| hasher.hash(self))
    }

    pub fn get_data(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn get_from(&self) -> Option<&PublicKey> {
        self.from.as_ref()
    }

    pub fn get_signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn set_first_seen(&mut self, timestamp: i64) {
        self.first_seen = timestamp;
    }

    pub fn get_first_seen(&self) -> i64 {
        self.first_seen
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize::<Transaction>(bytes)
    }
}

// Equality is over what travels on the wire; local stamps are ignored
impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data && self.from == other.from && self.signature == other.signature
    }
}

impl Eq for Transaction {}
