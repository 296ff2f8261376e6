//! Error handling for the ledger node
//!
//! Every fallible operation in the crate returns [`BlockchainError`]. Chain
//! extension failures carry a [`ValidationError`] so callers can tell a
//! duplicate block from a forged one.

use crate::core::Hash;
use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Reasons a block is refused by the chain's validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The chain already has a block at this height
    AlreadyKnown { height: u32, current: u32 },
    /// The block does not extend the tip by exactly one
    InvalidHeight { height: u32, expected: u32 },
    /// The block does not link to the header at the previous height
    InvalidPrevHash { expected: Hash, got: Hash },
    /// The block signature is absent or does not match
    InvalidSignature(String),
    /// The header does not commit to the carried transactions
    InvalidDataHash { expected: Hash, got: Hash },
    /// A carried transaction fails its own verification
    InvalidTransaction { hash: Hash, reason: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::AlreadyKnown { height, current } => {
                write!(f, "block at height {height} already known (chain height {current})")
            }
            ValidationError::InvalidHeight { height, expected } => {
                write!(f, "block height {height} is invalid, expected {expected}")
            }
            ValidationError::InvalidPrevHash { expected, got } => {
                write!(f, "invalid previous block hash: expected {expected}, got {got}")
            }
            ValidationError::InvalidSignature(msg) => write!(f, "invalid block signature: {msg}"),
            ValidationError::InvalidDataHash { expected, got } => {
                write!(f, "invalid data hash: expected {expected}, got {got}")
            }
            ValidationError::InvalidTransaction { hash, reason } => {
                write!(f, "invalid transaction {hash}: {reason}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Comprehensive error types for ledger operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    /// Block rejected by the chain validator
    Validation(ValidationError),
    /// Signed payload carries no signature
    NoSignature,
    /// Signature does not verify against the claimed key
    InvalidSignature,
    /// Requested height is above the chain tip
    HeightOutOfRange { requested: u32, height: u32 },
    /// Serialization/deserialization errors
    Codec(String),
    /// Peer link errors
    Transport(String),
    /// Configuration errors
    Config(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Block storage errors
    Storage(String),
    /// File I/O errors
    Io(String),
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Validation(err) => write!(f, "Validation error: {err}"),
            BlockchainError::NoSignature => write!(f, "Missing signature"),
            BlockchainError::InvalidSignature => write!(f, "Invalid signature"),
            BlockchainError::HeightOutOfRange { requested, height } => {
                write!(
                    f,
                    "Height out of range: requested {requested}, chain height {height}"
                )
            }
            BlockchainError::Codec(msg) => write!(f, "Codec error: {msg}"),
            BlockchainError::Transport(msg) => write!(f, "Transport error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Storage(msg) => write!(f, "Storage error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<ValidationError> for BlockchainError {
    fn from(err: ValidationError) -> Self {
        BlockchainError::Validation(err)
    }
}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Codec(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Codec(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}
