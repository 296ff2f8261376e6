//! Chain-extension rules
//!
//! A [`Validator`] decides whether a block may be appended to the current
//! header chain. The chain runs it while holding its write lock, so the
//! [`ChainView`] a validator sees cannot move underneath it.

use crate::core::{Block, BlockHasher, Hasher, Header};
use crate::error::{BlockchainError, ValidationError};

/// Read-only view of the header list handed to validators
#[derive(Debug, Clone, Copy)]
pub struct ChainView<'a> {
    headers: &'a [Header],
}

impl<'a> ChainView<'a> {
    pub(crate) fn new(headers: &'a [Header]) -> ChainView<'a> {
        ChainView { headers }
    }

    pub fn height(&self) -> u32 {
        self.headers.len().saturating_sub(1) as u32
    }

    pub fn header(&self, height: u32) -> Option<&'a Header> {
        self.headers.get(height as usize)
    }
}

pub trait Validator: Send + Sync {
    fn validate_block(&self, chain: &ChainView<'_>, block: &Block) -> Result<(), ValidationError>;
}

/// The default policy: the block must be the direct successor of the tip,
/// link to it by hash, and carry a valid signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockValidator;

impl Validator for BlockValidator {
    fn validate_block(&self, chain: &ChainView<'_>, block: &Block) -> Result<(), ValidationError> {
        let current = chain.height();
        let height = block.get_height();

        if height <= current {
            return Err(ValidationError::AlreadyKnown { height, current });
        }

        if height != current + 1 {
            return Err(ValidationError::InvalidHeight {
                height,
                expected: current + 1,
            });
        }

        // The tip always exists: a chain is never built without genesis
        let prev_header = chain.header(current).ok_or(ValidationError::InvalidHeight {
            height,
            expected: current + 1,
        })?;
        let expected = BlockHasher.hash(prev_header);
        if expected != block.get_prev_block_hash() {
            return Err(ValidationError::InvalidPrevHash {
                expected,
                got: block.get_prev_block_hash(),
            });
        }

        block.verify().map_err(|err| match err {
            BlockchainError::Validation(inner) => inner,
            other => ValidationError::InvalidSignature(other.to_string()),
        })
    }
}
