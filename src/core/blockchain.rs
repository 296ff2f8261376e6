// This is the header chain - the heart of the node
// I keep every header in memory, hand full blocks to a storage sink, and let a
// pluggable validator decide whether a block may extend the tip

use crate::core::{Block, BlockHasher, BlockValidator, ChainView, Header, Validator};
use crate::error::{BlockchainError, Result};
use crate::storage::{MemoryStore, Storage};
use log::{error, info};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub struct Blockchain {
    // headers[i] is the header at height i; headers[0] is genesis
    headers: RwLock<Vec<Header>>,
    store: Box<dyn Storage>,
    validator: Box<dyn Validator>,
}

impl Blockchain {
    // When I want a chain backed by the in-memory store and the default rules
    pub fn new(genesis: Block) -> Result<Blockchain> {
        Self::with_store(genesis, Box::new(MemoryStore::new()))
    }

    pub fn with_store(genesis: Block, store: Box<dyn Storage>) -> Result<Blockchain> {
        if genesis.get_height() != 0 {
            return Err(BlockchainError::Config(format!(
                "Genesis block must be at height 0, got {}",
                genesis.get_height()
            )));
        }

        let chain = Blockchain {
            headers: RwLock::new(Vec::new()),
            store,
            validator: Box::new(BlockValidator),
        };

        // Genesis is injected directly; it carries no signature to validate
        {
            let mut headers = chain.write_headers();
            chain.add_block_without_validation(&mut headers, &genesis)?;
        }

        Ok(chain)
    }

    pub fn set_validator(&mut self, validator: Box<dyn Validator>) {
        self.validator = validator;
    }

    fn read_headers(&self) -> RwLockReadGuard<'_, Vec<Header>> {
        self.headers.read().unwrap_or_else(|poisoned| {
            error!("Header lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_headers(&self) -> RwLockWriteGuard<'_, Vec<Header>> {
        self.headers.write().unwrap_or_else(|poisoned| {
            error!("Header lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn height(&self) -> u32 {
        ChainView::new(&self.read_headers()).height()
    }

    pub fn has_block(&self, height: u32) -> bool {
        height <= self.height()
    }

    pub fn get_header(&self, height: u32) -> Result<Header> {
        let headers = self.read_headers();
        let view = ChainView::new(&headers);
        view.header(height)
            .cloned()
            .ok_or(BlockchainError::HeightOutOfRange {
                requested: height,
                height: view.height(),
            })
    }

    /// Header at the tip of the chain
    pub fn current_header(&self) -> Header {
        let headers = self.read_headers();
        // Never empty: construction always installs genesis
        headers
            .last()
            .cloned()
            .unwrap_or_else(|| Block::genesis().get_header().clone())
    }

    /// Full block at `height`, read back from the storage sink
    pub fn get_block(&self, height: u32) -> Result<Block> {
        let current = self.height();
        if height > current {
            return Err(BlockchainError::HeightOutOfRange {
                requested: height,
                height: current,
            });
        }

        self.store.get(height)?.ok_or_else(|| {
            BlockchainError::Storage(format!("Block at height {height} missing from store"))
        })
    }

    // Validation and append happen under one write lock, so two writers can
    // never both extend the same tip
    pub fn add_block(&self, block: &Block) -> Result<()> {
        let mut headers = self.write_headers();
        self.validator
            .validate_block(&ChainView::new(&headers), block)?;
        self.add_block_without_validation(&mut headers, block)
    }

    fn add_block_without_validation(&self, headers: &mut Vec<Header>, block: &Block) -> Result<()> {
        self.store.put(block)?;
        headers.push(block.get_header().clone());

        info!(
            "New block {} at height {} with {} transaction(s)",
            block.hash(&BlockHasher),
            block.get_height(),
            block.get_transactions().len()
        );
        Ok(())
    }
}
