use crate::core::Block;
use crate::error::{BlockchainError, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// Sink for accepted blocks. The chain only keeps headers; full blocks live here.
pub trait Storage: Send + Sync {
    fn put(&self, block: &Block) -> Result<()>;
    fn get(&self, height: u32) -> Result<Option<Block>>;
}

/// ( K -> height, V -> Block )
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<u32, Block>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(blocks) => blocks.len(),
            Err(_) => {
                log::error!("Failed to acquire read lock on block store");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStore {
    fn put(&self, block: &Block) -> Result<()> {
        let mut blocks = self
            .inner
            .write()
            .map_err(|_| BlockchainError::Storage("block store lock poisoned".to_string()))?;
        blocks.insert(block.get_height(), block.clone());
        Ok(())
    }

    fn get(&self, height: u32) -> Result<Option<Block>> {
        let blocks = self
            .inner
            .read()
            .map_err(|_| BlockchainError::Storage("block store lock poisoned".to_string()))?;
        Ok(blocks.get(&height).cloned())
    }
}
