use crate::core::{Hash, Transaction, TxHasher};
use crate::utils::current_timestamp_nanos;
use log::{debug, error, warn};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Capacity the node runs with unless configured otherwise
pub const DEFAULT_MEMPOOL_CAPACITY: usize = 1000;

/// How many hashes of already included transactions the pool remembers
pub const DEFAULT_INCLUDED_HISTORY: usize = 10_000;

// (first_seen, seq, hash): iteration order is the pending order
type OrderKey = (i64, u64, Hash);

struct PoolEntry {
    tx: Transaction,
    // Insertion order, breaks ties between equal first-seen stamps
    seq: u64,
}

impl PoolEntry {
    fn key(&self, hash: Hash) -> OrderKey {
        (self.tx.get_first_seen(), self.seq, hash)
    }
}

#[derive(Default)]
struct PoolInner {
    // ( K -> tx hash, V -> entry )
    entries: HashMap<Hash, PoolEntry>,
    order: BTreeSet<OrderKey>,
    // Recently included hashes, oldest at the front of the queue
    included: HashSet<Hash>,
    included_order: VecDeque<Hash>,
    next_seq: u64,
    last_seen: i64,
}

impl PoolInner {
    // Stamps handed out by this pool strictly increase even if the wall clock stalls
    fn next_first_seen(&mut self) -> i64 {
        let now = current_timestamp_nanos().unwrap_or_else(|e| {
            warn!("Falling back to logical first-seen stamp: {e}");
            0
        });
        let stamp = now.max(self.last_seen + 1);
        self.last_seen = stamp;
        stamp
    }

    fn insert(&mut self, hash: Hash, entry: PoolEntry) {
        self.order.insert(entry.key(hash));
        self.entries.insert(hash, entry);
    }

    fn take(&mut self, hash: &Hash) -> Option<PoolEntry> {
        let entry = self.entries.remove(hash)?;
        self.order.remove(&entry.key(*hash));
        Some(entry)
    }

    fn evict_oldest(&mut self) {
        if let Some((_, _, hash)) = self.order.pop_first() {
            self.entries.remove(&hash);
            warn!("Memory pool full, evicted oldest transaction {hash}");
        }
    }

    fn remember_included(&mut self, hash: Hash, limit: usize) {
        if !self.included.insert(hash) {
            return;
        }
        self.included_order.push_back(hash);
        while self.included_order.len() > limit {
            if let Some(old) = self.included_order.pop_front() {
                self.included.remove(&old);
            }
        }
    }
}

/// Pool of transactions seen but not yet included in a block.
///
/// Every operation takes the internal lock, so the event loop and the block
/// producer can share one pool behind an `Arc`. The pool also remembers the
/// hashes of recently included transactions and refuses to take them back,
/// so an echo arriving after its block does not get confirmed twice.
pub struct MemoryPool {
    inner: RwLock<PoolInner>,
    max_len: usize,
    history_len: usize,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new(DEFAULT_MEMPOOL_CAPACITY)
    }
}

impl MemoryPool {
    pub fn new(max_len: usize) -> MemoryPool {
        Self::with_history(max_len, DEFAULT_INCLUDED_HISTORY)
    }

    pub fn with_history(max_len: usize, history_len: usize) -> MemoryPool {
        MemoryPool {
            inner: RwLock::new(PoolInner::default()),
            max_len: max_len.max(1),
            history_len: history_len.max(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, PoolInner> {
        self.inner.read().unwrap_or_else(|poisoned| {
            error!("Memory pool lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, PoolInner> {
        self.inner.write().unwrap_or_else(|poisoned| {
            error!("Memory pool lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Insert a transaction. Returns `false` when the same hash is already
    /// pooled or was recently included in a block.
    pub fn add(&self, mut tx: Transaction) -> bool {
        let hash = tx.hash(&TxHasher);
        let mut pool = self.write();

        if pool.entries.contains_key(&hash) {
            return false;
        }
        if pool.included.contains(&hash) {
            debug!("Transaction {hash} was already included, not pooling it again");
            return false;
        }

        if tx.get_first_seen() == 0 {
            let stamp = pool.next_first_seen();
            tx.set_first_seen(stamp);
        } else {
            pool.last_seen = pool.last_seen.max(tx.get_first_seen());
        }

        if pool.entries.len() >= self.max_len {
            pool.evict_oldest();
        }

        let seq = pool.next_seq;
        pool.next_seq += 1;
        pool.insert(hash, PoolEntry { tx, seq });
        debug!("Added transaction {hash} to memory pool (size {})", pool.entries.len());
        true
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.read().entries.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<Transaction> {
        self.read().entries.get(hash).map(|entry| entry.tx.clone())
    }

    /// Whether a block accepted by this node recently carried the transaction
    pub fn was_included(&self, hash: &Hash) -> bool {
        self.read().included.contains(hash)
    }

    /// Snapshot of the pool, oldest first.
    pub fn pending(&self) -> Vec<Transaction> {
        let pool = self.read();
        pool.order
            .iter()
            .filter_map(|(_, _, hash)| pool.entries.get(hash))
            .map(|entry| entry.tx.clone())
            .collect()
    }

    /// Remove exactly the given transactions, typically the ones a block just
    /// included, and remember them as included. Anything added after the
    /// snapshot was taken stays pooled.
    pub fn remove_included(&self, transactions: &[Transaction]) -> usize {
        let mut pool = self.write();
        let mut removed = 0;
        for tx in transactions {
            let hash = tx.hash(&TxHasher);
            if pool.take(&hash).is_some() {
                removed += 1;
            }
            pool.remember_included(hash, self.history_len);
        }
        removed
    }

    pub fn remove(&self, hash: &Hash) -> Option<Transaction> {
        self.write().take(hash).map(|entry| entry.tx)
    }

    /// Drop every pooled transaction. The included history is kept.
    pub fn clear(&self) {
        let mut pool = self.write();
        pool.entries.clear();
        pool.order.clear();
    }

    /// Alias of [`MemoryPool::clear`].
    pub fn flush(&self) {
        self.clear();
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::random_tx_with_signature;
    use rand::seq::SliceRandom;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_pool_is_empty() {
        let pool = MemoryPool::default();
        assert_eq!(pool.len(), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_add_deduplicates_by_hash() {
        let pool = MemoryPool::default();
        assert!(pool.add(Transaction::new(b"foo".to_vec())));
        assert_eq!(pool.len(), 1);

        assert!(!pool.add(Transaction::new(b"foo".to_vec())));
        assert_eq!(pool.len(), 1);

        pool.flush();
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn test_contains_and_get() {
        let pool = MemoryPool::default();
        let tx = random_tx_with_signature();
        let hash = tx.hash(&TxHasher);

        assert!(!pool.contains(&hash));
        pool.add(tx.clone());
        assert!(pool.contains(&hash));
        assert_eq!(pool.get(&hash), Some(tx.clone()));

        assert_eq!(pool.remove(&hash), Some(tx));
        assert!(!pool.contains(&hash));
    }

    #[test]
    fn test_add_stamps_first_seen_in_arrival_order() {
        let pool = MemoryPool::default();
        for i in 0..50u32 {
            pool.add(Transaction::new(i.to_be_bytes().to_vec()));
        }

        let pending = pool.pending();
        assert_eq!(pending.len(), 50);
        for (i, tx) in pending.iter().enumerate() {
            assert_eq!(tx.get_data(), (i as u32).to_be_bytes());
        }
        for pair in pending.windows(2) {
            assert!(pair[0].get_first_seen() < pair[1].get_first_seen());
        }
    }

    #[test]
    fn test_pending_sorts_by_first_seen() {
        let pool = MemoryPool::default();
        let mut stamps: Vec<i64> = (1..=1000).collect();
        stamps.shuffle(&mut rand::thread_rng());

        for stamp in &stamps {
            let mut tx = Transaction::new(stamp.to_string().into_bytes());
            tx.set_first_seen(*stamp);
            assert!(pool.add(tx));
        }

        assert_eq!(pool.len(), 1000);
        let pending = pool.pending();
        for pair in pending.windows(2) {
            assert!(pair[0].get_first_seen() < pair[1].get_first_seen());
        }
    }

    #[test]
    fn test_equal_stamps_keep_insertion_order() {
        let pool = MemoryPool::default();
        for payload in ["c", "a", "b"] {
            let mut tx = Transaction::new(payload.as_bytes().to_vec());
            tx.set_first_seen(7);
            pool.add(tx);
        }

        let order: Vec<Vec<u8>> = pool.pending().iter().map(|tx| tx.get_data().to_vec()).collect();
        assert_eq!(order, vec![b"c".to_vec(), b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_remove_included_keeps_late_arrivals() {
        let pool = MemoryPool::default();
        pool.add(Transaction::new(b"one".to_vec()));
        pool.add(Transaction::new(b"two".to_vec()));

        let drained = pool.pending();
        pool.add(Transaction::new(b"late".to_vec()));

        assert_eq!(pool.remove_included(&drained), 2);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.pending()[0].get_data(), b"late");
    }

    #[test]
    fn test_full_pool_evicts_oldest() {
        let pool = MemoryPool::new(2);
        pool.add(Transaction::new(b"first".to_vec()));
        pool.add(Transaction::new(b"second".to_vec()));
        pool.add(Transaction::new(b"third".to_vec()));

        let order: Vec<Vec<u8>> = pool.pending().iter().map(|tx| tx.get_data().to_vec()).collect();
        assert_eq!(order, vec![b"second".to_vec(), b"third".to_vec()]);
    }

    #[test]
    fn test_concurrent_add_and_drain_loses_nothing() {
        let pool = Arc::new(MemoryPool::new(100_000));
        let writers: Vec<_> = (0..4u32)
            .map(|w| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for i in 0..500u32 {
                        pool.add(Transaction::new(format!("{w}-{i}").into_bytes()));
                    }
                })
            })
            .collect();

        let mut drained = HashSet::new();
        while writers.iter().any(|w| !w.is_finished()) {
            let batch = pool.pending();
            pool.remove_included(&batch);
            drained.extend(batch.iter().map(|tx| tx.get_data().to_vec()));
        }
        for writer in writers {
            writer.join().unwrap();
        }
        let rest = pool.pending();
        drained.extend(rest.iter().map(|tx| tx.get_data().to_vec()));

        assert_eq!(drained.len(), 2000);
    }

    #[test]
    fn test_included_transaction_is_not_pooled_again() {
        let pool = MemoryPool::default();
        let tx = random_tx_with_signature();
        let hash = tx.hash(&TxHasher);
        pool.add(tx.clone());

        assert_eq!(pool.remove_included(&[tx.clone()]), 1);
        assert!(pool.was_included(&hash));
        assert!(!pool.add(tx));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_included_elsewhere_is_remembered_too() {
        // A follower may accept a block carrying txs it never pooled
        let pool = MemoryPool::default();
        let tx = random_tx_with_signature();

        assert_eq!(pool.remove_included(&[tx.clone()]), 0);
        assert!(!pool.add(tx));
    }

    #[test]
    fn test_included_history_is_bounded() {
        let pool = MemoryPool::with_history(10, 2);
        let txs: Vec<Transaction> = (0..3u8).map(|i| Transaction::new(vec![i])).collect();
        pool.remove_included(&txs);

        // Only the two most recent hashes are remembered
        assert!(!pool.was_included(&txs[0].hash(&TxHasher)));
        assert!(pool.was_included(&txs[2].hash(&TxHasher)));
        assert!(pool.add(txs[0].clone()));
        assert!(!pool.add(txs[1].clone()));
    }

    #[test]
    fn test_eviction_follows_order_after_removals() {
        let pool = MemoryPool::new(3);
        let txs: Vec<Transaction> = [5i64, 1, 3]
            .iter()
            .map(|stamp| {
                let mut tx = Transaction::new(stamp.to_string().into_bytes());
                tx.set_first_seen(*stamp);
                tx
            })
            .collect();
        for tx in &txs {
            pool.add(tx.clone());
        }

        // Stamp 1 is gone, so stamp 3 is the oldest left
        pool.remove(&txs[1].hash(&TxHasher));
        pool.add(Transaction::new(b"fresh".to_vec()));
        pool.add(Transaction::new(b"fresher".to_vec()));

        let order: Vec<Vec<u8>> = pool.pending().iter().map(|tx| tx.get_data().to_vec()).collect();
        assert_eq!(order, vec![b"5".to_vec(), b"fresh".to_vec(), b"fresher".to_vec()]);
    }
}
