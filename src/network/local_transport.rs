// In-process transport: every endpoint lives in the same program. Each peer
// gets its own bounded outbound queue drained by its own worker task, which
// pushes frames into that peer's inbound channel

use crate::error::{BlockchainError, Result};
use crate::network::{NetAddr, Rpc, Transport};
use async_trait::async_trait;
use log::{debug, error, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockWriteGuard, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Inbound frames buffered per endpoint before senders start waiting
pub const DEFAULT_INBOUND_CAPACITY: usize = 1024;

/// Outbound frames buffered per peer before new ones to that peer are dropped
pub const DEFAULT_PEER_QUEUE_CAPACITY: usize = 1024;

struct PeerLink {
    // Weak so a cyclic peer graph does not keep endpoints alive
    peer: Weak<dyn Transport>,
    // Started on the first send, which always runs inside the runtime
    queue: Option<mpsc::Sender<Rpc>>,
}

pub struct LocalTransport {
    addr: NetAddr,
    peers: RwLock<HashMap<NetAddr, PeerLink>>,
    peer_queue_capacity: usize,
    inbound_tx: mpsc::Sender<Rpc>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Rpc>>>,
}

impl LocalTransport {
    pub fn new(addr: impl Into<NetAddr>) -> LocalTransport {
        Self::with_capacity(addr, DEFAULT_INBOUND_CAPACITY)
    }

    pub fn with_capacity(addr: impl Into<NetAddr>, capacity: usize) -> LocalTransport {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity.max(1));
        LocalTransport {
            addr: addr.into(),
            peers: RwLock::new(HashMap::new()),
            peer_queue_capacity: DEFAULT_PEER_QUEUE_CAPACITY,
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
        }
    }

    pub fn with_peer_queue_capacity(mut self, capacity: usize) -> LocalTransport {
        self.peer_queue_capacity = capacity.max(1);
        self
    }

    /// Connect two endpoints in both directions
    pub fn link(a: &Arc<dyn Transport>, b: &Arc<dyn Transport>) -> Result<()> {
        a.connect(b)?;
        b.connect(a)
    }

    pub fn peer_addrs(&self) -> Vec<NetAddr> {
        match self.peers.read() {
            Ok(peers) => peers.keys().cloned().collect(),
            Err(_) => {
                error!("Failed to acquire read lock on peers of {}", self.addr);
                Vec::new()
            }
        }
    }

    fn spawn_peer_worker(&self, to: NetAddr, peer: Weak<dyn Transport>) -> mpsc::Sender<Rpc> {
        let (queue, mut frames) = mpsc::channel::<Rpc>(self.peer_queue_capacity);
        let from = self.addr.clone();

        tokio::spawn(async move {
            while let Some(rpc) = frames.recv().await {
                let Some(peer) = peer.upgrade() else {
                    debug!("{from}: peer {to} is gone, stopping its outbound worker");
                    break;
                };
                // Waits while the peer is behind; only this peer's queue backs up
                if let Err(e) = peer.deliver(rpc).await {
                    warn!("{from}: delivery to {to} failed: {e}");
                    break;
                }
            }
        });

        queue
    }

    // Hand one frame to the peer's queue without waiting on the peer itself
    fn enqueue_to(&self, to: &NetAddr, link: &mut PeerLink, payload: Vec<u8>) -> Result<()> {
        if link.peer.strong_count() == 0 {
            return Err(BlockchainError::Transport(format!("{}: peer {to} is gone", self.addr)));
        }
        if link.queue.as_ref().map_or(true, |queue| queue.is_closed()) {
            link.queue = Some(self.spawn_peer_worker(to.clone(), link.peer.clone()));
        }
        let Some(queue) = link.queue.as_ref() else {
            return Err(BlockchainError::Transport(format!("{}: no queue for {to}", self.addr)));
        };

        let rpc = Rpc {
            from: self.addr.clone(),
            payload,
        };
        match queue.try_send(rpc) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("{}: outbound queue to {to} full, dropping frame", self.addr);
                Err(BlockchainError::Transport(format!(
                    "{}: outbound queue to {to} full",
                    self.addr
                )))
            }
            Err(TrySendError::Closed(_)) => Err(BlockchainError::Transport(format!(
                "{}: outbound worker for {to} stopped",
                self.addr
            ))),
        }
    }

    fn write_peers(&self) -> Result<RwLockWriteGuard<'_, HashMap<NetAddr, PeerLink>>> {
        self.peers
            .write()
            .map_err(|_| BlockchainError::Transport("peer table lock poisoned".to_string()))
    }

    fn send_now(&self, to: &NetAddr, payload: Vec<u8>) -> Result<()> {
        let mut peers = self.write_peers()?;
        let link = peers.get_mut(to).ok_or_else(|| {
            BlockchainError::Transport(format!("{}: could not send message to unknown peer {to}", self.addr))
        })?;
        self.enqueue_to(to, link, payload)
    }

    fn broadcast_now(&self, payload: Vec<u8>) -> Result<()> {
        let mut peers = self.write_peers()?;
        let mut failures = Vec::new();

        for (addr, link) in peers.iter_mut() {
            if let Err(e) = self.enqueue_to(addr, link, payload.clone()) {
                warn!("{}: broadcast to {addr} failed: {e}", self.addr);
                failures.push(format!("{addr}: {e}"));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BlockchainError::Transport(format!(
                "broadcast failed for {} peer(s): {}",
                failures.len(),
                failures.join("; ")
            )))
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn addr(&self) -> NetAddr {
        self.addr.clone()
    }

    fn connect(&self, peer: &Arc<dyn Transport>) -> Result<()> {
        let mut peers = self.write_peers()?;
        peers.insert(
            peer.addr(),
            PeerLink {
                peer: Arc::downgrade(peer),
                queue: None,
            },
        );
        debug!("{} connected to {}", self.addr, peer.addr());
        Ok(())
    }

    fn consume(&self) -> Result<mpsc::Receiver<Rpc>> {
        let mut slot = self
            .inbound_rx
            .lock()
            .map_err(|_| BlockchainError::Transport("inbound lock poisoned".to_string()))?;
        slot.take().ok_or_else(|| {
            BlockchainError::Transport(format!("{}: inbound channel already consumed", self.addr))
        })
    }

    async fn deliver(&self, rpc: Rpc) -> Result<()> {
        self.inbound_tx
            .send(rpc)
            .await
            .map_err(|_| BlockchainError::Transport(format!("{}: inbound channel closed", self.addr)))
    }

    async fn send_message(&self, to: &NetAddr, payload: Vec<u8>) -> Result<()> {
        self.send_now(to, payload)
    }

    async fn broadcast(&self, payload: Vec<u8>) -> Result<()> {
        self.broadcast_now(payload)
    }
}
#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(addr: &str) -> Arc<dyn Transport> {
        Arc::new(LocalTransport::new(addr))
    }

    #[tokio::test]
    async fn test_connect_and_send() {
        let a = endpoint("A");
        let b = endpoint("B");
        LocalTransport::link(&a, &b).unwrap();

        let mut rx = b.consume().unwrap();
        a.send_message(&b.addr(), b"hello world".to_vec()).await.unwrap();

        let rpc = rx.recv().await.unwrap();
        assert_eq!(rpc.from, NetAddr::from("A"));
        assert_eq!(rpc.payload, b"hello world");
    }

    #[test]
    fn test_peer_addrs() {
        let a = Arc::new(LocalTransport::new("A"));
        assert!(a.peer_addrs().is_empty());

        let b = endpoint("B");
        a.connect(&b).unwrap();
        assert_eq!(a.peer_addrs(), vec![NetAddr::from("B")]);
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer_fails() {
        let a = endpoint("A");
        let result = a.send_message(&NetAddr::from("nowhere"), vec![1]).await;
        assert!(matches!(result, Err(BlockchainError::Transport(_))));
    }

    #[tokio::test]
    async fn test_consume_only_once() {
        let a = endpoint("A");
        assert!(a.consume().is_ok());
        assert!(matches!(a.consume(), Err(BlockchainError::Transport(_))));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_peer() {
        let a = endpoint("A");
        let b = endpoint("B");
        let c = endpoint("C");
        LocalTransport::link(&a, &b).unwrap();
        LocalTransport::link(&a, &c).unwrap();

        let mut rx_b = b.consume().unwrap();
        let mut rx_c = c.consume().unwrap();
        a.broadcast(b"foo".to_vec()).await.unwrap();

        assert_eq!(rx_b.recv().await.unwrap().payload, b"foo");
        assert_eq!(rx_c.recv().await.unwrap().payload, b"foo");
    }

    #[tokio::test]
    async fn test_broadcast_survives_a_dead_peer() {
        let a = endpoint("A");
        let b = endpoint("B");
        LocalTransport::link(&a, &b).unwrap();
        {
            let gone = endpoint("GONE");
            a.connect(&gone).unwrap();
        }

        let mut rx_b = b.consume().unwrap();
        let result = a.broadcast(b"still arrives".to_vec()).await;

        assert!(matches!(result, Err(BlockchainError::Transport(_))));
        assert_eq!(rx_b.recv().await.unwrap().payload, b"still arrives");
    }

    #[tokio::test]
    async fn test_peers_do_not_keep_each_other_alive() {
        let a = endpoint("A");
        let b = endpoint("B");
        LocalTransport::link(&a, &b).unwrap();

        let weak_b = Arc::downgrade(&b);
        drop(b);
        assert!(weak_b.upgrade().is_none());
        assert!(a.send_message(&NetAddr::from("B"), vec![0]).await.is_err());
    }

    #[tokio::test]
    async fn test_full_inbound_channel_waits_instead_of_dropping() {
        let a = endpoint("A");
        let b: Arc<dyn Transport> = Arc::new(LocalTransport::with_capacity("B", 2));
        LocalTransport::link(&a, &b).unwrap();
        let mut rx = b.consume().unwrap();

        let sender = Arc::clone(&a);
        let to = b.addr();
        let producer = tokio::spawn(async move {
            for i in 0..10u8 {
                sender.send_message(&to, vec![i]).await.unwrap();
            }
        });

        let mut received = Vec::new();
        for _ in 0..10 {
            received.push(rx.recv().await.unwrap().payload[0]);
        }
        producer.await.unwrap();

        assert_eq!(received, (0..10u8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_stuck_peer_does_not_hold_back_the_others() {
        let a: Arc<dyn Transport> = Arc::new(LocalTransport::new("A").with_peer_queue_capacity(4));
        // Room for one frame and nobody ever reads it
        let stuck: Arc<dyn Transport> = Arc::new(LocalTransport::with_capacity("STUCK", 1));
        let healthy = endpoint("HEALTHY");
        LocalTransport::link(&a, &stuck).unwrap();
        LocalTransport::link(&a, &healthy).unwrap();
        let mut rx = healthy.consume().unwrap();

        let mut failed = 0;
        for i in 0..50u8 {
            if a.broadcast(vec![i]).await.is_err() {
                failed += 1;
            }
            assert_eq!(rx.recv().await.unwrap().payload, vec![i]);
        }

        // One frame sits in STUCK's inbound, one in its worker, four in its queue
        assert!(failed >= 50 - 6);
    }

    #[tokio::test]
    async fn test_full_peer_queue_drops_only_that_peer() {
        let a: Arc<dyn Transport> = Arc::new(LocalTransport::new("A").with_peer_queue_capacity(1));
        let stuck: Arc<dyn Transport> = Arc::new(LocalTransport::with_capacity("STUCK", 1));
        let healthy = endpoint("HEALTHY");
        LocalTransport::link(&a, &stuck).unwrap();
        LocalTransport::link(&a, &healthy).unwrap();
        let mut rx = healthy.consume().unwrap();

        let mut results = Vec::new();
        for i in 0..8u8 {
            results.push(a.send_message(&stuck.addr(), vec![i]).await);
            tokio::task::yield_now().await;
        }
        assert!(results.iter().any(|r| matches!(r, Err(BlockchainError::Transport(_)))));

        a.send_message(&healthy.addr(), b"unaffected".to_vec()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().payload, b"unaffected");
    }
}
