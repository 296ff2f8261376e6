use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Address of a transport endpoint, unique within a peer graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetAddr(String);

impl NetAddr {
    pub fn new(addr: impl Into<String>) -> NetAddr {
        NetAddr(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetAddr {
    fn from(addr: &str) -> Self {
        NetAddr(addr.to_string())
    }
}

impl From<String> for NetAddr {
    fn from(addr: String) -> Self {
        NetAddr(addr)
    }
}

/// Raw inbound frame: who sent it and the encoded message bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rpc {
    pub from: NetAddr,
    pub payload: Vec<u8>,
}

/// Capability set a node needs from a network link.
///
/// `deliver` is the inbound side other peers push into; `send_message` and
/// `broadcast` are the outbound side. The inbound receiver is handed out once.
#[async_trait]
pub trait Transport: Send + Sync {
    fn addr(&self) -> NetAddr;

    fn connect(&self, peer: &Arc<dyn Transport>) -> Result<()>;

    fn consume(&self) -> Result<mpsc::Receiver<Rpc>>;

    async fn deliver(&self, rpc: Rpc) -> Result<()>;

    async fn send_message(&self, to: &NetAddr, payload: Vec<u8>) -> Result<()>;

    /// Send to every connected peer. A failing peer never stops delivery to the rest.
    async fn broadcast(&self, payload: Vec<u8>) -> Result<()>;
}
