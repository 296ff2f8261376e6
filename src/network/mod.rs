//! Node networking
//!
//! This module handles communication between nodes: the transport
//! abstraction and its in-process implementation, the wire messages, the
//! outbound fan-out queue, and the server event loop that ties them to the
//! chain and the memory pool.

pub mod broadcaster;
pub mod local_transport;
pub mod message;
pub mod server;
pub mod transport;

pub use broadcaster::{Broadcaster, Outbound, DEFAULT_OUTBOUND_CAPACITY};
pub use local_transport::{LocalTransport, DEFAULT_INBOUND_CAPACITY, DEFAULT_PEER_QUEUE_CAPACITY};
pub use message::{
    default_rpc_decode, DecodedMessage, GetStatusMessage, Message, MessageKind, Payload,
    RpcDecodeFn, StatusMessage,
};
pub use server::{Server, ServerHandle, ServerOpts, ServerState, DEFAULT_BLOCK_TIME};
pub use transport::{NetAddr, Rpc, Transport};
