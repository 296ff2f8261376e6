//! Wire messages exchanged between nodes
//!
//! Every frame is a [`Message`] envelope: a kind tag plus the codec bytes of the
//! inner payload. [`default_rpc_decode`] turns a raw [`Rpc`] back into a typed
//! [`DecodedMessage`].

use crate::core::{Block, Transaction};
use crate::error::Result;
use crate::network::{NetAddr, Rpc};
use crate::utils::{deserialize, serialize};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Tx,
    Block,
    GetStatus,
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub header: MessageKind,
    pub data: Vec<u8>,
}

impl Message {
    pub fn new(header: MessageKind, data: Vec<u8>) -> Message {
        Message { header, data }
    }

    pub fn from_transaction(tx: &Transaction) -> Result<Message> {
        Ok(Message::new(MessageKind::Tx, tx.serialize()?))
    }

    pub fn from_block(block: &Block) -> Result<Message> {
        Ok(Message::new(MessageKind::Block, block.serialize()?))
    }

    pub fn get_status() -> Result<Message> {
        Ok(Message::new(MessageKind::GetStatus, serialize(&GetStatusMessage {})?))
    }

    pub fn status(status: &StatusMessage) -> Result<Message> {
        Ok(Message::new(MessageKind::Status, serialize(status)?))
    }

    /// Encoded envelope, ready for a transport
    pub fn bytes(&self) -> Result<Vec<u8>> {
        serialize(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetStatusMessage {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub current_height: u32,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Transaction(Transaction),
    Block(Block),
    GetStatus(GetStatusMessage),
    Status(StatusMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub from: NetAddr,
    pub payload: Payload,
}

pub type RpcDecodeFn = fn(Rpc) -> Result<DecodedMessage>;

pub fn default_rpc_decode(rpc: Rpc) -> Result<DecodedMessage> {
    let msg: Message = deserialize(&rpc.payload)?;

    let payload = match msg.header {
        MessageKind::Tx => Payload::Transaction(Transaction::deserialize(&msg.data)?),
        MessageKind::Block => Payload::Block(Block::deserialize(&msg.data)?),
        MessageKind::GetStatus => Payload::GetStatus(deserialize(&msg.data)?),
        MessageKind::Status => Payload::Status(deserialize(&msg.data)?),
    };

    Ok(DecodedMessage {
        from: rpc.from,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Hash;
    use crate::error::BlockchainError;
    use crate::testnet::{random_block, random_tx_with_signature};

    fn rpc(payload: Vec<u8>) -> Rpc {
        Rpc {
            from: NetAddr::from("REMOTE"),
            payload,
        }
    }

    #[test]
    fn test_decode_transaction() {
        let tx = random_tx_with_signature();
        let bytes = Message::from_transaction(&tx).unwrap().bytes().unwrap();

        let decoded = default_rpc_decode(rpc(bytes)).unwrap();
        assert_eq!(decoded.from, NetAddr::from("REMOTE"));
        match decoded.payload {
            Payload::Transaction(got) => {
                assert_eq!(got, tx);
                assert!(got.verify().is_ok());
            }
            other => panic!("expected a transaction, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_block() {
        let block = random_block(1, Hash::zero());
        let bytes = Message::from_block(&block).unwrap().bytes().unwrap();

        assert_eq!(
            default_rpc_decode(rpc(bytes)).unwrap().payload,
            Payload::Block(block)
        );
    }

    #[test]
    fn test_decode_status_pair() {
        let bytes = Message::get_status().unwrap().bytes().unwrap();
        assert_eq!(
            default_rpc_decode(rpc(bytes)).unwrap().payload,
            Payload::GetStatus(GetStatusMessage {})
        );

        let status = StatusMessage {
            current_height: 42,
            id: "LOCAL".to_string(),
        };
        let bytes = Message::status(&status).unwrap().bytes().unwrap();
        assert_eq!(
            default_rpc_decode(rpc(bytes)).unwrap().payload,
            Payload::Status(status)
        );
    }

    #[test]
    fn test_garbage_is_a_codec_error() {
        assert!(matches!(
            default_rpc_decode(rpc(vec![0xff, 0xff, 0xff])),
            Err(BlockchainError::Codec(_))
        ));
    }

    #[test]
    fn test_kind_mismatch_is_a_codec_error() {
        let envelope = Message::new(MessageKind::Block, b"not a block".to_vec());
        assert!(matches!(
            default_rpc_decode(rpc(envelope.bytes().unwrap())),
            Err(BlockchainError::Codec(_))
        ));
    }
}
