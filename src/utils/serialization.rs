// Codec layer shared by blocks, transactions and wire messages
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

/// Serialize data using bincode 2.0 with standard configuration
pub fn serialize<T: Serialize>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::serde::encode_to_vec(data, config)
        .map_err(|e| BlockchainError::Codec(format!("Serialization failed: {e}")))
}

/// Deserialize data using bincode 2.0 with standard configuration
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let config = bincode::config::standard();
    let (data, _) = bincode::serde::decode_from_slice(bytes, config)
        .map_err(|e| BlockchainError::Codec(format!("Deserialization failed: {e}")))?;
    Ok(data)
}
