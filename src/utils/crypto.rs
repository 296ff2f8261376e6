use data_encoding::HEXLOWER;
use ring::digest::{Context, SHA256};
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, KeyPair, UnparsedPublicKey, ECDSA_P256_SHA256_FIXED,
    ECDSA_P256_SHA256_FIXED_SIGNING,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{BlockchainError, Result};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of bytes in an [`Address`]
pub const ADDRESS_LEN: usize = 20;

pub fn current_timestamp() -> Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BlockchainError::Crypto(format!("System time error: {e}")))?
        .as_millis();

    // Ensure the timestamp fits in i64
    if duration > i64::MAX as u128 {
        return Err(BlockchainError::Crypto("Timestamp overflow".to_string()));
    }

    Ok(duration as i64)
}

/// Wall-clock time in unix nanoseconds, the resolution headers and first-seen stamps use.
pub fn current_timestamp_nanos() -> Result<i64> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BlockchainError::Crypto(format!("System time error: {e}")))?
        .as_nanos();

    i64::try_from(nanos).map_err(|_| BlockchainError::Crypto("Timestamp overflow".to_string()))
}

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

/// An ECDSA P-256 signing key.
///
/// The PKCS#8 document is kept alongside the parsed key pair so the secret can
/// be wiped when the key is dropped.
pub struct PrivateKey {
    pkcs8: Zeroizing<Vec<u8>>,
    key_pair: EcdsaKeyPair,
}

impl PrivateKey {
    /// Generate a fresh key from the system entropy source.
    pub fn generate() -> Result<PrivateKey> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .map_err(|e| {
                BlockchainError::Crypto(format!("Failed to generate ECDSA key pair: {e}"))
            })?;
        Self::from_pkcs8(pkcs8.as_ref())
    }

    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<PrivateKey> {
        let rng = SystemRandom::new();
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
            .map_err(|e| {
                BlockchainError::Crypto(format!("Failed to create key pair from PKCS8: {e}"))
            })?;
        Ok(PrivateKey {
            pkcs8: Zeroizing::new(pkcs8.to_vec()),
            key_pair,
        })
    }

    pub fn to_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }

    pub fn sign(&self, data: &[u8]) -> Result<Signature> {
        let rng = SystemRandom::new();
        let signature = self
            .key_pair
            .sign(&rng, data)
            .map_err(|e| BlockchainError::Crypto(format!("Failed to sign message: {e}")))?;
        Ok(Signature(signature.as_ref().to_vec()))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.key_pair.public_key().as_ref().to_vec())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Uncompressed SEC1 encoding of a P-256 public key
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> PublicKey {
        PublicKey(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn verify(&self, data: &[u8], signature: &Signature) -> bool {
        let peer_public_key = UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, self.0.as_slice());
        peer_public_key.verify(data, signature.as_bytes()).is_ok()
    }

    pub fn address(&self) -> Address {
        let digest = sha256_digest(self.as_bytes());
        let mut address = [0u8; ADDRESS_LEN];
        address.copy_from_slice(&digest[digest.len() - ADDRESS_LEN..]);
        Address(address)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", HEXLOWER.encode(&self.0))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", HEXLOWER.encode(&self.0))
    }
}

/// Fixed-width (r || s) ECDSA signature
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Signature {
        Signature(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", HEXLOWER.encode(&self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", HEXLOWER.encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let key = PrivateKey::generate().unwrap();
        let data = b"hello world";

        let signature = key.sign(data).unwrap();
        assert!(key.public_key().verify(data, &signature));
        assert!(!key.public_key().verify(b"hello there", &signature));
    }

    #[test]
    fn test_verify_with_other_key_fails() {
        let key = PrivateKey::generate().unwrap();
        let other = PrivateKey::generate().unwrap();

        let signature = key.sign(b"foo").unwrap();
        assert!(!other.public_key().verify(b"foo", &signature));
    }

    #[test]
    fn test_pkcs8_reload_keeps_public_key() {
        let key = PrivateKey::generate().unwrap();
        let reloaded = PrivateKey::from_pkcs8(key.to_pkcs8()).unwrap();
        assert_eq!(key.public_key(), reloaded.public_key());
    }

    #[test]
    fn test_address_is_derived_from_public_key() {
        let key = PrivateKey::generate().unwrap();
        let address = key.public_key().address();

        assert_eq!(address.as_bytes().len(), ADDRESS_LEN);
        assert_eq!(address, key.public_key().address());
        assert_ne!(address, PrivateKey::generate().unwrap().public_key().address());
    }

    #[test]
    fn test_nanosecond_timestamp_is_finer_than_millis() {
        let millis = current_timestamp().unwrap();
        let nanos = current_timestamp_nanos().unwrap();
        assert!(nanos / 1_000_000 >= millis);
    }
}
