//! Utility functions and helpers
//!
//! This module contains the signing primitives, digest and clock helpers,
//! and the binary codec used throughout the node.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    current_timestamp, current_timestamp_nanos, sha256_digest, Address, PrivateKey, PublicKey,
    Signature, ADDRESS_LEN,
};

pub use serialization::{deserialize, serialize};
