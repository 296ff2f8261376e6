//! Configuration management
//!
//! This module handles the node settings: identity, block time, whether the
//! node produces blocks, and the queue and pool capacities. Settings come from
//! defaults, an optional TOML file and environment overrides, in that order.

pub mod settings;

pub use settings::NodeConfig;
