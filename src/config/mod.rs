//! Configuration management
//!
//! `ConsensusParams` carries every network-wide constant (difficulty bounds,
//! governor thresholds, stake curve). `Settings` adds the per-node bits: the
//! node identifier and where its data lives.
//!
//! Nothing here is global; each node owns its copy.

pub mod params;
pub mod settings;

pub use params::{ConsensusParams, DIGEST_HEX_WIDTH};
pub use settings::Settings;
