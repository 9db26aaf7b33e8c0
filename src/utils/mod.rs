//! Utility functions and helpers
//!
//! This module contains the ring-backed hashing and signing primitives,
//! timestamps, and the bincode layer used by the storage backends.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    current_timestamp, ecdsa_p256_public_key, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, sha256_digest, sha256_hex,
};

pub use serialization::{deserialize, serialize};
