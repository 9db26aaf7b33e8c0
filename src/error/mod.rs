//! Error handling for the voting chain
//!
//! Recoverable submission failures, configuration errors and chain
//! validation failures all flow through one enum so callers can `?` them.

use std::fmt;

/// Result type alias for chain operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    /// Vote signature does not verify against its public key
    InvalidSignature,
    /// Claimed voter id is not the one derived from the public key
    IdentityMismatch { claimed: String, derived: String },
    /// Voter already appears in the chain or the pending pool
    DuplicateVoter(String),
    /// Requested proof difficulty is zero or wider than the digest
    InvalidDifficulty { difficulty: u32, max: u32 },
    /// Candidate chain failed structural or cryptographic checks
    ChainValidation(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Database-related errors
    Database(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Configuration errors
    Config(String),
    /// Poisoned node state lock
    Lock(String),
}

impl BlockchainError {
    /// Stable reason code handed back to transports for rejected votes.
    pub fn reason(&self) -> &'static str {
        match self {
            BlockchainError::InvalidSignature => "invalid_signature",
            BlockchainError::IdentityMismatch { .. } => "identity_mismatch",
            BlockchainError::DuplicateVoter(_) => "duplicate_voter",
            BlockchainError::InvalidDifficulty { .. } => "invalid_difficulty",
            BlockchainError::ChainValidation(_) => "chain_validation_failure",
            BlockchainError::Crypto(_) => "crypto_error",
            BlockchainError::Database(_) => "database_error",
            BlockchainError::Serialization(_) => "serialization_error",
            BlockchainError::Io(_) => "io_error",
            BlockchainError::Config(_) => "config_error",
            BlockchainError::Lock(_) => "lock_error",
        }
    }

    /// True for the submission failures that leave the node untouched.
    pub fn is_rejected_vote(&self) -> bool {
        matches!(
            self,
            BlockchainError::InvalidSignature
                | BlockchainError::IdentityMismatch { .. }
                | BlockchainError::DuplicateVoter(_)
        )
    }
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::InvalidSignature => write!(f, "Invalid vote signature"),
            BlockchainError::IdentityMismatch { claimed, derived } => {
                write!(
                    f,
                    "Identity mismatch: claimed {claimed}, public key derives {derived}"
                )
            }
            BlockchainError::DuplicateVoter(voter) => write!(f, "Duplicate voter: {voter}"),
            BlockchainError::InvalidDifficulty { difficulty, max } => {
                write!(f, "Invalid difficulty {difficulty}: must be within [1, {max}]")
            }
            BlockchainError::ChainValidation(msg) => write!(f, "Chain validation failed: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Database(msg) => write!(f, "Database error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Lock(msg) => write!(f, "Lock error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}
