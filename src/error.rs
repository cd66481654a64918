//! Error types for the feed.

use crate::types::{DocPath, ItemId};
use thiserror::Error;

/// Main error type for feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A one-shot read or a watch failed at the transport level.
    #[error("Transient read error: {0}")]
    TransientRead(String),

    #[error("Document not found: {0}")]
    NotFound(DocPath),

    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid state: expected {expected}, got {got}")]
    InvalidState { expected: String, got: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cache is locked by another process")]
    Locked,

    #[error("Corruption detected: {0}")]
    Corruption(String),
}

impl FeedError {
    /// Whether the caller may retry the operation unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, FeedError::TransientRead(_) | FeedError::Io(_))
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            FeedError::Deserialization(e.to_string())
        } else {
            FeedError::Serialization(e.to_string())
        }
    }
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
