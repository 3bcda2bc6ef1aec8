//! Error types for DOM access.

use thiserror::Error;

/// Result type for DOM operations.
pub type Result<T> = std::result::Result<T, DomError>;

/// Errors that can occur while reading or mutating a [`crate::Document`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    /// The node handle does not belong to this document.
    #[error("unknown node")]
    UnknownNode,

    /// The node exists but is not an element.
    #[error("node is not an element")]
    NotAnElement,
}
