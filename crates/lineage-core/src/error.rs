// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for metadata repository adapters
//!
//! Every backing store maps its own failures onto these variants so the
//! reconciliation engine can decide between retrying, skipping a subtree,
//! or aborting an event without knowing which store it talks to.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all repository operations
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Entity not found: {what}")]
    NotFound { what: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("User not authorized: {message}")]
    Unauthorized { message: String },

    #[error("Conflicting entity: {message}")]
    Conflict { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RepositoryError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError { message: msg.into() }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized { message: msg.into() }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict { message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    /// Transient connectivity problems are worth another attempt; everything
    /// else will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Timeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;
