// SPDX-License-Identifier: Apache-2.0

//! Error types for the reconciliation service
//!
//! Repository failures arrive as [`RepositoryError`]; everything the engine
//! itself detects (bad payloads, missing parents, failed steps) is expressed
//! here so the dispatcher can pick the right policy: drop, abort, or retry.

use std::fmt;

use lineage_core::RepositoryError;
use serde::Serialize;
use thiserror::Error;

/// The reconciliation step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStep {
    SoftwareServer,
    Endpoint,
    Connection,
    ConnectorType,
    Database,
    SchemaContainer,
    SchemaType,
    Relationship,
    TableType,
    Table,
    ListColumns,
    Columns,
    RetractView,
}

impl fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SoftwareServer => "software server",
            Self::Endpoint => "endpoint",
            Self::Connection => "connection",
            Self::ConnectorType => "connector type",
            Self::Database => "database",
            Self::SchemaContainer => "schema container",
            Self::SchemaType => "schema type",
            Self::Relationship => "relationship",
            Self::TableType => "table type",
            Self::Table => "table",
            Self::ListColumns => "list columns",
            Self::Columns => "columns",
            Self::RetractView => "retract view",
        };
        f.write_str(name)
    }
}

/// Unified error type for notification processing
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid event: {message}")]
    Validation { message: String },

    #[error("Malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Expected entity missing: {what}")]
    NotFound { what: String },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Reconciliation failed at {step}: {source}")]
    Reconcile {
        step: ReconcileStep,
        #[source]
        source: RepositoryError,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl SyncError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation { message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config { message: msg.into() }
    }

    /// Wraps a repository failure with the step it interrupted
    ///
    /// A missing entity surfaces as [`SyncError::NotFound`] so it aborts the
    /// event instead of being retried.
    pub fn at(step: ReconcileStep, source: RepositoryError) -> Self {
        match source {
            RepositoryError::NotFound { what } => Self::NotFound {
                what: format!("{} ({})", what, step),
            },
            source => Self::Reconcile { step, source },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Repository(e) | Self::Reconcile { source: e, .. } => e.is_retryable(),
            _ => false,
        }
    }

    /// Step that failed, when the error came from a reconciliation step
    pub fn step(&self) -> Option<ReconcileStep> {
        match self {
            Self::Reconcile { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Result type alias for service operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Extension to tag repository results with the step they belong to
pub trait StepContext<T> {
    fn step(self, step: ReconcileStep) -> SyncResult<T>;
}

impl<T> StepContext<T> for Result<T, RepositoryError> {
    fn step(self, step: ReconcileStep) -> SyncResult<T> {
        self.map_err(|e| SyncError::at(step, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_context_keeps_retryability() {
        let res: Result<(), RepositoryError> = Err(RepositoryError::Timeout { timeout_ms: 5 });
        let err = res.step(ReconcileStep::Database).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.step(), Some(ReconcileStep::Database));
        assert_eq!(
            err.to_string(),
            "Reconciliation failed at database: Operation timed out after 5ms"
        );
    }

    #[test]
    fn test_not_found_is_terminal() {
        let err = SyncError::at(ReconcileStep::TableType, RepositoryError::not_found("x"));
        assert!(matches!(err, SyncError::NotFound { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_validation_is_not_retryable() {
        assert!(!SyncError::validation("missing table name").is_retryable());
    }
}
