//! Typed error hierarchy for the migrator.
//!
//! - `StoreError`: persistence of migration records
//! - `OperationError`: raw failure text returned by a collaborator operation
//! - `StepFailure`: a classified failure of one pipeline step
//! - `PipelineError`: what the per-entity step driver can return

use crate::classify::ErrorCategory;
use crate::record::StepName;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the migration record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read state file at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse state file at {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize migration records: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    #[error("Failed to write state file at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to back up state file to {path}: {source}")]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file {path} is locked by another migrator run")]
    Locked { path: PathBuf },

    #[error("No migration record for '{0}'")]
    UnknownEntity(String),
}

/// Failure description returned by a collaborator operation.
///
/// The text is the only thing the orchestrator looks at: it is classified and
/// matched against the downgrade catalogue, then stored on the record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct OperationError(pub String);

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<anyhow::Error> for OperationError {
    fn from(err: anyhow::Error) -> Self {
        Self(format!("{:#}", err))
    }
}

/// A classified step failure.
#[derive(Debug, Clone, Error)]
#[error("{step} failed [{category}]: {message}")]
pub struct StepFailure {
    pub step: StepName,
    pub category: ErrorCategory,
    pub message: String,
    /// Terminal regardless of the retry policy.
    pub fatal: bool,
}

impl StepFailure {
    pub fn new(step: StepName, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            step,
            category,
            message: message.into(),
            fatal: false,
        }
    }

    pub fn fatal(step: StepName, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            fatal: true,
            ..Self::new(step, category, message)
        }
    }

    /// Human-readable, category-tagged reason stored on the record.
    pub fn reason(&self) -> String {
        format!("[{}] {}: {}", self.category, self.step, self.message)
    }
}

/// Errors from driving one entity through its steps.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Step(#[from] StepFailure),

    #[error(transparent)]
    Store(#[from] StoreError),
}
