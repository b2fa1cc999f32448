pub mod gate;
pub mod report;
pub mod runner;

use crate::entity::Entity;
use crate::errors::OperationError;
use async_trait::async_trait;
use std::path::PathBuf;

pub use gate::DestinationGate;
pub use report::{EntityOutcome, RunSummary};
pub use runner::MigrationOrchestrator;

pub type OpResult<T> = Result<T, OperationError>;

/// Local working copy of an entity's source content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalHandle {
    pub path: PathBuf,
}

impl LocalHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// What the destination side already holds for an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationStatus {
    pub exists: bool,
    pub is_empty: bool,
    pub destination_address: Option<String>,
}

impl DestinationStatus {
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn existing(is_empty: bool, destination_address: impl Into<String>) -> Self {
        Self {
            exists: true,
            is_empty,
            destination_address: Some(destination_address.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Non-fatal notices reported by an otherwise successful transfer.
    pub warnings: Vec<String>,
}

/// External operations the orchestrator drives for each entity.
/// Real implementation: `ops::RepositoryOps`. Tests use a scripted double.
///
/// Every failure is reported as plain text; the orchestrator classifies it.
#[async_trait]
pub trait MigrationOps: Send + Sync {
    async fn check_destination(&self, entity: &Entity) -> OpResult<DestinationStatus>;

    async fn fetch_source(&self, entity: &Entity) -> OpResult<LocalHandle>;

    /// Returns the address of the created destination.
    async fn create_destination(&self, entity: &Entity) -> OpResult<String>;

    async fn update_metadata(&self, entity: &Entity) -> OpResult<()>;

    async fn transfer_content(
        &self,
        handle: &LocalHandle,
        destination_address: &str,
    ) -> OpResult<TransferOutcome>;

    async fn verify_final(
        &self,
        handle: &LocalHandle,
        destination_address: &str,
        entity: &Entity,
    ) -> OpResult<()>;

    /// Best-effort removal of the local working copy.
    async fn cleanup(&self, handle: &LocalHandle) -> OpResult<()>;

    /// Where `fetch_source` places the working copy for `entity`.
    ///
    /// Used when a resumed run skips the fetch step.
    fn local_handle(&self, entity: &Entity) -> LocalHandle;

    /// Whether the working copy behind `handle` is still on disk.
    fn local_copy_present(&self, handle: &LocalHandle) -> bool {
        handle.path.exists()
    }

    /// Address the destination for `entity` would have.
    fn destination_address(&self, entity: &Entity) -> String;
}
