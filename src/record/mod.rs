//! Per-entity migration records.
//!
//! A [`MigrationRecord`] holds everything the orchestrator knows about one
//! repository: identity, timing, the five milestone flags, the step ledger,
//! accumulated warnings and the unresolved failure (if any).
//!
//! Pipeline states, derived from the milestone flags:
//!
//! ```text
//! not-started -> source-fetched -> destination-created -> metadata-updated
//!             -> content-transferred -> final-verified
//! ```

pub mod ledger;
pub mod store;

pub use ledger::{StepLedger, StepUpdate};
pub use store::{MigrationRecordStore, StoreOptions};

use crate::classify::ErrorCategory;
use crate::entity::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named stage of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepName {
    CheckDestination,
    FetchSource,
    CreateDestination,
    UpdateMetadata,
    TransferContent,
    VerifyFinal,
}

impl StepName {
    pub const ALL: [StepName; 6] = [
        StepName::CheckDestination,
        StepName::FetchSource,
        StepName::CreateDestination,
        StepName::UpdateMetadata,
        StepName::TransferContent,
        StepName::VerifyFinal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepName::CheckDestination => "check-destination",
            StepName::FetchSource => "fetch-source",
            StepName::CreateDestination => "create-destination",
            StepName::UpdateMetadata => "update-metadata",
            StepName::TransferContent => "transfer-content",
            StepName::VerifyFinal => "verify-final",
        }
    }

    /// The milestone a successful run of this step establishes.
    ///
    /// The destination check is a pre-step and has none of its own.
    pub fn milestone(self) -> Option<Milestone> {
        match self {
            StepName::CheckDestination => None,
            StepName::FetchSource => Some(Milestone::SourceFetched),
            StepName::CreateDestination => Some(Milestone::DestinationCreated),
            StepName::UpdateMetadata => Some(Milestone::MetadataUpdated),
            StepName::TransferContent => Some(Milestone::ContentTransferred),
            StepName::VerifyFinal => Some(Milestone::FinalVerified),
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
    Warning,
}

impl StepStatus {
    /// Statuses that close a step and fix its duration.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Warning
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::Warning => "warning",
        };
        f.write_str(s)
    }
}

/// One tracked execution of a pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: StepName,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Step {
    pub fn new(name: StepName) -> Self {
        Self {
            name,
            status: StepStatus::Pending,
            started_at: None,
            ended_at: None,
            duration_ms: None,
            error: None,
            error_category: None,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    SourceFetched,
    DestinationCreated,
    MetadataUpdated,
    ContentTransferred,
    FinalVerified,
}

/// The five milestone flags.
///
/// Flags only ever go from `false` to `true`; there is no setter that clears
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Milestones {
    #[serde(default)]
    pub source_fetched: bool,
    #[serde(default)]
    pub destination_created: bool,
    #[serde(default)]
    pub metadata_updated: bool,
    #[serde(default)]
    pub content_transferred: bool,
    #[serde(default)]
    pub final_verified: bool,
}

impl Milestones {
    pub fn set(&mut self, milestone: Milestone) {
        match milestone {
            Milestone::SourceFetched => self.source_fetched = true,
            Milestone::DestinationCreated => self.destination_created = true,
            Milestone::MetadataUpdated => self.metadata_updated = true,
            Milestone::ContentTransferred => self.content_transferred = true,
            Milestone::FinalVerified => self.final_verified = true,
        }
    }

    pub fn is_set(&self, milestone: Milestone) -> bool {
        match milestone {
            Milestone::SourceFetched => self.source_fetched,
            Milestone::DestinationCreated => self.destination_created,
            Milestone::MetadataUpdated => self.metadata_updated,
            Milestone::ContentTransferred => self.content_transferred,
            Milestone::FinalVerified => self.final_verified,
        }
    }

    pub fn all_set(&self) -> bool {
        self.source_fetched
            && self.destination_created
            && self.metadata_updated
            && self.content_transferred
            && self.final_verified
    }
}

/// Pipeline position derived from the milestone flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MigrationState {
    NotStarted,
    SourceFetched,
    DestinationCreated,
    MetadataUpdated,
    ContentTransferred,
    FinalVerified,
}

impl std::fmt::Display for MigrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MigrationState::NotStarted => "not-started",
            MigrationState::SourceFetched => "source-fetched",
            MigrationState::DestinationCreated => "destination-created",
            MigrationState::MetadataUpdated => "metadata-updated",
            MigrationState::ContentTransferred => "content-transferred",
            MigrationState::FinalVerified => "final-verified",
        };
        f.write_str(s)
    }
}

/// Steps that own a milestone, in pipeline order.
const MILESTONE_STEPS: [StepName; 5] = [
    StepName::FetchSource,
    StepName::CreateDestination,
    StepName::UpdateMetadata,
    StepName::TransferContent,
    StepName::VerifyFinal,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub source_address: String,
    #[serde(default)]
    pub destination_group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(flatten)]
    pub milestones: Milestones,
    /// Empty when there is no unresolved failure.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub failure_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    #[serde(default)]
    pub steps: StepLedger,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub retry_count: u32,
    pub last_updated: DateTime<Utc>,
}

impl MigrationRecord {
    pub fn new(entity: &Entity, destination_group: &str) -> Self {
        Self {
            name: entity.name.clone(),
            description: entity.description.clone(),
            source_address: entity.source_address.clone(),
            destination_group: destination_group.to_string(),
            destination_address: None,
            started_at: None,
            ended_at: None,
            duration_ms: None,
            milestones: Milestones::default(),
            failure_reason: String::new(),
            error_category: None,
            steps: StepLedger::default(),
            warnings: Vec::new(),
            retry_count: 0,
            last_updated: Utc::now(),
        }
    }

    pub fn state(&self) -> MigrationState {
        let m = &self.milestones;
        if !m.source_fetched {
            MigrationState::NotStarted
        } else if !m.destination_created {
            MigrationState::SourceFetched
        } else if !m.metadata_updated {
            MigrationState::DestinationCreated
        } else if !m.content_transferred {
            MigrationState::MetadataUpdated
        } else if !m.final_verified {
            MigrationState::ContentTransferred
        } else {
            MigrationState::FinalVerified
        }
    }

    /// First milestone-owning step whose flag is still false.
    pub fn next_step(&self) -> Option<StepName> {
        MILESTONE_STEPS.into_iter().find(|step| {
            step.milestone()
                .is_some_and(|m| !self.milestones.is_set(m))
        })
    }

    pub fn is_complete(&self) -> bool {
        self.milestones.all_set()
    }

    pub fn has_failure(&self) -> bool {
        !self.failure_reason.is_empty()
    }

    /// Pipeline complete with no unresolved failure.
    pub fn is_succeeded(&self) -> bool {
        self.is_complete() && !self.has_failure()
    }

    /// Completed pipeline or unresolved failure.
    pub fn is_terminal(&self) -> bool {
        self.is_complete() || self.has_failure()
    }

    /// Append a warning unless the same text is already recorded.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    /// Clear the failure text so a step can be restarted.
    ///
    /// Milestone flags are left untouched.
    pub fn clear_failure(&mut self) {
        self.failure_reason.clear();
        self.error_category = None;
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}
