//! Aggregate outcome of a migration run.

use crate::classify::ErrorCategory;
use crate::record::{MigrationRecord, MigrationRecordStore, MigrationState};
use serde::Serialize;

/// How one entity left the orchestrator in the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityOutcome {
    /// Already complete when the run reached it.
    Skipped,
    Succeeded { warnings: usize },
    Failed { category: ErrorCategory, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureDetail {
    pub name: String,
    pub category: Option<ErrorCategory>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarningDetail {
    pub name: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingDetail {
    pub name: String,
    pub state: String,
}

/// Counts and per-entity detail over every configured repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Succeeded, but carrying non-fatal warnings.
    pub warned: usize,
    /// Short-circuited in this run because they were already complete.
    pub skipped: usize,
    /// Neither succeeded nor failed yet.
    pub pending: usize,
    pub failures: Vec<FailureDetail>,
    pub warnings: Vec<WarningDetail>,
    pub unfinished: Vec<PendingDetail>,
}

impl RunSummary {
    /// Build the summary from the store's current records.
    pub fn from_store(store: &MigrationRecordStore, skipped: usize) -> Self {
        let mut summary = Self {
            total: store.configured_names().len(),
            skipped,
            ..Self::default()
        };

        for name in store.configured_names() {
            match store.get(name) {
                Some(record) => summary.add_record(record),
                None => {
                    summary.pending += 1;
                    summary.unfinished.push(PendingDetail {
                        name: name.clone(),
                        state: MigrationState::NotStarted.to_string(),
                    });
                }
            }
        }
        summary
    }

    fn add_record(&mut self, record: &MigrationRecord) {
        if record.has_failure() {
            self.failed += 1;
            self.failures.push(FailureDetail {
                name: record.name.clone(),
                category: record.error_category,
                reason: record.failure_reason.clone(),
            });
        } else if record.is_complete() {
            self.succeeded += 1;
            if !record.warnings.is_empty() {
                self.warned += 1;
            }
        } else {
            self.pending += 1;
            self.unfinished.push(PendingDetail {
                name: record.name.clone(),
                state: record.state().to_string(),
            });
        }

        if !record.warnings.is_empty() {
            self.warnings.push(WarningDetail {
                name: record.name.clone(),
                warnings: record.warnings.clone(),
            });
        }
    }

    /// Percentage of configured repositories that succeeded.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total as f64 * 100.0
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.pending == 0
    }
}
