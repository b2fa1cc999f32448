use super::{Step, StepName, StepStatus};
use crate::classify::ErrorCategory;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Change applied to a step by [`StepLedger::record`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepUpdate {
    pub status: StepStatus,
    pub error: Option<String>,
    pub category: Option<ErrorCategory>,
    pub warnings: Vec<String>,
}

impl StepUpdate {
    pub fn new(status: StepStatus) -> Self {
        Self {
            status,
            error: None,
            category: None,
            warnings: Vec::new(),
        }
    }

    pub fn in_progress() -> Self {
        Self::new(StepStatus::InProgress)
    }

    pub fn completed() -> Self {
        Self::new(StepStatus::Completed)
    }

    pub fn skipped() -> Self {
        Self::new(StepStatus::Skipped)
    }

    pub fn failed(error: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            error: Some(error.into()),
            category: Some(category),
            ..Self::new(StepStatus::Failed)
        }
    }

    pub fn warning(warnings: Vec<String>) -> Self {
        Self {
            warnings,
            ..Self::new(StepStatus::Warning)
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Ordered log of steps for one entity, at most one entry per step name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepLedger(Vec<Step>);

impl StepLedger {
    /// Update the step named `name` in place, or append it if it has never run.
    ///
    /// Entering `in_progress` starts a new attempt: the start time moves
    /// forward and the previous attempt's end time, error and warnings are
    /// dropped. Entering a terminal status stamps the end time and duration.
    pub fn record(&mut self, name: StepName, update: StepUpdate) -> &Step {
        let now = Utc::now();
        let idx = match self.0.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                self.0.push(Step::new(name));
                self.0.len() - 1
            }
        };
        let step = &mut self.0[idx];

        if update.status == StepStatus::InProgress {
            step.started_at = Some(now);
            step.ended_at = None;
            step.duration_ms = None;
            step.error = None;
            step.error_category = None;
            step.warnings.clear();
        } else if update.status.is_terminal() {
            let started = *step.started_at.get_or_insert(now);
            step.ended_at = Some(now);
            step.duration_ms = Some((now - started).num_milliseconds());
        }

        step.status = update.status;
        if update.status == StepStatus::Failed {
            step.error = update.error;
            step.error_category = update.category;
        } else if update.status == StepStatus::Completed {
            step.error = None;
            step.error_category = None;
        }

        for warning in update.warnings {
            if !step.warnings.contains(&warning) {
                step.warnings.push(warning);
            }
        }

        step
    }

    pub fn get(&self, name: StepName) -> Option<&Step> {
        self.0.iter().find(|s| s.name == name)
    }

    pub fn status(&self, name: StepName) -> Option<StepStatus> {
        self.get(name).map(|s| s.status)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_appends_new_step() {
        let mut ledger = StepLedger::default();
        ledger.record(StepName::FetchSource, StepUpdate::in_progress());
        assert_eq!(ledger.len(), 1);
        let step = ledger.get(StepName::FetchSource).unwrap();
        assert_eq!(step.status, StepStatus::InProgress);
        assert!(step.started_at.is_some());
        assert!(step.ended_at.is_none());
    }

    #[test]
    fn test_record_updates_in_place() {
        let mut ledger = StepLedger::default();
        ledger.record(StepName::FetchSource, StepUpdate::in_progress());
        ledger.record(StepName::FetchSource, StepUpdate::completed());
        ledger.record(StepName::FetchSource, StepUpdate::in_progress());
        ledger.record(
            StepName::FetchSource,
            StepUpdate::failed("timed out", ErrorCategory::Network),
        );
        assert_eq!(ledger.len(), 1);
        let step = ledger.get(StepName::FetchSource).unwrap();
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error.as_deref(), Some("timed out"));
        assert_eq!(step.error_category, Some(ErrorCategory::Network));
    }

    #[test]
    fn test_terminal_status_sets_duration() {
        let mut ledger = StepLedger::default();
        ledger.record(StepName::UpdateMetadata, StepUpdate::in_progress());
        let step = ledger.record(StepName::UpdateMetadata, StepUpdate::completed());
        assert!(step.ended_at.is_some());
        let duration = step.duration_ms.unwrap();
        assert!(duration >= 0);
        assert!(step.ended_at.unwrap() >= step.started_at.unwrap());
    }

    #[test]
    fn test_terminal_without_start_uses_now() {
        let mut ledger = StepLedger::default();
        let step = ledger.record(StepName::VerifyFinal, StepUpdate::completed());
        assert_eq!(step.started_at, step.ended_at);
        assert_eq!(step.duration_ms, Some(0));
    }

    #[test]
    fn test_restart_clears_previous_error() {
        let mut ledger = StepLedger::default();
        ledger.record(StepName::TransferContent, StepUpdate::in_progress());
        ledger.record(
            StepName::TransferContent,
            StepUpdate::failed("git push failed", ErrorCategory::TransferOperation),
        );
        let step = ledger.record(StepName::TransferContent, StepUpdate::in_progress());
        assert!(step.error.is_none());
        assert!(step.error_category.is_none());
        assert!(step.duration_ms.is_none());
    }

    #[test]
    fn test_warnings_merge_without_duplicates() {
        let mut ledger = StepLedger::default();
        ledger.record(StepName::TransferContent, StepUpdate::in_progress());
        ledger.record(
            StepName::TransferContent,
            StepUpdate::warning(vec!["protected branch".into()]),
        );
        let step = ledger.record(
            StepName::TransferContent,
            StepUpdate::warning(vec!["protected branch".into(), "hidden ref".into()]),
        );
        assert_eq!(step.warnings, vec!["protected branch", "hidden ref"]);
        assert_eq!(step.status, StepStatus::Warning);
    }

    #[test]
    fn test_ledger_preserves_insertion_order() {
        let mut ledger = StepLedger::default();
        ledger.record(StepName::CheckDestination, StepUpdate::completed());
        ledger.record(StepName::FetchSource, StepUpdate::completed());
        ledger.record(StepName::CheckDestination, StepUpdate::in_progress());
        let names: Vec<_> = ledger.iter().map(|s| s.name).collect();
        assert_eq!(names, vec![StepName::CheckDestination, StepName::FetchSource]);
    }

    #[test]
    fn test_ledger_serializes_as_plain_list() {
        let mut ledger = StepLedger::default();
        ledger.record(StepName::FetchSource, StepUpdate::skipped());
        let value = serde_json::to_value(&ledger).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["name"], "fetch-source");
        assert_eq!(value[0]["status"], "skipped");
    }
}
