use super::report::{EntityOutcome, RunSummary};
use super::{DestinationGate, LocalHandle, MigrationOps};
use crate::classify::{self, ErrorCategory, downgrade};
use crate::entity::Entity;
use crate::errors::{OperationError, PipelineError, StepFailure, StoreError};
use crate::record::{Milestone, MigrationRecordStore, StepName, StepStatus, StepUpdate};
use crate::retry::RetryPolicy;
use crate::ui::MigrationUI;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives each entity through the migration steps, one entity at a time.
///
/// The orchestrator owns the record store for the duration of a run. Every
/// step transition goes through the store so an interrupted run can resume at
/// the first milestone that is still unset.
pub struct MigrationOrchestrator<O: MigrationOps> {
    ops: O,
    store: MigrationRecordStore,
    retry: RetryPolicy,
    gate: DestinationGate,
    destination_group: String,
    keep_local: bool,
    ui: Option<Arc<MigrationUI>>,
    /// Working copy produced by the fetch step of the current entity.
    handle: Option<LocalHandle>,
    outcomes: Vec<(String, EntityOutcome)>,
}

impl<O: MigrationOps> MigrationOrchestrator<O> {
    pub fn new(ops: O, store: MigrationRecordStore, destination_group: impl Into<String>) -> Self {
        Self {
            ops,
            store,
            retry: RetryPolicy::default(),
            gate: DestinationGate::default(),
            destination_group: destination_group.into(),
            keep_local: false,
            ui: None,
            handle: None,
            outcomes: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_gate(mut self, gate: DestinationGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_ui(mut self, ui: Arc<MigrationUI>) -> Self {
        self.ui = Some(ui);
        self
    }

    /// Keep local working copies after verification instead of removing them.
    pub fn keep_local(mut self, keep: bool) -> Self {
        self.keep_local = keep;
        self
    }

    pub fn ops(&self) -> &O {
        &self.ops
    }

    pub fn store(&self) -> &MigrationRecordStore {
        &self.store
    }

    /// Per-entity outcomes of the most recent `run_pipeline` call.
    pub fn outcomes(&self) -> &[(String, EntityOutcome)] {
        &self.outcomes
    }

    /// Process `entities` in order, each to success or terminal failure.
    ///
    /// A failing entity never stops the run. Only store errors do, since
    /// progress could no longer be recorded.
    pub async fn run_pipeline(&mut self, entities: &[Entity]) -> Result<RunSummary, StoreError> {
        self.outcomes.clear();
        info!(repositories = entities.len(), "Starting migration run");

        for entity in entities {
            let outcome = self.process_entity(entity).await?;
            self.outcomes.push((entity.name.clone(), outcome));
            self.store.save_if_due()?;
        }

        self.store.flush()?;
        if let Some(ui) = &self.ui {
            ui.finish();
        }

        let summary = self.report();
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            warned = summary.warned,
            skipped = summary.skipped,
            "Migration run finished"
        );
        Ok(summary)
    }

    /// Run the pipeline until it finishes or `cancel` resolves.
    ///
    /// Either way the store is flushed before returning. `None` means the run
    /// was cancelled; the entity in flight keeps its last recorded step.
    pub async fn run_until<F>(
        &mut self,
        entities: &[Entity],
        cancel: F,
    ) -> Result<Option<RunSummary>, StoreError>
    where
        F: Future<Output = ()>,
    {
        let result = tokio::select! {
            result = self.run_pipeline(entities) => Some(result),
            _ = cancel => None,
        };

        let flushed = self.store.flush();
        match result {
            Some(result) => {
                let summary = result?;
                flushed?;
                Ok(Some(summary))
            }
            None => {
                flushed?;
                warn!(path = %self.store.path().display(), "Run cancelled, progress saved");
                Ok(None)
            }
        }
    }

    pub fn report(&self) -> RunSummary {
        let skipped = self
            .outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == EntityOutcome::Skipped)
            .count();
        RunSummary::from_store(&self.store, skipped)
    }

    async fn process_entity(&mut self, entity: &Entity) -> Result<EntityOutcome, StoreError> {
        let record = self.store.get_or_create(entity, &self.destination_group)?;
        if record.is_succeeded() {
            info!(entity = %entity.name, "Already migrated, skipping");
            if let Some(ui) = &self.ui {
                ui.repo_skipped(&entity.name);
            }
            return Ok(EntityOutcome::Skipped);
        }
        let state = record.state();

        // Each invocation gets a fresh retry budget.
        let started = Instant::now();
        self.handle = None;
        self.store.update(&entity.name, |r| {
            r.clear_failure();
            r.retry_count = 0;
            r.started_at.get_or_insert_with(Utc::now);
            r.ended_at = None;
            r.duration_ms = None;
        })?;

        info!(entity = %entity.name, state = %state, "Migrating repository");
        if let Some(ui) = &self.ui {
            ui.start_repo(&entity.name);
        }

        loop {
            let failure = match self.drive_steps(entity).await {
                Ok(()) => return self.finish_success(entity, started),
                Err(PipelineError::Store(e)) => return Err(e),
                Err(PipelineError::Step(failure)) => failure,
            };

            if failure.fatal {
                return self.finish_failure(entity, failure);
            }

            let retry_count = self.store.update(&entity.name, |r| {
                r.retry_count += 1;
                r.retry_count
            })?;
            if !self.retry.should_retry(failure.category, retry_count) {
                return self.finish_failure(entity, failure);
            }

            let delay = self.retry.delay(retry_count - 1);
            warn!(
                entity = %entity.name,
                step = %failure.step,
                category = %failure.category,
                attempt = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Step failed, retrying"
            );
            if let Some(ui) = &self.ui {
                ui.retrying(failure.step, failure.category, retry_count, delay);
            }

            self.store.update(&entity.name, |r| r.clear_failure())?;
            self.store.save_if_due()?;
            tokio::time::sleep(delay).await;
        }
    }

    /// Run every step whose milestone is unset, in pipeline order.
    async fn drive_steps(&mut self, entity: &Entity) -> Result<(), PipelineError> {
        if !self.milestone_set(entity, Milestone::DestinationCreated) {
            self.check_destination(entity).await?;
        }

        while let Some(step) = self.store.get(&entity.name).and_then(|r| r.next_step()) {
            match step {
                StepName::CheckDestination => self.check_destination(entity).await?,
                StepName::FetchSource => self.fetch_source(entity).await?,
                StepName::CreateDestination => self.create_destination(entity).await?,
                StepName::UpdateMetadata => self.update_metadata(entity).await?,
                StepName::TransferContent => self.transfer_content(entity).await?,
                StepName::VerifyFinal => self.verify_final(entity).await?,
            }
        }
        Ok(())
    }

    async fn check_destination(&mut self, entity: &Entity) -> Result<(), PipelineError> {
        let step = StepName::CheckDestination;
        self.begin_step(entity, step)?;

        let status = match self.ops.check_destination(entity).await {
            Ok(status) => status,
            Err(e) => return self.settle_failure(entity, step, e),
        };

        if !status.exists {
            self.complete_step(entity, step, StepUpdate::completed())?;
            return Ok(());
        }

        let address = status
            .destination_address
            .unwrap_or_else(|| self.ops.destination_address(entity));

        if !status.is_empty {
            return Err(self.fail_step(
                entity,
                StepFailure::fatal(
                    step,
                    ErrorCategory::Validation,
                    format!("destination {} already exists and is not empty", address),
                ),
            ));
        }

        let confirmed = match self.ui.clone() {
            Some(ui) => ui.suspend(|| self.gate.confirm_reuse(entity, &address)),
            None => self.gate.confirm_reuse(entity, &address),
        };
        if !confirmed {
            return Err(self.fail_step(
                entity,
                StepFailure::fatal(
                    step,
                    ErrorCategory::Validation,
                    format!("destination {} exists and is empty, but reuse was declined", address),
                ),
            ));
        }

        info!(entity = %entity.name, destination = %address, "Reusing empty destination");
        self.store.update(&entity.name, |r| {
            r.destination_address = Some(address);
            r.milestones.set(Milestone::DestinationCreated);
            r.steps
                .record(StepName::CreateDestination, StepUpdate::skipped());
        })?;
        self.complete_step(entity, step, StepUpdate::completed())?;
        if let Some(ui) = &self.ui {
            ui.step_finished(StepName::CreateDestination, StepStatus::Skipped);
        }
        Ok(())
    }

    async fn fetch_source(&mut self, entity: &Entity) -> Result<(), PipelineError> {
        let step = StepName::FetchSource;
        self.begin_step(entity, step)?;

        match self.ops.fetch_source(entity).await {
            Ok(handle) => {
                debug!(entity = %entity.name, path = %handle.path.display(), "Source fetched");
                self.handle = Some(handle);
                self.complete_step(entity, step, StepUpdate::completed())?;
                Ok(())
            }
            Err(e) => self.settle_failure(entity, step, e),
        }
    }

    async fn create_destination(&mut self, entity: &Entity) -> Result<(), PipelineError> {
        let step = StepName::CreateDestination;
        self.begin_step(entity, step)?;

        match self.ops.create_destination(entity).await {
            Ok(address) => {
                debug!(entity = %entity.name, destination = %address, "Destination created");
                self.store
                    .update(&entity.name, |r| r.destination_address = Some(address))?;
                self.complete_step(entity, step, StepUpdate::completed())?;
                Ok(())
            }
            Err(e) => self.settle_failure(entity, step, e),
        }
    }

    async fn update_metadata(&mut self, entity: &Entity) -> Result<(), PipelineError> {
        let step = StepName::UpdateMetadata;
        self.begin_step(entity, step)?;

        match self.ops.update_metadata(entity).await {
            Ok(()) => {
                self.complete_step(entity, step, StepUpdate::completed())?;
                Ok(())
            }
            Err(e) => self.settle_failure(entity, step, e),
        }
    }

    async fn transfer_content(&mut self, entity: &Entity) -> Result<(), PipelineError> {
        let step = StepName::TransferContent;
        let handle = self.ensure_local_copy(entity).await?;
        let address = self.destination_for(entity);
        self.begin_step(entity, step)?;

        match self.ops.transfer_content(&handle, &address).await {
            Ok(outcome) if outcome.warnings.is_empty() => {
                self.complete_step(entity, step, StepUpdate::completed())?;
                Ok(())
            }
            Ok(outcome) => {
                warn!(
                    entity = %entity.name,
                    warnings = outcome.warnings.len(),
                    "Transfer finished with warnings"
                );
                self.complete_step(entity, step, StepUpdate::warning(outcome.warnings))?;
                Ok(())
            }
            Err(e) => self.settle_failure(entity, step, e),
        }
    }

    async fn verify_final(&mut self, entity: &Entity) -> Result<(), PipelineError> {
        let step = StepName::VerifyFinal;
        let handle = self.ensure_local_copy(entity).await?;
        let address = self.destination_for(entity);
        self.begin_step(entity, step)?;

        match self.ops.verify_final(&handle, &address, entity).await {
            Ok(()) => self.complete_step(entity, step, StepUpdate::completed())?,
            Err(e) => self.settle_failure(entity, step, e)?,
        }

        self.cleanup(entity, &handle).await?;
        Ok(())
    }

    /// Remove the working copy. Failures only add a warning.
    async fn cleanup(&mut self, entity: &Entity, handle: &LocalHandle) -> Result<(), StoreError> {
        self.handle = None;
        if self.keep_local {
            debug!(entity = %entity.name, path = %handle.path.display(), "Keeping local copy");
            return Ok(());
        }

        if let Err(e) = self.ops.cleanup(handle).await {
            if downgrade::is_missing_file(e.message()) {
                debug!(entity = %entity.name, path = %handle.path.display(), "Local copy already gone");
                return Ok(());
            }
            warn!(entity = %entity.name, error = %e, "Failed to remove local copy");
            self.store
                .update(&entity.name, |r| r.add_warning(format!("cleanup: {}", e)))?;
        }
        Ok(())
    }

    /// Working copy for the transfer and verify steps.
    ///
    /// A resumed run may find the mirror gone (work directory cleared, state
    /// file moved to another host). The source is fetched again in that case.
    /// Milestones are left alone; a failed refetch is a `fetch-source` failure.
    async fn ensure_local_copy(&mut self, entity: &Entity) -> Result<LocalHandle, PipelineError> {
        let handle = self.local_handle(entity);
        if self.ops.local_copy_present(&handle) {
            return Ok(handle);
        }

        warn!(
            entity = %entity.name,
            path = %handle.path.display(),
            "Local copy missing, fetching the source again"
        );
        let step = StepName::FetchSource;
        self.begin_step(entity, step)?;
        match self.ops.fetch_source(entity).await {
            Ok(handle) => {
                self.handle = Some(handle.clone());
                self.store
                    .record_step(&entity.name, step, StepUpdate::completed())?;
                if let Some(ui) = &self.ui {
                    ui.step_finished(step, StepStatus::Completed);
                }
                Ok(handle)
            }
            Err(e) => {
                self.settle_failure(entity, step, e)?;
                Ok(handle)
            }
        }
    }

    fn begin_step(&mut self, entity: &Entity, step: StepName) -> Result<(), StoreError> {
        debug!(entity = %entity.name, step = %step, "Step started");
        self.store
            .record_step(&entity.name, step, StepUpdate::in_progress())?;
        if let Some(ui) = &self.ui {
            ui.start_step(step);
        }
        self.store.save_if_due()?;
        Ok(())
    }

    /// Set the step's milestone and record its terminal status.
    ///
    /// Warnings carried by `update` are also added to the entity's warnings.
    fn complete_step(
        &mut self,
        entity: &Entity,
        step: StepName,
        update: StepUpdate,
    ) -> Result<(), StoreError> {
        let status = update.status;
        let warnings = update.warnings.clone();
        self.store.update(&entity.name, |r| {
            if let Some(milestone) = step.milestone() {
                r.milestones.set(milestone);
            }
            r.steps.record(step, update);
            for warning in warnings {
                r.add_warning(warning);
            }
        })?;

        debug!(entity = %entity.name, step = %step, status = %status, "Step finished");
        if let Some(ui) = &self.ui {
            ui.step_finished(step, status);
        }
        Ok(())
    }

    /// Downgrade a benign failure to a warning, or record it as failed.
    fn settle_failure(
        &mut self,
        entity: &Entity,
        step: StepName,
        error: OperationError,
    ) -> Result<(), PipelineError> {
        let message = error.message().trim().to_string();

        if downgrade::should_downgrade(step, &message) {
            warn!(
                entity = %entity.name,
                step = %step,
                warning = %message,
                "Treating failure as a warning"
            );
            self.complete_step(entity, step, StepUpdate::warning(vec![message]))?;
            return Ok(());
        }

        let category = classify::classify(&message);
        Err(self.fail_step(entity, StepFailure::new(step, category, message)))
    }

    /// Record `failure` on the step and the entity, returning it for propagation.
    fn fail_step(&mut self, entity: &Entity, failure: StepFailure) -> PipelineError {
        let reason = failure.reason();
        let update = StepUpdate::failed(failure.message.clone(), failure.category);
        let (step, category) = (failure.step, failure.category);

        if let Err(e) = self.store.update(&entity.name, |r| {
            r.steps.record(step, update);
            r.failure_reason = reason;
            r.error_category = Some(category);
        }) {
            return e.into();
        }

        warn!(
            entity = %entity.name,
            step = %step,
            category = %category,
            error = %failure.message,
            "Step failed"
        );
        if let Some(ui) = &self.ui {
            ui.step_finished(step, StepStatus::Failed);
        }
        failure.into()
    }

    fn finish_success(
        &mut self,
        entity: &Entity,
        started: Instant,
    ) -> Result<EntityOutcome, StoreError> {
        let warnings = self.store.update(&entity.name, |r| {
            let now = Utc::now();
            r.ended_at = Some(now);
            r.duration_ms = r.started_at.map(|s| (now - s).num_milliseconds());
            r.warnings.len()
        })?;

        info!(entity = %entity.name, warnings, "Repository migrated");
        if let Some(ui) = &self.ui {
            ui.repo_succeeded(&entity.name, warnings, started.elapsed());
        }
        Ok(EntityOutcome::Succeeded { warnings })
    }

    fn finish_failure(
        &mut self,
        entity: &Entity,
        failure: StepFailure,
    ) -> Result<EntityOutcome, StoreError> {
        let reason = failure.reason();
        let category = failure.category;
        self.store.update(&entity.name, |r| {
            let now = Utc::now();
            r.failure_reason = reason.clone();
            r.error_category = Some(category);
            r.ended_at = Some(now);
            r.duration_ms = r.started_at.map(|s| (now - s).num_milliseconds());
        })?;

        tracing::error!(entity = %entity.name, category = %category, reason = %reason, "Repository failed");
        if let Some(ui) = &self.ui {
            ui.repo_failed(&entity.name, &reason);
        }
        Ok(EntityOutcome::Failed { category, reason })
    }

    fn milestone_set(&self, entity: &Entity, milestone: Milestone) -> bool {
        self.store
            .get(&entity.name)
            .is_some_and(|r| r.milestones.is_set(milestone))
    }

    fn local_handle(&self, entity: &Entity) -> LocalHandle {
        self.handle
            .clone()
            .unwrap_or_else(|| self.ops.local_handle(entity))
    }

    fn destination_for(&self, entity: &Entity) -> String {
        self.store
            .get(&entity.name)
            .and_then(|r| r.destination_address.clone())
            .unwrap_or_else(|| self.ops.destination_address(entity))
    }
}
