//! Campaign controller: drives one run from criteria to a terminal status.
//!
//! ```text
//! created ──start──▶ building ──build complete──▶ built ──pass──▶ passed
//!                       ▲                           │
//!                       └──critique + update────────┤ fail, iterations < max
//!                                                   └──fail, iterations >= max──▶ failed
//! ```
//!
//! `start_campaign` fails synchronously for anything before `building`; no run
//! is registered in that case. After that, step errors are logged and leave
//! the run in its last non-terminal status for inspection.

use std::sync::Arc;

use shipyard_common::{BuildComplete, MvpCriteria, RunRecord, RunStatus, select_top_idea};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::completion::{BuildTicket, CompletionSource, InlineCompletion};
use super::registry::{RunRegistry, RunSlot};
use super::store::{MemoryRunStore, RunStore, StatusUpdate};
use crate::builder::{BuildDriver, build_prompt};
use crate::errors::CampaignError;
use crate::llm::ProductModel;
use crate::qa::AcceptanceRunner;

pub struct CampaignController {
    model: Arc<dyn ProductModel>,
    builder: Arc<dyn BuildDriver>,
    qa: Arc<dyn AcceptanceRunner>,
    completion: Arc<dyn CompletionSource>,
    registry: RunRegistry,
    store: Arc<dyn RunStore>,
}

impl CampaignController {
    pub fn new(
        model: Arc<dyn ProductModel>,
        builder: Arc<dyn BuildDriver>,
        qa: Arc<dyn AcceptanceRunner>,
    ) -> Self {
        Self {
            model,
            builder,
            qa,
            completion: Arc::new(InlineCompletion::immediate()),
            registry: RunRegistry::new(),
            store: Arc::new(MemoryRunStore::new()),
        }
    }

    pub fn with_completion(mut self, completion: Arc<dyn CompletionSource>) -> Self {
        self.completion = completion;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = store;
        self
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn completion_mode(&self) -> &'static str {
        self.completion.mode()
    }

    /// Ideate, write the spec and create the artifact; register the run in
    /// `building` and, when the completion source allows, drive it inline.
    pub async fn start_campaign(&self, criteria: MvpCriteria) -> Result<Uuid, CampaignError> {
        criteria.validate()?;

        let ideas = self
            .model
            .ideate(&criteria)
            .await
            .map_err(CampaignError::Ideation)?;
        let idea = select_top_idea(&ideas).ok_or(CampaignError::NoIdeas)?.clone();
        info!(idea = %idea.idea, score = idea.score, candidates = ideas.len(), "selected idea");

        let spec = self
            .model
            .write_spec(&criteria, &idea)
            .await
            .map_err(CampaignError::SpecWriting)?;
        info!(
            app = %spec.name,
            checks = spec.acceptance_tests.len(),
            "spec written"
        );

        let artifact = self.builder.create(&build_prompt(&spec)).await?;
        if artifact.id_synthesized {
            warn!(external_id = %artifact.external_id, "tracking run under a synthesized artifact id");
        }

        let max_iterations = criteria.max_iterations;
        let mut record = RunRecord::new(criteria, spec, max_iterations);
        record.external_id = Some(artifact.external_id.clone());
        record.preview_location = Some(artifact.preview_location.clone());
        record.transition_to(RunStatus::Building)?;
        let run_id = record.id;

        self.persist_new(&record).await;
        self.registry.insert(record);
        info!(
            %run_id,
            external_id = %artifact.external_id,
            builder = self.builder.kind(),
            "campaign started"
        );

        let ticket = BuildTicket {
            run_id,
            external_id: artifact.external_id,
            preview_location: Some(artifact.preview_location),
        };
        if let Some(event) = self.completion.after_build(ticket).await {
            self.on_build_complete(event).await;
        }
        Ok(run_id)
    }

    /// Accept a build-complete signal. Unknown runs and runs not in
    /// `building` are ignored, so redelivery is harmless.
    ///
    /// Staleness is judged against the state published when the signal
    /// arrives: it completes the build cycle that was in progress then, and
    /// is dropped if that cycle has been consumed by the time the run's lock
    /// is free.
    pub async fn on_build_complete(&self, event: BuildComplete) {
        let Some(handle) = self.registry.handle(&event.run_id) else {
            debug!(run_id = %event.run_id, "build-complete for unknown run ignored");
            return;
        };
        let seen = handle.snapshot();
        if seen.status != RunStatus::Building {
            debug!(
                run_id = %event.run_id,
                status = %seen.status,
                "build-complete for run not building ignored"
            );
            return;
        }

        let mut run = handle.lock().await;
        if run.status != RunStatus::Building || run.iterations != seen.iterations {
            debug!(
                run_id = %event.run_id,
                status = %run.status,
                received_at_iteration = seen.iterations,
                iteration = run.iterations,
                "stale build-complete ignored"
            );
            return;
        }

        let mut next = Some(event);
        while let Some(event) = next.take() {
            match self.advance(&handle, &mut run, event).await {
                Ok(follow_up) => next = follow_up,
                Err(e) => {
                    error!(
                        run_id = %run.id,
                        status = %run.status,
                        iteration = run.iterations,
                        error = %e,
                        "campaign step failed, run left for inspection"
                    );
                }
            }
        }
        handle.publish(&run);
    }

    /// One `building → built → {passed | failed | building}` step. Returns
    /// the next completion event when the run went back to `building` and the
    /// completion source produced one.
    async fn advance(
        &self,
        slot: &RunSlot,
        run: &mut RunRecord,
        event: BuildComplete,
    ) -> Result<Option<BuildComplete>, CampaignError> {
        if let Some(location) = event.preview_location {
            run.preview_location = Some(location);
        }
        if let (Some(known), Some(reported)) = (&run.external_id, &event.external_id)
            && known != reported
        {
            warn!(run_id = %run.id, %known, %reported, "build-complete carries a different artifact id, keeping the original");
        }
        run.transition_to(RunStatus::Built)?;
        self.persist_status(slot, run).await;

        let location = run
            .preview_location
            .clone()
            .ok_or_else(|| anyhow::anyhow!("run {} has no preview location", run.id))?;
        let report = self
            .qa
            .evaluate(&location, &run.spec.acceptance_tests)
            .await?;
        let failing = report.failing_count();
        run.last_report = Some(report.clone());

        if report.passed {
            run.transition_to(RunStatus::Passed)?;
            self.persist_status(slot, run).await;
            info!(run_id = %run.id, iterations = run.iterations, "run passed");
            return Ok(None);
        }

        if run.iterations_remaining() == 0 {
            run.transition_to(RunStatus::Failed)?;
            self.persist_status(slot, run).await;
            warn!(
                run_id = %run.id,
                iterations = run.iterations,
                failing,
                "run failed, iteration budget exhausted"
            );
            return Ok(None);
        }

        let external_id = run
            .external_id
            .clone()
            .ok_or(CampaignError::MissingExternalId { id: run.id })?;
        let mut change = self
            .model
            .critique(&run.spec, &report)
            .await
            .map_err(CampaignError::Critique)?;
        if change.target_id.is_empty() {
            change.target_id = external_id.clone();
        }
        info!(
            run_id = %run.id,
            iteration = run.iterations + 1,
            failing,
            reason = %change.reason,
            "requesting correction"
        );

        if let Some(preview) = self.builder.update(&external_id, &change).await? {
            run.preview_location = Some(preview);
        }
        run.iterations += 1;
        run.transition_to(RunStatus::Building)?;
        self.persist_status(slot, run).await;

        let ticket = BuildTicket {
            run_id: run.id,
            external_id,
            preview_location: run.preview_location.clone(),
        };
        Ok(self.completion.after_build(ticket).await)
    }

    async fn persist_new(&self, record: &RunRecord) {
        if let Err(e) = self.store.upsert_run(record).await {
            warn!(run_id = %record.id, error = %e, "failed to persist new run");
        }
    }

    /// Publish the step's state to readers, then mirror it to the store.
    async fn persist_status(&self, slot: &RunSlot, record: &RunRecord) {
        slot.publish(record);
        let update = StatusUpdate::from_record(record);
        if let Err(e) = self.store.update_run_status(&update).await {
            warn!(run_id = %record.id, status = %record.status, error = %e, "failed to persist run status");
        }
    }
}
