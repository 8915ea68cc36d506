//! Sequential lifecycle pipeline.
//!
//! A [`PipelineRun`] is consumed by [`PipelineRun::step`], which hands back the
//! run for the next phase only after the current phase has finished. Owning the
//! returned value is the only way to start the following phase, so phases can
//! never overlap on the shared mounts.

use chrono::Utc;
use cnb_core::{LifecyclePlan, PhaseSpec, RunState};
use engine::{ExecutionEnvironment, FilesystemHandle};
use events::Event;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vcs::SourceSnapshot;

use crate::cancel::CancelSignal;
use crate::core::{execute_phase, OrderedEventEmitter, PhaseExecution, PhaseRecord, PipelineOutput};
use crate::error::{OrchestratorError, Result};
use crate::request::{PipelineSettings, RequestBuilder};
use crate::state_machine::RunStateMachine;

/// Everything a run needs, fixed before the first phase starts.
pub struct Pipeline<'a> {
    engine: &'a dyn ExecutionEnvironment,
    plan: &'a LifecyclePlan,
    requests: RequestBuilder<'a>,
    cancel: CancelSignal,
    emitter: Option<OrderedEventEmitter>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        engine: &'a dyn ExecutionEnvironment,
        plan: &'a LifecyclePlan,
        requests: RequestBuilder<'a>,
    ) -> Self {
        Self {
            engine,
            plan,
            requests,
            cancel: CancelSignal::never(),
            emitter: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_emitter(mut self, emitter: OrderedEventEmitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.requests.run_id()
    }

    /// Begin the run in the `Pending` state.
    pub fn start(self) -> PipelineRun<'a> {
        info!(
            run_id = %self.run_id(),
            phases = ?self.plan.names(),
            engine = self.engine.name(),
            "Starting lifecycle pipeline"
        );

        let run = PipelineRun {
            pipeline: self,
            state: RunState::Pending,
            next: 0,
            previous: None,
            records: Vec::new(),
            started: Instant::now(),
        };
        run.emit(Event::PipelineStarted {
            run_id: run.pipeline.run_id(),
            phases: run.pipeline.plan.names().iter().map(|n| n.to_string()).collect(),
        });
        run
    }
}

/// Outcome of one [`PipelineRun::step`].
pub enum Step<'a> {
    /// More phases remain
    Next(PipelineRun<'a>),
    /// The last phase succeeded
    Done(PipelineOutput),
}

/// A pipeline between two phases.
pub struct PipelineRun<'a> {
    pipeline: Pipeline<'a>,
    state: RunState,
    next: usize,
    /// Handle of the newest successful phase; older ones are released as soon as it exists
    previous: Option<FilesystemHandle>,
    records: Vec<PhaseRecord>,
    started: Instant,
}

impl<'a> PipelineRun<'a> {
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// The phase the next call to [`step`](Self::step) will execute.
    pub fn next_phase(&self) -> Option<&PhaseSpec> {
        self.pipeline.plan.get(self.next)
    }

    pub fn completed(&self) -> &[PhaseRecord] {
        &self.records
    }

    /// Execute the next phase.
    ///
    /// Any failure is terminal: the remaining phases are skipped and every
    /// handle the run still holds is released before the error is returned.
    pub async fn step(mut self) -> Result<Step<'a>> {
        let index = self.next;
        let total = self.pipeline.plan.len();
        let phase = self
            .pipeline
            .plan
            .get(index)
            .cloned()
            .ok_or_else(|| OrchestratorError::InvalidTransition {
                from: self.state.to_string(),
                to: format!("running({})", index),
            })?;
        let run_id = self.pipeline.run_id();

        if self.pipeline.cancel.is_cancelled() {
            info!(run_id = %run_id, phase = %phase.name, "Cancelled before phase start");
            self.transition(RunState::Cancelled { index })?;
            self.release_previous().await;
            return Err(OrchestratorError::cancelled(Some(&phase.name)));
        }

        self.transition(RunState::Running {
            index,
            phase: phase.name.clone(),
        })?;
        self.emit(Event::PhaseStarted {
            run_id,
            index,
            total,
            phase: phase.name.clone(),
        });

        let request = self.pipeline.requests.build(&phase);
        info!(
            run_id = %run_id,
            phase = %phase.name,
            environment = %request.name,
            "Phase {}/{} starting",
            index + 1,
            total
        );

        let started_at = Utc::now();
        let clock = Instant::now();
        let execution = execute_phase(self.pipeline.engine, &self.pipeline.cancel, &request).await;
        let duration = clock.elapsed();

        match execution {
            PhaseExecution::Completed(Ok(handle)) => {
                info!(
                    run_id = %run_id,
                    phase = %phase.name,
                    handle = %handle,
                    duration_ms = millis(duration),
                    "Phase succeeded"
                );
                self.release_previous().await;
                self.previous = Some(handle);
                self.records.push(PhaseRecord {
                    index,
                    name: phase.name.clone(),
                    started_at,
                    duration,
                });
                self.emit(Event::PhaseSucceeded {
                    run_id,
                    index,
                    phase: phase.name.clone(),
                    duration_ms: millis(duration),
                });

                if index + 1 < total {
                    self.next = index + 1;
                    return Ok(Step::Next(self));
                }
                self.finish()
            }
            PhaseExecution::Completed(Err(source)) => {
                error!(run_id = %run_id, phase = %phase.name, "Phase failed: {}", source);
                self.transition(RunState::Failed {
                    index,
                    phase: phase.name.clone(),
                })?;
                self.emit(Event::PhaseFailed {
                    run_id,
                    index,
                    phase: phase.name.clone(),
                    error: source.to_string(),
                });
                self.release_previous().await;
                Err(OrchestratorError::phase_failed(phase.name, index, source))
            }
            PhaseExecution::Cancelled => {
                warn!(run_id = %run_id, phase = %phase.name, "Phase cancelled");
                self.transition(RunState::Cancelled { index })?;
                self.release_previous().await;
                Err(OrchestratorError::cancelled(Some(&phase.name)))
            }
        }
    }

    /// Step until the last phase has run.
    pub async fn run_to_completion(self) -> Result<PipelineOutput> {
        let mut run = self;
        loop {
            match run.step().await? {
                Step::Next(next) => run = next,
                Step::Done(output) => return Ok(output),
            }
        }
    }

    fn finish(mut self) -> Result<Step<'a>> {
        self.transition(RunState::Succeeded)?;

        let duration = self.started.elapsed();
        let run_id = self.pipeline.run_id();
        self.emit(Event::PipelineSucceeded {
            run_id,
            duration_ms: millis(duration),
        });

        let handle = self.previous.take().ok_or_else(|| OrchestratorError::InvalidTransition {
            from: self.state.to_string(),
            to: "succeeded without a handle".to_string(),
        })?;
        info!(run_id = %run_id, handle = %handle, "Pipeline succeeded");

        Ok(Step::Done(PipelineOutput {
            handle,
            phases: std::mem::take(&mut self.records),
            duration,
        }))
    }

    fn transition(&mut self, to: RunState) -> Result<()> {
        RunStateMachine::validate_transition(&self.state, &to, self.pipeline.plan.len())?;
        debug!(run_id = %self.pipeline.run_id(), from = %self.state, to = %to, "Run state changed");
        self.state = to;
        Ok(())
    }

    async fn release_previous(&mut self) {
        if let Some(handle) = self.previous.take() {
            if let Err(e) = self.pipeline.engine.discard(&handle).await {
                warn!(handle = %handle, "Failed to discard intermediate handle: {}", e);
            }
        }
    }

    fn emit(&self, event: Event) {
        if let Some(ref emitter) = self.pipeline.emitter {
            emitter.emit(event);
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Run every phase of `plan` against `snapshot` and return the final handle.
pub async fn run_pipeline(
    snapshot: &SourceSnapshot,
    plan: &LifecyclePlan,
    settings: &PipelineSettings,
    engine: &dyn ExecutionEnvironment,
    cancel: CancelSignal,
) -> Result<PipelineOutput> {
    settings.validate()?;
    let requests = RequestBuilder::new(settings, snapshot, Uuid::new_v4());

    Pipeline::new(engine, plan, requests)
        .with_cancel(cancel)
        .start()
        .run_to_completion()
        .await
}
