//! Sequential orchestration of the delivery pipeline.
//!
//! One worker invocation is in flight at a time; the loop blocks on it (or
//! its timeout) before parsing output and transitioning. Signal application
//! is strictly ordered: exactly one event is consumed per iteration, so
//! guard state (attempt counters) is never applied out of order.

use chrono::Utc;
use std::sync::Arc;

use crate::config::Config;
use crate::context::WorkflowContext;
use crate::errors::OrchestratorError;
use crate::machine::{self, Event};
use crate::notify::NotificationSink;
use crate::phase::Phase;
use crate::signals;
use crate::store::ProgressStore;
use crate::stuck::{
    self, CategoryStuckState, DEFAULT_CATEGORY_THRESHOLD, DEFAULT_STUCK_THRESHOLD, StuckTrigger,
};
use crate::tasks::{self, WorkerTask};
use crate::ui::OrchestratorUi;
use crate::worker::{Executor, InvokeOptions};

/// Final outcome of a run, terminal or ceiling-bounded.
#[derive(Debug, Clone)]
pub struct WorkflowResult {
    pub success: bool,
    pub final_phase: Phase,
    pub final_context: WorkflowContext,
    pub iterations: u32,
}

pub struct Orchestrator<E: Executor> {
    config: Config,
    executor: E,
    store: ProgressStore,
    sink: Box<dyn NotificationSink>,
    ui: Option<Arc<OrchestratorUi>>,
    phase: Phase,
    context: WorkflowContext,
    iteration: u32,
    stuck: CategoryStuckState,
}

impl<E: Executor> Orchestrator<E> {
    pub fn new(config: Config, executor: E, sink: Box<dyn NotificationSink>) -> Self {
        let store = ProgressStore::new(config.progress_file.clone());
        Self {
            executor,
            store,
            sink,
            ui: None,
            phase: Phase::Idle,
            context: WorkflowContext::new(Utc::now()),
            iteration: 0,
            stuck: CategoryStuckState::new(),
            config,
        }
    }

    pub fn with_ui(mut self, ui: Arc<OrchestratorUi>) -> Self {
        self.ui = Some(ui);
        self
    }

    /// Start a fresh workflow from the given research artifact reference.
    pub async fn run(&mut self, input: &str) -> Result<WorkflowResult, OrchestratorError> {
        if let Some(record) = self.store.read() {
            if !record.phase.is_terminal() {
                return Err(OrchestratorError::WorkflowAlreadyExists {
                    path: self.store.path().to_path_buf(),
                });
            }
        }

        self.phase = Phase::Idle;
        self.context = WorkflowContext::new(Utc::now());
        self.iteration = 0;

        let start = Event::Start {
            input: input.to_string(),
        };
        self.apply_event(&start);
        self.persist()?;
        self.notify(&format!("workflow started from {input}"));

        self.drive().await
    }

    /// Reconstruct state from the progress store and continue.
    pub async fn resume(&mut self) -> Result<WorkflowResult, OrchestratorError> {
        let record = self
            .store
            .read()
            .ok_or_else(|| OrchestratorError::NoWorkflowInProgress {
                path: self.store.path().to_path_buf(),
            })?;

        self.phase = record.phase;
        self.context = record.context;
        self.iteration = record.iteration;
        self.notify(&format!(
            "workflow resumed in phase {} at iteration {}",
            self.phase, self.iteration
        ));

        self.drive().await
    }

    /// Snapshot of the current `(phase, iteration)` pair.
    pub fn state(&self) -> (Phase, u32) {
        (self.phase, self.iteration)
    }

    async fn drive(&mut self) -> Result<WorkflowResult, OrchestratorError> {
        loop {
            if self.phase.is_terminal() {
                break;
            }

            if self.iteration >= self.config.max_iterations {
                // The hard ceiling guarantees termination even under
                // systematic signal-parsing failure. Not a phase change:
                // the context stays resumable.
                tracing::error!(
                    iterations = self.iteration,
                    phase = %self.phase,
                    "iteration ceiling reached"
                );
                self.context.last_error = Some(format!(
                    "iteration ceiling reached after {} iterations in phase {}",
                    self.iteration, self.phase
                ));
                self.persist()?;
                self.notify("iteration ceiling reached; stopping");
                return Ok(self.result(false));
            }

            if let Some(ref ui) = self.ui {
                ui.show_phase(self.phase.as_str());
                ui.start_iteration(self.iteration + 1, self.config.max_iterations);
            }

            let Some(task) = tasks::task_for_phase(self.phase, &self.context, &self.config) else {
                // Phase has no outstanding task; advance without invoking.
                tracing::debug!(phase = %self.phase, "no task for phase, advancing");
                self.iteration += 1;
                self.persist()?;
                continue;
            };

            let event = match self.invoke_worker(&task).await? {
                Some(event) => event,
                None => {
                    // Parsing miss: retry the same phase next iteration,
                    // bounded by the overall ceiling.
                    self.iteration += 1;
                    self.persist()?;
                    continue;
                }
            };

            let event = self.check_stuck(event);

            match machine::transition(self.phase, &event, &self.context, Utc::now()) {
                Ok(transition) => {
                    if let Some(ref ui) = self.ui {
                        ui.show_transition(self.phase.as_str(), transition.phase.as_str());
                    }
                    self.notify(&format!(
                        "phase {} -> {} on {}",
                        self.phase,
                        transition.phase,
                        event.signal_name()
                    ));
                    self.phase = transition.phase;
                    self.context = transition.context;
                }
                Err(rejection) => {
                    // A stray or duplicate signal; logged no-op, never fatal.
                    tracing::warn!(%rejection, "rejected signal");
                    if let Some(ref ui) = self.ui {
                        ui.show_stray_signal(rejection.signal, self.phase.as_str());
                    }
                }
            }

            self.iteration += 1;
            self.persist()?;
        }

        self.persist()?;
        let success = self.phase == Phase::Completed;
        if success {
            self.notify("workflow completed");
            if let Some(ref ui) = self.ui {
                ui.finish_success();
            }
        } else {
            let reason = self
                .context
                .last_error
                .clone()
                .unwrap_or_else(|| "unknown failure".to_string());
            self.notify(&format!("workflow failed: {reason}"));
            if let Some(ref ui) = self.ui {
                ui.finish_failure(&reason);
            }
        }
        Ok(self.result(success))
    }

    /// Invoke the worker for `task` and reduce the outcome to at most one
    /// event. Worker-level faults become synthesized events routed by
    /// phase; cancellation persists the context as-is and surfaces as
    /// `Cancelled`.
    async fn invoke_worker(
        &mut self,
        task: &WorkerTask,
    ) -> Result<Option<Event>, OrchestratorError> {
        let opts = InvokeOptions {
            working_dir: task.working_dir.clone(),
            timeout: task.timeout,
        };

        let outcome = tokio::select! {
            outcome = self.executor.invoke(&task.prompt, &opts) => outcome,
            _ = tokio::signal::ctrl_c() => {
                // Dropping the invoke future kills the subprocess
                // (kill_on_drop); persist as-is with no phase change.
                tracing::warn!(phase = %self.phase, "cancellation requested");
                self.persist()?;
                self.notify("run cancelled; state persisted for resume");
                return Err(OrchestratorError::Cancelled);
            }
        };

        let output = match outcome {
            Ok(output) => output,
            Err(err) => {
                // Subprocess failed to start, crashed, or timed out: route
                // through normal guarded failure handling. Verify phases
                // count the loss as a verdict against their attempt
                // ceiling; fix phases retry under the iteration ceiling;
                // setup/planning/submission have no retry loop and fail
                // outright.
                tracing::error!(error = %err, phase = %self.phase, "worker invocation failed");
                return Ok(match self.phase {
                    Phase::CiVerify => Some(Event::CiFailed {
                        reason: format!("worker error: {err}"),
                    }),
                    Phase::CommentVerify => Some(Event::CommentsPending { count: 0 }),
                    Phase::CiFix | Phase::CommentFix => None,
                    _ => Some(Event::Fail {
                        reason: err.to_string(),
                    }),
                });
            }
        };

        self.write_transcript(&output.text);

        match signals::parse(&output.text) {
            Some(event) => {
                if let Some(ref ui) = self.ui {
                    ui.show_signal(event.signal_name());
                }
                Ok(Some(event))
            }
            None if output.exit_code != 0 => {
                tracing::error!(
                    exit_code = output.exit_code,
                    phase = %self.phase,
                    "worker exited non-zero without a signal"
                );
                Ok(Some(Event::Fail {
                    reason: format!(
                        "worker exited with code {} without emitting a signal",
                        output.exit_code
                    ),
                }))
            }
            None => {
                tracing::warn!(phase = %self.phase, "no signal in worker output");
                if let Some(ref ui) = self.ui {
                    ui.log_step("no signal found, retrying phase");
                }
                Ok(None)
            }
        }
    }

    /// Feed CI failures to the stuck detector; a stuck verdict aborts early
    /// instead of silently exhausting the attempt ceiling.
    fn check_stuck(&mut self, event: Event) -> Event {
        let Event::CiFailed { ref reason } = event else {
            return event;
        };
        let detection = stuck::detect_with_category(
            &self.stuck,
            reason,
            DEFAULT_STUCK_THRESHOLD,
            DEFAULT_CATEGORY_THRESHOLD,
        );
        self.stuck = detection.next.clone();
        match detection.trigger {
            Some(StuckTrigger::IdenticalError) => Event::Fail {
                reason: format!("stuck on identical error: {reason}"),
            },
            Some(StuckTrigger::RepeatedCategory(category)) => Event::Fail {
                reason: format!(
                    "stuck on repeated {} failures: {reason}",
                    category.as_str()
                ),
            },
            None => event,
        }
    }

    fn write_transcript(&self, text: &str) {
        let path = self
            .config
            .log_dir
            .join(format!("iter-{:03}-output.log", self.iteration + 1));
        if let Err(err) = std::fs::write(&path, text) {
            // Transcripts are diagnostics; losing one is not fatal.
            tracing::warn!(path = %path.display(), error = %err, "failed to write transcript");
        }
    }

    fn apply_event(&mut self, event: &Event) {
        if let Ok(transition) = machine::transition(self.phase, event, &self.context, Utc::now()) {
            self.phase = transition.phase;
            self.context = transition.context;
        }
    }

    /// Persisting the checkpoint is the one fatal I/O path: losing it would
    /// silently corrupt resumability.
    fn persist(&self) -> Result<(), OrchestratorError> {
        self.store
            .write(&self.context, self.phase, self.iteration)
            .map_err(|source| OrchestratorError::PersistFailed {
                path: self.store.path().to_path_buf(),
                source,
            })
    }

    fn notify(&self, message: &str) {
        if let Err(err) = self.sink.append(message) {
            tracing::warn!(error = %err, "notification sink failed");
        }
    }

    fn result(&self, success: bool) -> WorkflowResult {
        WorkflowResult {
            success,
            final_phase: self.phase,
            final_context: self.context.clone(),
            iterations: self.iteration,
        }
    }
}
