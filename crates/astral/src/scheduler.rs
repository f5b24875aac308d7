//! Run scheduler.
//!
//! Dispatches steps strictly in registration order, waits for each step's
//! completion on a fixed cadence, and halts the run on the first fatal
//! failure. Run state lives in a [`RunContext`] owned by a single call to
//! [`Scheduler::run`].

use crate::executor::Executor;
use crate::reporter::Reporter;
use astral_core::events::{
    Event, EventPayload, RunHaltedPayload, StepFinishedPayload, StepStartedPayload,
};
use astral_core::{
    Completion, FailReason, Id, RunState, Step, StepInfo, StepOutcome, StepRecord, StepStatus,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("No steps in test runner")]
    NoSteps,
    #[error("invalid state transition: {0} -> {1}")]
    InvalidTransition(String, String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// What the scheduler does after a step resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Run the step at this index next.
    Advance(usize),
    /// A fatal failure; remaining steps are discarded.
    Halt,
    /// The last step resolved.
    Complete,
}

/// Mutable state of one run.
#[derive(Debug)]
pub struct RunContext {
    run_id: Id,
    total: usize,
    state: RunState,
    records: Vec<StepRecord>,
    failures: Vec<FailReason>,
}

impl RunContext {
    pub fn new(run_id: Id, total: usize) -> Self {
        Self {
            run_id,
            total,
            state: RunState::Idle,
            records: Vec::with_capacity(total),
            failures: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &Id {
        &self.run_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Whether any step has failed so far.
    pub fn has_failed(&self) -> bool {
        !self.failures.is_empty()
    }

    /// `Idle -> Running(0)`.
    pub fn start(&mut self) -> Result<()> {
        if self.total == 0 {
            return Err(SchedulerError::NoSteps);
        }
        self.transition(RunState::Idle, RunState::Running(0))
    }

    /// Record the outcome of the running step and move to the next state.
    pub fn resolve(&mut self, step: &StepInfo, outcome: &StepOutcome) -> Result<Transition> {
        let RunState::Running(current) = self.state else {
            return Err(self.invalid(RunState::Running(step.index)));
        };
        if current != step.index {
            return Err(self.invalid(RunState::Running(step.index)));
        }

        self.records.push(StepRecord::resolved(step, outcome));
        if let Some(reason) = outcome.fail_reason() {
            self.failures.push(reason.clone());
        }

        let next = if outcome.is_fatal() {
            self.state = RunState::Halted;
            Transition::Halt
        } else if current + 1 < self.total {
            self.state = RunState::Running(current + 1);
            Transition::Advance(current + 1)
        } else {
            self.state = RunState::Completed;
            Transition::Complete
        };
        Ok(next)
    }

    /// Record a step skipped after a halt.
    pub fn discard(&mut self, step: &StepInfo) -> Result<()> {
        if self.state != RunState::Halted {
            return Err(self.invalid(RunState::Halted));
        }
        self.records.push(StepRecord::discarded(step));
        Ok(())
    }

    /// Close the run. Only valid once it is halted or completed.
    pub fn finish(self) -> Result<RunSummary> {
        if !self.state.is_terminal() {
            return Err(self.invalid(RunState::Completed));
        }
        Ok(RunSummary {
            run_id: self.run_id,
            state: self.state,
            records: self.records,
            failures: self.failures,
        })
    }

    fn transition(&mut self, from: RunState, to: RunState) -> Result<()> {
        if self.state != from {
            return Err(self.invalid(to));
        }
        self.state = to;
        Ok(())
    }

    fn invalid(&self, to: RunState) -> SchedulerError {
        SchedulerError::InvalidTransition(describe(self.state), describe(to))
    }
}

fn describe(state: RunState) -> String {
    match state {
        RunState::Running(index) => format!("running({index})"),
        other => other.as_str().to_string(),
    }
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Id,
    /// `Completed` or `Halted`.
    pub state: RunState,
    /// One record per registered step, in registration order.
    pub records: Vec<StepRecord>,
    /// Failures in the order they happened.
    pub failures: Vec<FailReason>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn discarded(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == StepStatus::Discarded)
            .count()
    }
}

/// Drives an ordered list of steps to completion.
pub struct Scheduler {
    executor: Executor,
    poll_interval: Duration,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("executor", &self.executor)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Scheduler checking completions at the executor's poll interval.
    pub fn new(executor: Executor, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            poll_interval: executor.poll_interval(),
            executor,
            reporter,
        }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Run `steps` in order and return once the run is completed or halted.
    pub async fn run(&self, run_id: &Id, steps: Vec<Step>) -> Result<RunSummary> {
        let mut context = RunContext::new(run_id.clone(), steps.len());
        context.start()?;
        info!(run_id = %run_id, steps = steps.len(), "run started");

        let mut steps = steps.into_iter().enumerate();
        let mut halted_at = None;

        for (index, step) in steps.by_ref() {
            self.emit(
                run_id,
                EventPayload::StepStarted(StepStartedPayload {
                    index,
                    name: step.name().to_string(),
                    kind: step.kind(),
                }),
            );

            let dispatched = self.executor.dispatch(index, step);
            let outcome = self.wait_for(&dispatched.completion).await;
            dispatched.cancel();

            let payload = match outcome.fail_reason() {
                Some(reason) => StepFinishedPayload::failed(reason),
                None => StepFinishedPayload::passed(&dispatched.info, outcome.elapsed()),
            };
            debug!(
                run_id = %run_id,
                index,
                status = payload.status.as_str(),
                "step resolved"
            );
            self.emit(run_id, EventPayload::StepFinished(payload));

            match context.resolve(&dispatched.info, &outcome)? {
                Transition::Advance(_) => {}
                Transition::Complete => break,
                Transition::Halt => {
                    halted_at = Some(index);
                    break;
                }
            }
        }

        if let Some(failed_index) = halted_at {
            let mut discarded = 0;
            for (index, step) in steps {
                let (info, _) = step.into_parts(index);
                context.discard(&info)?;
                discarded += 1;
            }
            warn!(
                run_id = %run_id,
                failed_index,
                discarded,
                "fatal failure, halting run"
            );
            self.emit(
                run_id,
                EventPayload::RunHalted(RunHaltedPayload {
                    failed_index,
                    discarded,
                }),
            );
        }

        let summary = context.finish()?;
        info!(
            run_id = %run_id,
            state = summary.state.as_str(),
            failures = summary.failures.len(),
            "run finished"
        );
        Ok(summary)
    }

    /// Check `completion` every poll interval until it resolves.
    async fn wait_for(&self, completion: &Completion) -> StepOutcome {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(outcome) = completion.outcome() {
                return outcome.clone();
            }
        }
    }

    fn emit(&self, run_id: &Id, payload: EventPayload) {
        self.reporter.report(&Event::new(run_id, payload));
    }
}
