//! Step executor.
//!
//! Runs the operation of one step and resolves its [`Completion`]. Action,
//! Assert, AssertThrows and Cleanup steps resolve before `dispatch` returns;
//! PollUntil steps resolve later from a background task that the caller can
//! cancel through the returned [`Dispatched`].

use astral_core::call_site::source_dir_of;
use astral_core::fail::{ASSERTION_FAILED, DID_NOT_THROW, TIMED_OUT};
use astral_core::step::Predicate;
use astral_core::{
    Completion, Config, Denylist, FailReason, Step, StepAction, StepInfo, StepOutcome, WaitTimeout,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs steps and produces their outcomes.
#[derive(Debug, Clone)]
pub struct Executor {
    poll_interval: Duration,
    denylist: Denylist,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(Duration::from_millis(1))
    }
}

impl Executor {
    /// Executor that polls wait conditions every `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            denylist: Denylist::default().with_prefix(source_dir_of(file!())),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let executor = Self::new(config.poll_interval());
        let denylist = executor
            .denylist
            .clone()
            .extend(config.internal_prefixes.iter().cloned());
        executor.with_denylist(denylist)
    }

    /// Replace the prefixes used to locate failing call sites.
    pub fn with_denylist(mut self, denylist: Denylist) -> Self {
        self.denylist = denylist;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn denylist(&self) -> &Denylist {
        &self.denylist
    }

    /// Start step `index`.
    ///
    /// PollUntil steps spawn onto the current tokio runtime, so this must be
    /// called from within one.
    pub fn dispatch(&self, index: usize, step: Step) -> Dispatched {
        let (info, action) = step.into_parts(index);
        let completion = Completion::new();

        debug!(
            index,
            step = %info.name,
            kind = info.kind.as_str(),
            "executing step"
        );

        let poll = match action {
            StepAction::Action(mut op) | StepAction::Cleanup(mut op) => {
                let outcome = match op() {
                    Ok(()) => StepOutcome::Passed { elapsed: None },
                    Err(error) => {
                        StepOutcome::Failed(FailReason::thrown(&info, error, &self.denylist))
                    }
                };
                completion.resolve(outcome);
                None
            }
            StepAction::Assert(mut check) => {
                let outcome = match check() {
                    Ok(true) => StepOutcome::Passed { elapsed: None },
                    Ok(false) => StepOutcome::Failed(FailReason::new(
                        &info,
                        ASSERTION_FAILED,
                        &self.denylist,
                    )),
                    Err(error) => {
                        StepOutcome::Failed(FailReason::thrown(&info, error, &self.denylist))
                    }
                };
                completion.resolve(outcome);
                None
            }
            StepAction::AssertThrows(mut check) => {
                // Any normal return counts as "did not throw", whatever the value.
                let outcome = match check() {
                    Err(error) => {
                        debug!(index, error = %error, "expected error was thrown");
                        StepOutcome::Passed { elapsed: None }
                    }
                    Ok(_) => StepOutcome::Failed(FailReason::new(
                        &info,
                        DID_NOT_THROW,
                        &self.denylist,
                    )),
                };
                completion.resolve(outcome);
                None
            }
            StepAction::PollUntil { predicate, timeout } => Some(self.spawn_poll(
                info.clone(),
                predicate,
                timeout,
                completion.clone(),
            )),
        };

        Dispatched {
            info,
            completion,
            poll,
        }
    }

    fn spawn_poll(
        &self,
        info: StepInfo,
        mut predicate: Predicate,
        timeout: WaitTimeout,
        completion: Completion,
    ) -> PollTask {
        let token = CancellationToken::new();
        let cancel = token.clone();
        let interval = self.poll_interval;
        let denylist = self.denylist.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut waited = Duration::ZERO;

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        debug!(index = info.index, "poll cancelled");
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                match predicate() {
                    Ok(true) => {
                        completion.resolve(StepOutcome::Passed {
                            elapsed: Some(waited),
                        });
                        return;
                    }
                    Ok(false) => {}
                    Err(error) => {
                        let reason =
                            FailReason::thrown(&info, error, &denylist).with_elapsed(waited);
                        completion.resolve(StepOutcome::Failed(reason));
                        return;
                    }
                }

                waited += interval;
                if timeout.is_reached(waited) {
                    let elapsed = timeout.as_duration().unwrap_or(waited);
                    warn!(
                        index = info.index,
                        step = %info.name,
                        waited_ms = astral_core::duration_ms(elapsed),
                        "wait condition timed out"
                    );
                    let reason =
                        FailReason::new(&info, TIMED_OUT, &denylist).with_elapsed(elapsed);
                    completion.resolve(StepOutcome::Failed(reason));
                    return;
                }
            }
        });

        PollTask { token, handle }
    }
}

/// Background poll of a PollUntil step. Dropping it stops the poll.
#[derive(Debug)]
struct PollTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// A step that has been started.
#[derive(Debug)]
pub struct Dispatched {
    pub info: StepInfo,
    pub completion: Completion,
    poll: Option<PollTask>,
}

impl Dispatched {
    /// Stop any background polling. The completion is left as it is.
    pub fn cancel(&self) {
        if let Some(poll) = &self.poll {
            poll.token.cancel();
        }
    }

    /// Whether a background poll is still running.
    pub fn is_polling(&self) -> bool {
        self.poll
            .as_ref()
            .is_some_and(|poll| !poll.handle.is_finished())
    }
}
