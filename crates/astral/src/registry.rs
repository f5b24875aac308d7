//! Registration API used inside `create_test_steps`.
//!
//! Every call appends one step in order and records the caller's location.

use astral_core::step::{predicate, procedure};
use astral_core::{CallSite, Step, StepAction, StepReturn, WaitTimeout};
use std::time::Duration;

/// Name given to steps registered with [`StepRegistry::add_cleanup`].
pub const CLEANUP_STEP_NAME: &str = "Cleanup";

/// Ordered list of steps for one run.
#[derive(Debug, Default)]
pub struct StepRegistry {
    steps: Vec<Step>,
    default_wait_timeout: WaitTimeout,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose `add_wait_until` uses `timeout` instead of waiting forever.
    pub fn with_default_wait_timeout(timeout: WaitTimeout) -> Self {
        Self {
            steps: Vec::new(),
            default_wait_timeout: timeout,
        }
    }

    /// Run `f` once.
    #[track_caller]
    pub fn add_step<F, R>(&mut self, name: impl Into<String>, f: F)
    where
        F: FnMut() -> R + Send + 'static,
        R: StepReturn<()>,
    {
        self.push(name.into(), StepAction::Action(procedure(f)));
    }

    /// Poll `f` until it returns `true`, using the registry's default timeout.
    #[track_caller]
    pub fn add_wait_until<F, R>(&mut self, name: impl Into<String>, f: F)
    where
        F: FnMut() -> R + Send + 'static,
        R: StepReturn<bool>,
    {
        let timeout = self.default_wait_timeout;
        self.push(
            name.into(),
            StepAction::PollUntil {
                predicate: predicate(f),
                timeout,
            },
        );
    }

    /// Poll `f` until it returns `true` or `timeout` has been waited.
    #[track_caller]
    pub fn add_wait_until_timeout<F, R>(&mut self, name: impl Into<String>, timeout: Duration, f: F)
    where
        F: FnMut() -> R + Send + 'static,
        R: StepReturn<bool>,
    {
        self.push(
            name.into(),
            StepAction::PollUntil {
                predicate: predicate(f),
                timeout: WaitTimeout::After(timeout),
            },
        );
    }

    /// Fail softly if `f` returns `false`.
    #[track_caller]
    pub fn add_assert<F, R>(&mut self, name: impl Into<String>, f: F)
    where
        F: FnMut() -> R + Send + 'static,
        R: StepReturn<bool>,
    {
        self.push(name.into(), StepAction::Assert(predicate(f)));
    }

    /// Pass only if `f` fails (returns an error or panics).
    #[track_caller]
    pub fn add_assert_throws<F, R>(&mut self, name: impl Into<String>, f: F)
    where
        F: FnMut() -> R + Send + 'static,
        R: StepReturn<bool>,
    {
        self.push(name.into(), StepAction::AssertThrows(predicate(f)));
    }

    /// Run `f` as an ordered cleanup step.
    #[track_caller]
    pub fn add_cleanup<F, R>(&mut self, f: F)
    where
        F: FnMut() -> R + Send + 'static,
        R: StepReturn<()>,
    {
        self.push(CLEANUP_STEP_NAME.to_string(), StepAction::Cleanup(procedure(f)));
    }

    #[track_caller]
    fn push(&mut self, name: String, action: StepAction) {
        self.steps.push(Step::new(name, action, CallSite::capture()));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Hand the ordered list to the scheduler.
    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }
}
