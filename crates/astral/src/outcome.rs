//! Aggregate result of one test run.

use crate::render;
use astral_core::events::StepFinishedPayload;
use astral_core::{FailReason, Id, ReportRow, RunState, StepRecord, StepStatus};
use thiserror::Error;

/// Single failure surfaced to the hosting test framework.
#[derive(Debug, Error)]
#[error("Failed: {test_name} ({failures} failed step(s)){details}")]
pub struct TestFailed {
    pub test_name: String,
    pub run_id: Id,
    pub failures: usize,
    details: String,
}

/// Everything known about a finished run.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: Id,
    pub test_name: String,
    /// `Completed` or `Halted`.
    pub state: RunState,
    /// One record per registered step, in registration order.
    pub steps: Vec<StepRecord>,
    pub failures: Vec<FailReason>,
    /// Error returned by the test's `cleanup` hook.
    pub cleanup_error: Option<eyre::Report>,
}

impl RunOutcome {
    /// True when no step failed and cleanup succeeded.
    pub fn passed(&self) -> bool {
        self.failures.is_empty() && self.cleanup_error.is_none()
    }

    pub fn halted(&self) -> bool {
        self.state == RunState::Halted
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// The outcome if it passed, otherwise the aggregate failure.
    pub fn into_result(self) -> Result<Self, TestFailed> {
        match self.failure() {
            Some(failed) => Err(failed),
            None => Ok(self),
        }
    }

    /// Panic with every failure block if the run did not pass.
    pub fn assert_passed(&self) {
        if let Some(failed) = self.failure() {
            panic!("{failed}");
        }
    }

    /// Report rows for every step, stamped with `timestamp_ms`.
    pub fn report_rows(&self, timestamp_ms: i64) -> Vec<ReportRow> {
        self.steps.iter().map(|s| s.to_row(timestamp_ms)).collect()
    }

    fn failure(&self) -> Option<TestFailed> {
        if self.passed() {
            return None;
        }
        let mut details = String::new();
        for reason in &self.failures {
            details.push_str(&render::failure_block(&StepFinishedPayload::failed(reason)));
        }
        if let Some(err) = &self.cleanup_error {
            details.push_str(&format!("\n cleanup failed: {err:?}\n"));
        }
        Some(TestFailed {
            test_name: self.test_name.clone(),
            run_id: self.run_id.clone(),
            failures: self.failures.len(),
            details,
        })
    }
}
