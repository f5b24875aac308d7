//! Failure description attached to a step that did not succeed.

use crate::call_site::Denylist;
use crate::step::{StepInfo, ThrownError};
use crate::types::StepKind;
use std::sync::Arc;
use std::time::Duration;

pub const ASSERTION_FAILED: &str = "Assertion failed";
pub const DID_NOT_THROW: &str = "Unit did not throw";
pub const TIMED_OUT: &str = "Timed out";

/// Immutable result of a failed step.
///
/// The presence of [`FailReason::error`] alone decides whether the failure
/// halts the run.
#[derive(Debug, Clone)]
pub struct FailReason {
    /// Position of the step in registration order.
    pub index: usize,
    pub step_name: String,
    pub step_kind: StepKind,
    /// Human-readable cause.
    pub message: String,
    /// Underlying error; present means fatal.
    pub error: Option<Arc<ThrownError>>,
    /// Time spent waiting; PollUntil only.
    pub elapsed: Option<Duration>,
    /// `file:line` of the registering call, or the unknown-location text.
    pub location: String,
}

impl FailReason {
    /// Soft failure with `message`.
    pub fn new(step: &StepInfo, message: impl Into<String>, denylist: &Denylist) -> Self {
        Self {
            index: step.index,
            step_name: step.name.clone(),
            step_kind: step.kind,
            message: message.into(),
            error: None,
            elapsed: None,
            location: step.call_site.describe(denylist),
        }
    }

    /// Hard failure: `"<kind> was thrown"` with the error attached.
    pub fn thrown(step: &StepInfo, error: ThrownError, denylist: &Denylist) -> Self {
        Self::new(step, thrown_message(&error), denylist).with_error(error)
    }

    pub fn with_error(mut self, error: ThrownError) -> Self {
        self.error = Some(Arc::new(error));
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.error.is_some()
    }

    /// Error trace, when an error is attached.
    pub fn error_trace(&self) -> Option<String> {
        self.error.as_deref().map(ThrownError::trace)
    }
}

/// Message used for thrown errors.
pub fn thrown_message(error: &ThrownError) -> String {
    format!("{} was thrown", error.kind())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_site::{CallSite, UNKNOWN_LOCATION};

    fn info(kind: StepKind) -> StepInfo {
        StepInfo {
            index: 2,
            name: "fetch".to_string(),
            kind,
            call_site: CallSite::unknown(),
        }
    }

    #[test]
    fn soft_failure_is_not_fatal() {
        let reason = FailReason::new(&info(StepKind::Assert), ASSERTION_FAILED, &Denylist::empty());
        assert!(!reason.is_fatal());
        assert_eq!(reason.message, "Assertion failed");
        assert_eq!(reason.index, 2);
        assert_eq!(reason.location, UNKNOWN_LOCATION);
        assert!(reason.error_trace().is_none());
    }

    #[test]
    fn thrown_failure_is_fatal_and_names_the_error() {
        let error = ThrownError::from_error("12x".parse::<u8>().unwrap_err());
        let reason = FailReason::thrown(&info(StepKind::Action), error, &Denylist::empty());
        assert!(reason.is_fatal());
        assert_eq!(reason.message, "ParseIntError was thrown");
        assert!(reason.error_trace().unwrap().contains("invalid digit"));
    }

    #[test]
    fn elapsed_is_recorded_when_given() {
        let reason = FailReason::new(&info(StepKind::PollUntil), TIMED_OUT, &Denylist::empty())
            .with_elapsed(Duration::from_millis(40));
        assert_eq!(reason.elapsed, Some(Duration::from_millis(40)));
        assert!(!reason.is_fatal());
    }
}
