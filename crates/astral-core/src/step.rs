//! Step model: one unit of ordered test work and its resolution slot.
//!
//! Key responsibilities:
//! - Carry the user operation in a closed tagged variant ([`StepAction`])
//! - Turn returned errors and panics into [`ThrownError`]
//! - Hold the write-once [`Completion`] the scheduler polls

use crate::call_site::CallSite;
use crate::fail::FailReason;
use crate::types::{short_type_name, StepKind, WaitTimeout};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// A zero-argument procedure (Action and Cleanup steps).
pub type Procedure = Box<dyn FnMut() -> Result<(), ThrownError> + Send>;

/// A fallible condition (PollUntil, Assert and AssertThrows steps).
pub type Predicate = Box<dyn FnMut() -> Result<bool, ThrownError> + Send>;

/// Error raised by a user operation, either returned or panicked.
#[derive(Debug)]
pub struct ThrownError {
    kind: String,
    report: eyre::Report,
}

impl ThrownError {
    /// Wrap a returned error, remembering its type name.
    pub fn from_error<E>(error: E) -> Self
    where
        E: Into<eyre::Report> + 'static,
    {
        let kind = if std::any::TypeId::of::<E>() == std::any::TypeId::of::<eyre::Report>() {
            "Error".to_string()
        } else {
            short_type_name::<E>()
        };
        Self {
            kind,
            report: error.into(),
        }
    }

    /// Wrap a panic payload.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with non-string payload".to_string());
        Self {
            kind: "Panic".to_string(),
            report: eyre::eyre!(message),
        }
    }

    /// Short type name of the error (`"ParseIntError"`, `"Panic"`).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn report(&self) -> &eyre::Report {
        &self.report
    }

    /// Full error trace, including the cause chain.
    pub fn trace(&self) -> String {
        format!("{:?}", self.report)
    }
}

impl std::fmt::Display for ThrownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.report)
    }
}

/// Return values accepted from user operations.
///
/// Procedures may return `()` or `Result<(), E>`; predicates may return
/// `bool` or `Result<bool, E>`.
pub trait StepReturn<T> {
    fn into_step_result(self) -> Result<T, ThrownError>;
}

impl StepReturn<()> for () {
    fn into_step_result(self) -> Result<(), ThrownError> {
        Ok(())
    }
}

impl StepReturn<bool> for bool {
    fn into_step_result(self) -> Result<bool, ThrownError> {
        Ok(self)
    }
}

impl<T, E> StepReturn<T> for Result<T, E>
where
    E: Into<eyre::Report> + 'static,
{
    fn into_step_result(self) -> Result<T, ThrownError> {
        self.map_err(ThrownError::from_error)
    }
}

/// Call `op`, turning a panic into a [`ThrownError`].
fn guarded<T>(op: impl FnOnce() -> Result<T, ThrownError>) -> Result<T, ThrownError> {
    match catch_unwind(AssertUnwindSafe(op)) {
        Ok(result) => result,
        Err(payload) => Err(ThrownError::from_panic(payload.as_ref())),
    }
}

/// Erase a user procedure into a [`Procedure`].
pub fn procedure<F, R>(mut f: F) -> Procedure
where
    F: FnMut() -> R + Send + 'static,
    R: StepReturn<()>,
{
    Box::new(move || guarded(|| f().into_step_result()))
}

/// Erase a user predicate into a [`Predicate`].
pub fn predicate<F, R>(mut f: F) -> Predicate
where
    F: FnMut() -> R + Send + 'static,
    R: StepReturn<bool>,
{
    Box::new(move || guarded(|| f().into_step_result()))
}

/// The operation of a step, tagged by kind.
pub enum StepAction {
    Action(Procedure),
    PollUntil {
        predicate: Predicate,
        timeout: WaitTimeout,
    },
    Assert(Predicate),
    AssertThrows(Predicate),
    Cleanup(Procedure),
}

impl StepAction {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::Action(_) => StepKind::Action,
            Self::PollUntil { .. } => StepKind::PollUntil,
            Self::Assert(_) => StepKind::Assert,
            Self::AssertThrows(_) => StepKind::AssertThrows,
            Self::Cleanup(_) => StepKind::Cleanup,
        }
    }
}

impl std::fmt::Debug for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PollUntil { timeout, .. } => f
                .debug_struct("PollUntil")
                .field("timeout", timeout)
                .finish_non_exhaustive(),
            other => f.write_str(other.kind().display_name()),
        }
    }
}

/// Identity of a step, detached from its operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInfo {
    pub index: usize,
    pub name: String,
    pub kind: StepKind,
    pub call_site: CallSite,
}

/// One registered unit of test work.
#[derive(Debug)]
pub struct Step {
    name: String,
    action: StepAction,
    call_site: CallSite,
}

impl Step {
    pub fn new(name: impl Into<String>, action: StepAction, call_site: CallSite) -> Self {
        Self {
            name: name.into(),
            action,
            call_site,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StepKind {
        self.action.kind()
    }

    pub fn call_site(&self) -> CallSite {
        self.call_site
    }

    /// Only meaningful for PollUntil steps.
    pub fn timeout(&self) -> Option<WaitTimeout> {
        match &self.action {
            StepAction::PollUntil { timeout, .. } => Some(*timeout),
            _ => None,
        }
    }

    /// Split into identity and operation at position `index`.
    pub fn into_parts(self, index: usize) -> (StepInfo, StepAction) {
        let info = StepInfo {
            index,
            kind: self.action.kind(),
            name: self.name,
            call_site: self.call_site,
        };
        (info, self.action)
    }
}

/// How a step resolved.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// `elapsed` is only recorded for PollUntil steps.
    Passed { elapsed: Option<Duration> },
    Failed(FailReason),
}

impl StepOutcome {
    pub fn fail_reason(&self) -> Option<&FailReason> {
        match self {
            Self::Passed { .. } => None,
            Self::Failed(reason) => Some(reason),
        }
    }

    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            Self::Passed { elapsed } => *elapsed,
            Self::Failed(reason) => reason.elapsed,
        }
    }

    /// Whether the run must halt after this step.
    pub fn is_fatal(&self) -> bool {
        self.fail_reason().is_some_and(FailReason::is_fatal)
    }
}

/// Write-once resolution slot shared between a step's operation and the
/// scheduler. The first resolution wins; later ones are ignored.
#[derive(Debug, Clone, Default)]
pub struct Completion(Arc<OnceLock<StepOutcome>>);

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the step. Returns `false` if it was already resolved.
    pub fn resolve(&self, outcome: StepOutcome) -> bool {
        self.0.set(outcome).is_ok()
    }

    pub fn is_completed(&self) -> bool {
        self.0.get().is_some()
    }

    pub fn outcome(&self) -> Option<&StepOutcome> {
        self.0.get()
    }
}
