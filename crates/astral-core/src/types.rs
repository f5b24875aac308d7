//! Core value types shared by the registration API, the executor and the
//! scheduler.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a single run of a test.
/// Uses `UUIDv7` so identifiers sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub String);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// --- Enumerations ---

/// Kind of a step, fixed when the step is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Action,
    PollUntil,
    Assert,
    AssertThrows,
    Cleanup,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::PollUntil => "poll_until",
            Self::Assert => "assert",
            Self::AssertThrows => "assert_throws",
            Self::Cleanup => "cleanup",
        }
    }

    /// Name used in failure reports (e.g. `Step: x (PollUntil)`).
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Action => "Action",
            Self::PollUntil => "PollUntil",
            Self::Assert => "Assert",
            Self::AssertThrows => "AssertThrows",
            Self::Cleanup => "Cleanup",
        }
    }

    /// Whether this kind checks a condition rather than doing work.
    pub fn is_assertion(&self) -> bool {
        matches!(self, Self::Assert | Self::AssertThrows)
    }
}

/// Final status of a registered step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Passed,
    Failed,
    /// Never executed because an earlier step halted the run.
    Discarded,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Discarded => "DISCARDED",
        }
    }
}

/// Lifecycle of a single run.
///
/// `Idle -> Running(i) -> {Running(i + 1) | Halted | Completed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running(usize),
    Halted,
    Completed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running(_) => "running",
            Self::Halted => "halted",
            Self::Completed => "completed",
        }
    }

    /// Whether the run has released its caller.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Halted | Self::Completed)
    }
}

/// Timeout of a polling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitTimeout {
    #[default]
    Infinite,
    After(Duration),
}

impl WaitTimeout {
    /// Build from milliseconds, where 0 means no timeout.
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            Self::Infinite
        } else {
            Self::After(Duration::from_millis(ms))
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Infinite => None,
            Self::After(d) => Some(*d),
        }
    }

    /// Whether `waited` has used up the timeout.
    pub fn is_reached(&self, waited: Duration) -> bool {
        match self {
            Self::Infinite => false,
            Self::After(d) => waited >= *d,
        }
    }
}

impl From<Duration> for WaitTimeout {
    fn from(d: Duration) -> Self {
        Self::After(d)
    }
}

/// Short, path-free name of a type (`std::num::ParseIntError` -> `ParseIntError`).
pub fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Milliseconds of a duration, saturating at `u64::MAX`.
pub fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
