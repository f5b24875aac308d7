//! Run events handed to reporters.

use crate::fail::FailReason;
use crate::step::StepInfo;
use crate::types::{duration_ms, Id, RunState, StepKind, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Event type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    RunStarted,
    StepStarted,
    StepFinished,
    RunHalted,
    RunFinished,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunStarted => "RUN_STARTED",
            Self::StepStarted => "STEP_STARTED",
            Self::StepFinished => "STEP_FINISHED",
            Self::RunHalted => "RUN_HALTED",
            Self::RunFinished => "RUN_FINISHED",
        }
    }
}

/// Payload for RUN_STARTED event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunStartedPayload {
    pub test_name: String,
    pub step_count: usize,
}

/// Payload for STEP_STARTED event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepStartedPayload {
    pub index: usize,
    pub name: String,
    pub kind: StepKind,
}

impl StepStartedPayload {
    pub fn from_info(info: &StepInfo) -> Self {
        Self {
            index: info.index,
            name: info.name.clone(),
            kind: info.kind,
        }
    }
}

/// Payload for STEP_FINISHED event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepFinishedPayload {
    pub index: usize,
    pub name: String,
    pub kind: StepKind,
    pub status: StepStatus,
    pub elapsed_ms: Option<u64>,
    pub reason: Option<String>,
    pub location: Option<String>,
    pub fatal: bool,
    /// Error trace of a fatal failure.
    pub error: Option<String>,
}

impl StepFinishedPayload {
    pub fn passed(info: &StepInfo, elapsed: Option<Duration>) -> Self {
        Self {
            index: info.index,
            name: info.name.clone(),
            kind: info.kind,
            status: StepStatus::Passed,
            elapsed_ms: elapsed.map(duration_ms),
            reason: None,
            location: None,
            fatal: false,
            error: None,
        }
    }

    pub fn failed(reason: &FailReason) -> Self {
        Self {
            index: reason.index,
            name: reason.step_name.clone(),
            kind: reason.step_kind,
            status: StepStatus::Failed,
            elapsed_ms: reason.elapsed.map(duration_ms),
            reason: Some(reason.message.clone()),
            location: Some(reason.location.clone()),
            fatal: reason.is_fatal(),
            error: reason.error_trace(),
        }
    }
}

/// Payload for RUN_HALTED event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunHaltedPayload {
    /// Index of the step whose error halted the run.
    pub failed_index: usize,
    /// Number of steps discarded without running.
    pub discarded: usize,
}

/// Payload for RUN_FINISHED event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunFinishedPayload {
    pub state: RunState,
    pub passed: bool,
    pub failures: usize,
}

/// Union type for all event payloads.
///
/// Untagged: every payload rejects unknown fields, and `StepFinished` is
/// listed before `StepStarted` because its fields are a superset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    RunStarted(RunStartedPayload),
    StepFinished(StepFinishedPayload),
    StepStarted(StepStartedPayload),
    RunHalted(RunHaltedPayload),
    RunFinished(RunFinishedPayload),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::RunStarted(_) => EventType::RunStarted,
            Self::StepStarted(_) => EventType::StepStarted,
            Self::StepFinished(_) => EventType::StepFinished,
            Self::RunHalted(_) => EventType::RunHalted,
            Self::RunFinished(_) => EventType::RunFinished,
        }
    }
}

/// An event emitted during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub run_id: Id,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(run_id: &Id, payload: EventPayload) -> Self {
        Self {
            run_id: run_id.clone(),
            event_type: payload.event_type(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
