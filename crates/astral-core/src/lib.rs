//! astral-core - step model and shared value types for the astral test
//! orchestration engine.

pub mod call_site;
pub mod config;
pub mod events;
pub mod fail;
pub mod report;
pub mod step;
pub mod types;

pub use call_site::{CallSite, Denylist};
pub use config::{Config, ConfigError};
pub use fail::FailReason;
pub use report::{ReportRow, StepRecord};
pub use step::{Completion, Step, StepAction, StepInfo, StepOutcome, StepReturn, ThrownError};
pub use types::*;
