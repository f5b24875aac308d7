//! Per-step records and the TSV step report.
//!
//! Columns: `timestamp_ms`, index, kind, name, status, `elapsed_ms`, fatal,
//!          message, location

use crate::fail::FailReason;
use crate::step::{StepInfo, StepOutcome};
use crate::types::{duration_ms, StepKind, StepStatus};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// What happened to one registered step.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub index: usize,
    pub name: String,
    pub kind: StepKind,
    pub status: StepStatus,
    pub elapsed: Option<Duration>,
    pub fail_reason: Option<FailReason>,
}

impl StepRecord {
    /// Record of an executed step.
    pub fn resolved(info: &StepInfo, outcome: &StepOutcome) -> Self {
        let fail_reason = outcome.fail_reason().cloned();
        Self {
            index: info.index,
            name: info.name.clone(),
            kind: info.kind,
            status: if fail_reason.is_some() {
                StepStatus::Failed
            } else {
                StepStatus::Passed
            },
            elapsed: outcome.elapsed(),
            fail_reason,
        }
    }

    /// Record of a step dropped after the run halted.
    pub fn discarded(info: &StepInfo) -> Self {
        Self {
            index: info.index,
            name: info.name.clone(),
            kind: info.kind,
            status: StepStatus::Discarded,
            elapsed: None,
            fail_reason: None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.fail_reason.as_ref().is_some_and(FailReason::is_fatal)
    }

    /// Report row for this record.
    pub fn to_row(&self, timestamp_ms: i64) -> ReportRow {
        let mut row = ReportRow::new(timestamp_ms, self.index, self.kind, &self.name, self.status);
        if let Some(elapsed) = self.elapsed {
            row = row.with_elapsed_ms(duration_ms(elapsed));
        }
        if let Some(reason) = &self.fail_reason {
            row = row
                .with_message(&reason.message)
                .with_location(&reason.location)
                .with_fatal(reason.is_fatal());
        }
        row
    }
}

/// A single row in the report file.
#[derive(Debug, Clone)]
pub struct ReportRow {
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: i64,
    pub index: usize,
    pub kind: StepKind,
    pub name: String,
    pub status: StepStatus,
    pub elapsed_ms: Option<u64>,
    pub fatal: bool,
    pub message: String,
    pub location: String,
}

impl ReportRow {
    /// Create a new report row with required fields.
    pub fn new(
        timestamp_ms: i64,
        index: usize,
        kind: StepKind,
        name: impl Into<String>,
        status: StepStatus,
    ) -> Self {
        Self {
            timestamp_ms,
            index,
            kind,
            name: name.into(),
            status,
            elapsed_ms: None,
            fatal: false,
            message: String::new(),
            location: String::new(),
        }
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }

    pub fn with_fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    fn to_tsv_line(&self) -> String {
        let elapsed = self.elapsed_ms.map(|ms| ms.to_string()).unwrap_or_default();
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.timestamp_ms,
            self.index,
            self.kind.as_str(),
            sanitize_field(&self.name),
            self.status.as_str(),
            elapsed,
            self.fatal,
            sanitize_field(&self.message),
            sanitize_field(&self.location),
        )
    }
}

/// Sanitize a field value to prevent TSV breakage.
fn sanitize_field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

/// TSV header row.
pub const HEADER: &str =
    "timestamp_ms\tindex\tkind\tname\tstatus\telapsed_ms\tfatal\tmessage\tlocation";

/// Write a complete report file, replacing any previous one.
pub fn write_report(path: &Path, rows: &[ReportRow]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "{HEADER}")?;
    for row in rows {
        writeln!(writer, "{}", row.to_tsv_line())?;
    }

    writer.flush()
}
