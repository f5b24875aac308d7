//! Event sinks for a run.
//!
//! The scheduler and runner emit [`Event`]s; reporters decide what to do with
//! them. Reporters must not fail a run: write errors are logged and dropped.

use crate::render;
use astral_core::events::{Event, EventPayload, StepFinishedPayload};
use astral_core::{StepKind, StepStatus};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// Receives every event of a run, in order.
pub trait Reporter: Send + Sync {
    fn report(&self, event: &Event);
}

/// Prints the human-readable progress and failure stream.
pub struct ConsoleReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleReporter {
    /// Reporter writing to stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    fn render(event: &Event) -> Vec<String> {
        match &event.payload {
            EventPayload::RunStarted(p) => vec![render::header(&p.test_name)],
            EventPayload::StepStarted(p) => vec![render::step_line(p.index, p.kind, &p.name)],
            EventPayload::StepFinished(p) => Self::render_finished(p),
            EventPayload::RunHalted(_) | EventPayload::RunFinished(_) => Vec::new(),
        }
    }

    fn render_finished(payload: &StepFinishedPayload) -> Vec<String> {
        match payload.status {
            StepStatus::Failed => vec![render::failure_block(payload)],
            StepStatus::Passed if payload.kind == StepKind::PollUntil => {
                vec![render::wait_line(
                    payload.index,
                    &payload.name,
                    payload.elapsed_ms.unwrap_or_default(),
                )]
            }
            StepStatus::Passed | StepStatus::Discarded => Vec::new(),
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::stdout()
    }
}

impl std::fmt::Debug for ConsoleReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleReporter").finish_non_exhaustive()
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: &Event) {
        let lines = Self::render(event);
        if lines.is_empty() {
            return;
        }
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let result = lines
            .iter()
            .try_for_each(|line| writeln!(out, "{line}"))
            .and_then(|()| out.flush());
        if let Err(err) = result {
            warn!(error = %err, "failed to write progress output");
        }
    }
}

/// Appends one JSON object per event to a file.
#[derive(Debug)]
pub struct JsonLinesReporter {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesReporter {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Reporter for JsonLinesReporter {
    fn report(&self, event: &Event) {
        let line = match event.to_json() {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, event = event.event_type.as_str(), "failed to serialize event");
                return;
            }
        };
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = writeln!(file, "{line}") {
            warn!(
                error = %err,
                path = %self.path.display(),
                "failed to append event"
            );
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<Event>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events seen so far.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _event: &Event) {}
}

/// Forwards each event to several reporters in order.
#[derive(Default)]
pub struct FanoutReporter {
    reporters: Vec<Arc<dyn Reporter>>,
}

impl FanoutReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl std::fmt::Debug for FanoutReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutReporter")
            .field("reporters", &self.reporters.len())
            .finish()
    }
}

impl Reporter for FanoutReporter {
    fn report(&self, event: &Event) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}
