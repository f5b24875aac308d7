//! Test runner lifecycle.
//!
//! `setup` -> `create_test_steps` -> scheduled run -> `cleanup` -> outcome.

use crate::executor::Executor;
use crate::outcome::RunOutcome;
use crate::registry::StepRegistry;
use crate::reporter::{ConsoleReporter, FanoutReporter, JsonLinesReporter, NullReporter, Reporter};
use crate::scheduler::{self, RunSummary, Scheduler, SchedulerError};
use astral_core::events::{Event, EventPayload, RunFinishedPayload, RunStartedPayload};
use astral_core::report::write_report;
use astral_core::{short_type_name, Config, ConfigError, Id, ThrownError};
use chrono::Utc;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("No steps in test runner")]
    NoSteps,
    #[error("setup failed: {0:?}")]
    Setup(eyre::Report),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build tokio runtime: {0}")]
    Runtime(std::io::Error),
    #[error("failed to open event log: {0}")]
    Events(std::io::Error),
}

pub type Result<T> = std::result::Result<T, RunError>;

/// A test written as an ordered list of steps.
///
/// Steps are registered once per run from `create_test_steps`. Closures that
/// need test state should share it through `Arc`s held by the test.
pub trait AstralTest {
    /// Name shown in the header. Defaults to the type's short name.
    fn name(&self) -> String {
        short_type_name::<Self>()
    }

    /// Runs before any step is registered.
    fn setup(&mut self) -> eyre::Result<()> {
        Ok(())
    }

    fn create_test_steps(&mut self, steps: &mut StepRegistry);

    /// Runs after the scheduler releases, whether or not a step failed.
    fn cleanup(&mut self) -> eyre::Result<()> {
        Ok(())
    }
}

/// Runs [`AstralTest`]s with one configuration.
pub struct TestRunner {
    config: Config,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRunner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TestRunner {
    /// Runner with reporters chosen from `config`.
    pub fn new(config: Config) -> Result<Self> {
        let console: Arc<dyn Reporter> = if config.progress {
            Arc::new(ConsoleReporter::stdout())
        } else {
            Arc::new(NullReporter)
        };
        let reporter: Arc<dyn Reporter> = match &config.events_path {
            Some(path) => {
                let events = JsonLinesReporter::create(path).map_err(RunError::Events)?;
                Arc::new(FanoutReporter::new().with(console).with(Arc::new(events)))
            }
            None => console,
        };
        Ok(Self { config, reporter })
    }

    /// Runner configured from `.astral/config` and `$ASTRAL_CONFIG`.
    pub fn from_env() -> Result<Self> {
        let cwd = std::env::current_dir().map_err(ConfigError::from)?;
        let mut config = Config::discover(&cwd)?;
        config.resolve_paths(&cwd);
        Self::new(config)
    }

    /// Replace the configured reporters.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `test` to completion.
    ///
    /// Step failures, cleanup failures and report write errors end up in the
    /// returned outcome or the log. Setup errors, an empty step list and
    /// scheduler errors are returned as `Err`.
    pub async fn run<T: AstralTest>(&self, test: &mut T) -> Result<RunOutcome> {
        let run_id = Id::new();
        let test_name = test.name();

        call_hook("setup", || test.setup()).map_err(RunError::Setup)?;

        let mut registry =
            StepRegistry::with_default_wait_timeout(self.config.default_wait_timeout());
        test.create_test_steps(&mut registry);
        if registry.is_empty() {
            return Err(RunError::NoSteps);
        }

        info!(run_id = %run_id, test = %test_name, steps = registry.len(), "starting test");
        self.emit(
            &run_id,
            EventPayload::RunStarted(RunStartedPayload {
                test_name: test_name.clone(),
                step_count: registry.len(),
            }),
        );

        let scheduler = Scheduler::new(
            Executor::from_config(&self.config),
            Arc::clone(&self.reporter),
        );
        let summary = scheduler.run(&run_id, registry.into_steps()).await;
        let (summary, cleanup_error) = release(&run_id, test, summary)?;

        let outcome = RunOutcome {
            run_id: summary.run_id,
            test_name,
            state: summary.state,
            steps: summary.records,
            failures: summary.failures,
            cleanup_error,
        };

        self.emit(
            &run_id,
            EventPayload::RunFinished(RunFinishedPayload {
                state: outcome.state,
                passed: outcome.passed(),
                failures: outcome.failures.len(),
            }),
        );

        if let Some(path) = &self.config.report_path {
            let rows = outcome.report_rows(Utc::now().timestamp_millis());
            if let Err(err) = write_report(path, &rows) {
                warn!(
                    run_id = %run_id,
                    path = %path.display(),
                    error = %err,
                    "failed to write step report"
                );
            }
        }

        Ok(outcome)
    }

    /// Run `test` on a fresh current-thread tokio runtime.
    pub fn run_blocking<T: AstralTest>(&self, test: &mut T) -> Result<RunOutcome> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(RunError::Runtime)?;
        runtime.block_on(self.run(test))
    }

    fn emit(&self, run_id: &Id, payload: EventPayload) {
        self.reporter.report(&Event::new(run_id, payload));
    }
}

/// Run the test's cleanup, then hand back the scheduler result.
fn release<T: AstralTest>(
    run_id: &Id,
    test: &mut T,
    summary: scheduler::Result<RunSummary>,
) -> Result<(RunSummary, Option<eyre::Report>)> {
    let cleanup_error = match call_hook("cleanup", || test.cleanup()) {
        Ok(()) => None,
        Err(err) => {
            warn!(run_id = %run_id, error = %err, "cleanup failed");
            Some(err)
        }
    };
    Ok((summary?, cleanup_error))
}

/// Call a lifecycle hook, turning a panic into an error.
fn call_hook(hook: &str, f: impl FnOnce() -> eyre::Result<()>) -> eyre::Result<()> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let thrown = ThrownError::from_panic(payload.as_ref());
            Err(eyre::eyre!("{hook} panicked: {}", thrown.report()))
        }
    }
}
