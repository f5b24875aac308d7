//! astral - step-oriented test orchestration.
//!
//! A test implements [`AstralTest`] and registers an ordered list of steps.
//! The [`TestRunner`] executes them one at a time: assertion mismatches and
//! timeouts are recorded and the run continues, while a returned error or
//! panic halts the run. Cleanup always runs once the run is released.
//!
//! ```no_run
//! use astral::{AstralTest, StepRegistry};
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Counter {
//!     value: Arc<AtomicU32>,
//! }
//!
//! impl AstralTest for Counter {
//!     fn create_test_steps(&mut self, steps: &mut StepRegistry) {
//!         let value = Arc::clone(&self.value);
//!         steps.add_step("increment", move || {
//!             value.fetch_add(1, Ordering::SeqCst);
//!         });
//!         let value = Arc::clone(&self.value);
//!         steps.add_assert("value is 1", move || value.load(Ordering::SeqCst) == 1);
//!     }
//! }
//!
//! fn main() -> eyre::Result<()> {
//!     astral::run_blocking(Counter::default())
//! }
//! ```

pub mod executor;
pub mod outcome;
pub mod registry;
pub mod render;
pub mod reporter;
pub mod runner;
pub mod scheduler;

pub use astral_core::{Config, StepKind, WaitTimeout};
pub use outcome::{RunOutcome, TestFailed};
pub use registry::StepRegistry;
pub use reporter::Reporter;
pub use runner::{AstralTest, RunError, TestRunner};

use tracing_subscriber::{fmt, EnvFilter};

/// Install a `RUST_LOG`-driven tracing subscriber (default `warn`).
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // Err only means a subscriber is already installed.
    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
}

/// Run `test` with the discovered configuration.
///
/// Returns `Err` for lifecycle errors and for any failed step, so a
/// `#[tokio::test]` can return it directly.
pub async fn run<T: AstralTest>(mut test: T) -> eyre::Result<()> {
    let runner = TestRunner::from_env()?;
    runner.run(&mut test).await?.into_result()?;
    Ok(())
}

/// Blocking variant of [`run`] for plain `#[test]` functions.
pub fn run_blocking<T: AstralTest>(mut test: T) -> eyre::Result<()> {
    let runner = TestRunner::from_env()?;
    runner.run_blocking(&mut test)?.into_result()?;
    Ok(())
}
