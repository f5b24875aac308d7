//! Whole-run scenarios driven through the public API.

use astral::reporter::{ConsoleReporter, RecordingReporter, Reporter};
use astral::{AstralTest, Config, RunError, StepRegistry, TestRunner};
use astral_core::call_site::UNKNOWN_LOCATION;
use astral_core::events::{EventPayload, EventType};
use astral_core::{RunState, StepStatus};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

/// A test whose steps are supplied by the scenario.
struct Scripted {
    log: Log,
    cleanups: Arc<AtomicU32>,
    build: Box<dyn FnMut(&mut StepRegistry, &Log)>,
}

impl AstralTest for Scripted {
    fn name(&self) -> String {
        "Scripted".to_string()
    }

    fn create_test_steps(&mut self, steps: &mut StepRegistry) {
        (self.build)(steps, &self.log);
    }

    fn cleanup(&mut self) -> eyre::Result<()> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("cleanup".to_string());
        Ok(())
    }
}

fn scripted(build: impl FnMut(&mut StepRegistry, &Log) + 'static) -> Scripted {
    Scripted {
        log: Arc::default(),
        cleanups: Arc::default(),
        build: Box::new(build),
    }
}

/// Action that appends `entry` to the log.
fn record(log: &Log, entry: &str) -> impl FnMut() + Send + 'static {
    let log = Arc::clone(log);
    let entry = entry.to_string();
    move || log.lock().unwrap().push(entry.clone())
}

fn quiet() -> Config {
    Config {
        progress: false,
        ..Default::default()
    }
}

fn runner(config: Config) -> (TestRunner, Arc<RecordingReporter>) {
    astral::init_tracing();
    let reporter = Arc::new(RecordingReporter::new());
    let runner = TestRunner::new(config)
        .unwrap()
        .with_reporter(Arc::clone(&reporter) as Arc<dyn Reporter>);
    (runner, reporter)
}

fn logged(test: &Scripted) -> Vec<String> {
    test.log.lock().unwrap().clone()
}

#[tokio::test(start_paused = true)]
async fn passing_steps_run_once_in_order() {
    let (runner, _) = runner(quiet());
    let mut test = scripted(|steps, log| {
        steps.add_step("first", record(log, "first"));
        steps.add_wait_until("second", {
            let mut note = record(log, "second");
            move || {
                note();
                true
            }
        });
        steps.add_assert("third", {
            let mut note = record(log, "third");
            move || {
                note();
                true
            }
        });
        steps.add_cleanup(record(log, "cleanup step"));
    });

    let outcome = runner.run(&mut test).await.unwrap();

    assert!(outcome.passed());
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(
        logged(&test),
        vec!["first", "second", "third", "cleanup step", "cleanup"]
    );
    assert_eq!(test.cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.steps[3].name, "Cleanup");
}

#[tokio::test(start_paused = true)]
async fn soft_failure_lets_later_steps_run() {
    let (runner, _) = runner(quiet());
    let mut test = scripted(|steps, log| {
        steps.add_step("before", record(log, "before"));
        steps.add_assert("1 == 2", || 1 == 2);
        steps.add_step("after", record(log, "after"));
    });

    let outcome = runner.run(&mut test).await.unwrap();

    assert!(!outcome.passed());
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(logged(&test), vec!["before", "after", "cleanup"]);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].message, "Assertion failed");
    assert!(!outcome.failures[0].is_fatal());
}

#[tokio::test(start_paused = true)]
async fn hard_failure_halts_but_cleanup_runs() {
    let (runner, reporter) = runner(quiet());
    let mut test = scripted(|steps, log| {
        let x = Arc::new(AtomicI32::new(0));
        let set = Arc::clone(&x);
        let mut note = record(log, "set");
        steps.add_step("set x=1", move || {
            set.store(1, Ordering::SeqCst);
            note();
        });
        let check = Arc::clone(&x);
        steps.add_assert("x==1", move || check.load(Ordering::SeqCst) == 1);
        steps.add_step("boom", || -> eyre::Result<()> { eyre::bail!("boom") });
        let mut never = record(log, "never");
        steps.add_assert("never runs", move || {
            never();
            true
        });
    });

    let outcome = runner.run(&mut test).await.unwrap();

    let statuses: Vec<StepStatus> = outcome.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![
            StepStatus::Passed,
            StepStatus::Passed,
            StepStatus::Failed,
            StepStatus::Discarded,
        ]
    );
    assert_eq!(outcome.state, RunState::Halted);
    assert!(!outcome.passed());
    assert_eq!(logged(&test), vec!["set", "cleanup"]);

    let failure = &outcome.failures[0];
    assert!(failure.is_fatal());
    assert_eq!(failure.message, "Error was thrown");
    assert!(failure.error_trace().unwrap().contains("boom"));

    let halted = reporter
        .events()
        .into_iter()
        .find(|e| e.event_type == EventType::RunHalted)
        .unwrap();
    assert!(matches!(
        halted.payload,
        EventPayload::RunHalted(ref p) if p.failed_index == 2 && p.discarded == 1
    ));
}

#[tokio::test(start_paused = true)]
async fn single_failing_assert_completes_without_halt() {
    let (runner, reporter) = runner(quiet());
    let mut test = scripted(|steps, _| {
        steps.add_assert("1==2", || 1 == 2);
    });

    let outcome = runner.run(&mut test).await.unwrap();

    assert_eq!(outcome.state, RunState::Completed);
    assert!(!outcome.passed());
    assert_eq!(outcome.count(StepStatus::Failed), 1);
    assert!(reporter
        .events()
        .iter()
        .all(|e| e.event_type != EventType::RunHalted));
    assert!(outcome.into_result().is_err());
}

#[tokio::test(start_paused = true)]
async fn poll_elapsed_counts_ticks() {
    let config = Config {
        poll_interval_ms: 2,
        ..quiet()
    };
    let (runner, _) = runner(config);
    let mut test = scripted(|steps, _| {
        let polls = AtomicU32::new(0);
        steps.add_wait_until_timeout("fourth check", Duration::from_millis(100), move || {
            polls.fetch_add(1, Ordering::SeqCst) == 3
        });
    });

    let outcome = runner.run(&mut test).await.unwrap();

    assert!(outcome.passed());
    assert_eq!(outcome.steps[0].elapsed, Some(Duration::from_millis(6)));
}

#[tokio::test(start_paused = true)]
async fn poll_timeout_records_timeout_as_elapsed() {
    let (runner, _) = runner(quiet());
    let mut test = scripted(|steps, log| {
        steps.add_wait_until_timeout("never true", Duration::from_millis(25), || false);
        steps.add_step("after", record(log, "after"));
    });

    let outcome = runner.run(&mut test).await.unwrap();

    let failure = &outcome.failures[0];
    assert_eq!(failure.message, "Timed out");
    assert_eq!(failure.elapsed, Some(Duration::from_millis(25)));
    assert!(!failure.is_fatal());
    assert_eq!(logged(&test), vec!["after", "cleanup"]);
}

#[tokio::test(start_paused = true)]
async fn configured_default_timeout_applies_to_untimed_waits() {
    let config = Config {
        default_wait_timeout_ms: 30,
        ..quiet()
    };
    let (runner, _) = runner(config);
    let mut test = scripted(|steps, _| {
        steps.add_wait_until("never true", || false);
    });

    let outcome = runner.run(&mut test).await.unwrap();

    assert_eq!(outcome.failures[0].elapsed, Some(Duration::from_millis(30)));
}

#[tokio::test(start_paused = true)]
async fn assert_throws_passes_only_when_predicate_fails() {
    let (runner, _) = runner(quiet());
    let mut test = scripted(|steps, _| {
        steps.add_assert_throws("returns true", || true);
        steps.add_assert_throws("returns false", || false);
        steps.add_assert_throws("returns error", || "abc".parse::<u8>().map(|n| n > 0));
        steps.add_assert_throws("panics", || -> bool { panic!("rejected input") });
    });

    let outcome = runner.run(&mut test).await.unwrap();

    let statuses: Vec<StepStatus> = outcome.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![
            StepStatus::Failed,
            StepStatus::Failed,
            StepStatus::Passed,
            StepStatus::Passed,
        ]
    );
    assert_eq!(outcome.state, RunState::Completed);
    for failure in &outcome.failures {
        assert_eq!(failure.message, "Unit did not throw");
        assert!(!failure.is_fatal());
    }
}

#[tokio::test(start_paused = true)]
async fn wait_observes_background_work() {
    let (runner, _) = runner(quiet());
    let mut test = scripted(|steps, _| {
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        steps.add_step("start background job", move || {
            let flag = Arc::clone(&flag);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                flag.store(true, Ordering::SeqCst);
            });
        });
        steps.add_wait_until_timeout("job finished", Duration::from_secs(10), move || {
            done.load(Ordering::SeqCst)
        });
    });

    let outcome = runner.run(&mut test).await.unwrap();

    assert!(outcome.passed());
    let elapsed = outcome.steps[1].elapsed.unwrap();
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed <= Duration::from_millis(51));
}

#[tokio::test]
async fn empty_test_is_rejected_without_cleanup() {
    let (runner, _) = runner(quiet());
    let mut test = scripted(|_, _| {});

    let err = runner.run(&mut test).await.unwrap_err();

    assert!(matches!(err, RunError::NoSteps));
    assert_eq!(test.cleanups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failure_points_at_registering_line() {
    let (runner, _) = runner(quiet());
    let line = Arc::new(AtomicU32::new(0));
    let registered = Arc::clone(&line);
    let mut test = scripted(move |steps, _| {
        registered.store(line!() + 1, Ordering::SeqCst);
        steps.add_assert("wrong", || false);
    });

    let outcome = runner.run(&mut test).await.unwrap();

    assert_eq!(
        outcome.failures[0].location,
        format!("{}:{}", file!(), line.load(Ordering::SeqCst))
    );
}

#[tokio::test]
async fn internal_prefix_hides_location() {
    let config = Config {
        internal_prefixes: vec![astral_core::call_site::source_dir_of(file!())],
        ..quiet()
    };
    let (runner, _) = runner(config);
    let mut test = scripted(|steps, _| {
        steps.add_assert("wrong", || false);
    });

    let outcome = runner.run(&mut test).await.unwrap();

    assert_eq!(outcome.failures[0].location, UNKNOWN_LOCATION);
}

/// Shared buffer for reading console output back.
#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn console_stream_matches_progress_format() {
    let buffer = Buffer::default();
    let runner = TestRunner::new(quiet())
        .unwrap()
        .with_reporter(Arc::new(ConsoleReporter::new(buffer.clone())));
    let mut test = scripted(|steps, _| {
        steps.add_step("create user", || {});
        steps.add_wait_until("ready", || true);
        steps.add_assert("x == 1", || false);
    });

    runner.run(&mut test).await.unwrap();

    let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains(" \u{1F536} Test: Scripted "));
    assert!(output.contains(" \u{1F538} [Step #0] create user\n"));
    assert!(output.contains(" \u{1F538} [Step #1] ready\n"));
    assert!(output.contains(" \u{23F3} [Step #1] \"ready\" Took 0ms\n"));
    assert!(output.contains(" \u{1F539} [Step #2] x == 1\n"));
    assert!(output.contains(" \u{1F4A5} [Step #2] Failed\n"));
    assert!(output.contains("   - Step: x == 1 (Assert)\n"));
    assert!(output.contains("   - Reason: Assertion failed\n"));
    assert!(output.contains(&format!("   - At: {}:", file!())));
}

#[tokio::test]
async fn run_helper_reports_failed_steps_as_error() {
    let passing = scripted(|steps, _| {
        steps.add_assert("holds", || true);
    });
    astral::run(passing).await.unwrap();

    let failing = scripted(|steps, _| {
        steps.add_assert("breaks", || false);
    });
    let err = astral::run(failing).await.unwrap_err();
    assert!(err.to_string().contains("Assertion failed"));
}
