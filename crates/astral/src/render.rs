//! Terminal rendering for the progress and failure stream.
//!
//! Functions return plain strings; [`crate::reporter::ConsoleReporter`]
//! writes them out.

use astral_core::events::StepFinishedPayload;
use astral_core::StepKind;

const HEADER_ICON: &str = "\u{1F536}";
const ASSERT_ICON: &str = "\u{1F539}";
const STEP_ICON: &str = "\u{1F538}";
const WAIT_ICON: &str = "\u{23F3}";
const FAILURE_ICON: &str = "\u{1F4A5}";

/// Banner printed before the first step, padded by blank lines.
pub fn header(test_name: &str) -> String {
    format!(" \n {HEADER_ICON} Test: {test_name} \n ")
}

/// Progress line printed when a step starts.
pub fn step_line(index: usize, kind: StepKind, name: &str) -> String {
    format!(" {} [Step #{index}] {name}", icon(kind))
}

/// Line printed when a wait condition is met.
pub fn wait_line(index: usize, name: &str, elapsed_ms: u64) -> String {
    format!(" {WAIT_ICON} [Step #{index}] \"{name}\" Took {elapsed_ms}ms")
}

/// Multi-line description of a failed step.
pub fn failure_block(failure: &StepFinishedPayload) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!(" {FAILURE_ICON} [Step #{}] Failed", failure.index));
    if failure.kind == StepKind::PollUntil {
        if let Some(ms) = failure.elapsed_ms {
            out.push_str(&format!(" (Waited {ms}ms)"));
        }
    }
    out.push('\n');
    out.push_str(&format!(
        "   - Step: {} ({})\n",
        failure.name,
        failure.kind.display_name()
    ));
    out.push_str(&format!(
        "   - Reason: {}\n",
        failure.reason.as_deref().unwrap_or_default()
    ));
    out.push_str(&format!(
        "   - At: {}\n",
        failure.location.as_deref().unwrap_or_default()
    ));
    if let Some(trace) = &failure.error {
        out.push_str("   - Exception:\n");
        out.push_str(trace);
        out.push('\n');
    }
    out
}

fn icon(kind: StepKind) -> &'static str {
    if kind.is_assertion() {
        ASSERT_ICON
    } else {
        STEP_ICON
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astral_core::call_site::UNKNOWN_LOCATION;
    use astral_core::fail::{ASSERTION_FAILED, TIMED_OUT};
    use astral_core::{CallSite, Denylist, FailReason, StepInfo, ThrownError};
    use std::time::Duration;

    fn info(index: usize, name: &str, kind: StepKind) -> StepInfo {
        StepInfo {
            index,
            name: name.to_string(),
            kind,
            call_site: CallSite::unknown(),
        }
    }

    #[test]
    fn header_names_the_test() {
        assert!(header("Test").contains(" \u{1F536} Test: Test "));
    }

    #[test]
    fn assert_kinds_use_blue_icon() {
        assert_eq!(
            step_line(2, StepKind::Assert, "x == 1"),
            " \u{1F539} [Step #2] x == 1"
        );
        assert_eq!(
            step_line(0, StepKind::AssertThrows, "rejects"),
            " \u{1F539} [Step #0] rejects"
        );
        assert_eq!(
            step_line(1, StepKind::PollUntil, "wait"),
            " \u{1F538} [Step #1] wait"
        );
        assert_eq!(
            step_line(3, StepKind::Cleanup, "Cleanup"),
            " \u{1F538} [Step #3] Cleanup"
        );
    }

    #[test]
    fn wait_line_quotes_name() {
        assert_eq!(
            wait_line(1, "country fetched", 12),
            " \u{23F3} [Step #1] \"country fetched\" Took 12ms"
        );
    }

    #[test]
    fn soft_failure_block() {
        let reason = FailReason::new(
            &info(2, "x == 1", StepKind::Assert),
            ASSERTION_FAILED,
            &Denylist::empty(),
        );
        let block = failure_block(&StepFinishedPayload::failed(&reason));

        assert_eq!(
            block,
            format!(
                "\n \u{1F4A5} [Step #2] Failed\n   - Step: x == 1 (Assert)\n   - Reason: Assertion failed\n   - At: {UNKNOWN_LOCATION}\n"
            )
        );
    }

    #[test]
    fn wait_failure_shows_waited_time() {
        let reason = FailReason::new(&info(1, "ready", StepKind::PollUntil), TIMED_OUT, &Denylist::empty())
            .with_elapsed(Duration::from_millis(10_000));
        let block = failure_block(&StepFinishedPayload::failed(&reason));

        assert!(block.starts_with("\n \u{1F4A5} [Step #1] Failed (Waited 10000ms)\n"));
        assert!(block.contains("   - Step: ready (PollUntil)\n"));
        assert!(!block.contains("Exception"));
    }

    #[test]
    fn fatal_failure_includes_exception_trace() {
        let error = ThrownError::from_error(std::io::Error::other("boom"));
        let reason = FailReason::thrown(&info(1, "explode", StepKind::Action), error, &Denylist::empty());
        let block = failure_block(&StepFinishedPayload::failed(&reason));

        assert!(block.contains("   - Reason: Error was thrown\n"));
        assert!(block.contains("   - Exception:\n"));
        assert!(block.contains("boom"));
    }
}
