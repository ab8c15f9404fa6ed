//! Result reconciler: applies a run's event sequence to its record.

use crate::exec::run::{CommandRun, ErrorCause, LoggedEvent, RunEvent, RunOutcome, RunState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Appended to the log; subscribers should see it.
    Recorded,
    /// Arrived after the run reached a terminal state; dropped.
    Ignored,
}

/// Apply one event to its run.
///
/// Pending → Running on the first non-terminal event; a terminal event
/// moves the run to Completed, Failed or Cancelled. Terminal states are
/// final: anything after them is ignored with a diagnostic.
pub fn reconcile(run: &mut CommandRun, event: &LoggedEvent) -> Reconciled {
    if run.state().is_terminal() {
        tracing::warn!(
            run = %run.id(),
            state = %run.state(),
            seq = event.seq,
            "ignoring event after terminal state"
        );
        return Reconciled::Ignored;
    }

    match &event.event {
        RunEvent::Completed { summary } => {
            run.set_state(RunState::Completed);
            run.set_outcome(if summary.errors > 0 {
                RunOutcome::Partial { errors: summary.errors }
            } else {
                RunOutcome::Success
            });
        }
        RunEvent::Error {
            cause: cause @ (ErrorCause::Cancelled | ErrorCause::CancelledForced),
            ..
        } => {
            run.set_state(RunState::Cancelled);
            run.set_outcome(RunOutcome::Cancelled {
                forced: *cause == ErrorCause::CancelledForced,
            });
        }
        RunEvent::Error {
            detail,
            recoverable: false,
            ..
        } => {
            run.set_state(RunState::Failed);
            run.set_outcome(RunOutcome::Failed { detail: detail.clone() });
        }
        RunEvent::Progress { .. } | RunEvent::PartialResult { .. } | RunEvent::Error { .. } => {
            if run.state() == RunState::Pending {
                run.set_state(RunState::Running);
            }
        }
    }
    run.append(event.clone());
    if run.state().is_terminal() {
        tracing::info!(run = %run.id(), command = %run.command(), state = %run.state(), "run finished");
    }
    Reconciled::Recorded
}
