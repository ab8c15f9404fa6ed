//! Run records and the event vocabulary of the execution bridge.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::form::marshal::ArgumentSet;
use crate::progress::Progress;
use crate::registry::CommandIdentity;

pub const CANCELLED_DETAIL: &str = "cancelled";
pub const CANCELLED_FORCED_DETAIL: &str = "cancelled (forced)";

/// Monotonically increasing per bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where an `error` event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCause {
    /// Reported by the command through its own result protocol.
    Command,
    /// The command failed outside its protocol (invoke error or panic).
    Fault,
    Cancelled,
    /// The worker never acknowledged the cancel request in time.
    CancelledForced,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub results: usize,
    pub errors: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Progress { message: String, progress: Progress },
    /// Opaque result item, forwarded verbatim.
    PartialResult { payload: Value },
    Error {
        detail: Value,
        recoverable: bool,
        cause: ErrorCause,
    },
    Completed { summary: RunSummary },
}

impl RunEvent {
    pub fn cancelled(forced: bool) -> Self {
        let (detail, cause) = if forced {
            (CANCELLED_FORCED_DETAIL, ErrorCause::CancelledForced)
        } else {
            (CANCELLED_DETAIL, ErrorCause::Cancelled)
        };
        RunEvent::Error {
            detail: Value::String(detail.to_string()),
            recoverable: true,
            cause,
        }
    }

    /// Completed, an unrecoverable error, or a cancellation.
    pub fn is_terminal(&self) -> bool {
        match self {
            RunEvent::Completed { .. } => true,
            RunEvent::Error {
                recoverable: false, ..
            } => true,
            RunEvent::Error { cause, .. } => {
                matches!(cause, ErrorCause::Cancelled | ErrorCause::CancelledForced)
            }
            RunEvent::Progress { .. } | RunEvent::PartialResult { .. } => false,
        }
    }
}

/// An event as appended to a run's log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggedEvent {
    pub run: RunId,
    /// Position in the run's log, starting at 0.
    pub seq: u64,
    pub event: RunEvent,
}

impl LoggedEvent {
    pub fn topic(&self) -> &'static str {
        match self.event {
            RunEvent::Progress { .. } => crate::events::PROGRESS,
            _ => crate::events::RUN_EVENT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::Cancelled)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    /// Completed, but the command reported recoverable errors.
    Partial { errors: usize },
    Failed { detail: Value },
    Cancelled { forced: bool },
}

/// One execution of a command. The log is append-only.
#[derive(Debug, Clone, Serialize)]
pub struct CommandRun {
    command: CommandIdentity,
    args: ArgumentSet,
    id: RunId,
    state: RunState,
    log: Vec<LoggedEvent>,
    outcome: Option<RunOutcome>,
}

impl CommandRun {
    pub fn new(id: RunId, command: CommandIdentity, args: ArgumentSet) -> Self {
        Self {
            command,
            args,
            id,
            state: RunState::Pending,
            log: Vec::new(),
            outcome: None,
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn command(&self) -> &CommandIdentity {
        &self.command
    }

    pub fn args(&self) -> &ArgumentSet {
        &self.args
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    pub fn log(&self) -> &[LoggedEvent] {
        &self.log
    }

    /// Partial results in arrival order, whatever the final state.
    pub fn partial_results(&self) -> impl Iterator<Item = &Value> {
        self.log.iter().filter_map(|e| match &e.event {
            RunEvent::PartialResult { payload } => Some(payload),
            _ => None,
        })
    }

    pub(crate) fn set_state(&mut self, state: RunState) {
        self.state = state;
    }

    pub(crate) fn set_outcome(&mut self, outcome: RunOutcome) {
        self.outcome = Some(outcome);
    }

    pub(crate) fn append(&mut self, event: LoggedEvent) {
        self.log.push(event);
    }
}
