//! Asynchronous command execution and run bookkeeping.

pub mod bridge;
pub mod cancel;
pub mod invoker;
pub mod reconcile;
pub mod run;

pub use bridge::{ExecutionBridge, RunHandle};
pub use cancel::{check_cancelled, CancelToken, Cancelled};
pub use invoker::{CommandInvoker, FnInvoker, InvokeError, ResultStream, RunContext, StreamItem};
pub use reconcile::{reconcile, Reconciled};
pub use run::{CommandRun, ErrorCause, LoggedEvent, RunEvent, RunId, RunOutcome, RunState, RunSummary};
