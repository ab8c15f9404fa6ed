//! Execution bridge: runs commands on workers and hands their events back
//! to the interactive context in production order.
//!
//! Each launched run gets a blocking worker that drives the command's
//! result stream, and a supervisor task that numbers the worker's output,
//! enforces the cancellation grace period and guarantees exactly one
//! terminal event. Events reach the interactive side through a single
//! inbox that the owner drains with [`ExecutionBridge::dispatch_pending`]
//! or [`ExecutionBridge::dispatch_next`]; subscribers are only ever called
//! from there.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::AppError;
use crate::exec::cancel::CancelToken;
use crate::exec::invoker::{CommandInvoker, RunContext, StreamItem};
use crate::exec::reconcile::{reconcile, Reconciled};
use crate::exec::run::{CommandRun, ErrorCause, LoggedEvent, RunEvent, RunId, RunOutcome, RunSummary};
use crate::form::marshal::ArgumentSet;
use crate::registry::CommandIdentity;
use crate::settings::BridgeSettings;

/// Handle to one launched run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunHandle {
    id: RunId,
}

impl RunHandle {
    pub fn id(self) -> RunId {
        self.id
    }
}

type Subscriber = Box<dyn FnMut(&LoggedEvent)>;

struct RunSlot {
    run: CommandRun,
    cancel: CancelToken,
    subscribers: Vec<Subscriber>,
}

/// Worker → supervisor messages.
#[derive(Debug)]
enum WorkerMsg {
    Item(StreamItem),
    /// The worker saw the cancel flag at a checkpoint and stopped.
    CancelAck,
    Finished,
    Fault(String),
}

pub struct ExecutionBridge {
    invoker: Arc<dyn CommandInvoker>,
    runtime: Handle,
    settings: BridgeSettings,
    next_id: u64,
    runs: HashMap<RunId, RunSlot>,
    inbox_tx: mpsc::UnboundedSender<LoggedEvent>,
    inbox_rx: mpsc::UnboundedReceiver<LoggedEvent>,
}

impl fmt::Debug for ExecutionBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionBridge")
            .field("settings", &self.settings)
            .field("next_id", &self.next_id)
            .field("runs", &self.runs.len())
            .finish_non_exhaustive()
    }
}

impl ExecutionBridge {
    pub fn new(invoker: Arc<dyn CommandInvoker>, runtime: Handle, settings: BridgeSettings) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            invoker,
            runtime,
            settings,
            next_id: 1,
            runs: HashMap::new(),
            inbox_tx,
            inbox_rx,
        }
    }

    /// Start a command on a worker. Returns immediately.
    pub fn launch(&mut self, command: CommandIdentity, args: ArgumentSet) -> RunHandle {
        let id = RunId(self.next_id);
        self.next_id += 1;
        let cancel = CancelToken::new();

        tracing::info!(run = %id, command = %command, args = args.len(), "launching run");
        let job = Job {
            invoker: Arc::clone(&self.invoker),
            command: command.clone(),
            args: args.clone(),
            ctx: RunContext {
                run: id,
                cancel: cancel.clone(),
            },
        };
        self.runtime.spawn(supervise(
            job,
            self.inbox_tx.clone(),
            self.settings.cancel_grace(),
            self.settings.queue_capacity(),
        ));

        self.runs.insert(
            id,
            RunSlot {
                run: CommandRun::new(id, command, args),
                cancel,
                subscribers: Vec::new(),
            },
        );
        RunHandle { id }
    }

    /// Ask a run to stop at its next checkpoint. A no-op for finished runs.
    pub fn cancel(&self, handle: RunHandle) -> Result<(), AppError> {
        let slot = self.slot(handle)?;
        if slot.run.state().is_terminal() {
            tracing::debug!(run = %handle.id, "cancel ignored, run already finished");
            return Ok(());
        }
        tracing::info!(run = %handle.id, "cancellation requested");
        slot.cancel.cancel();
        Ok(())
    }

    /// Subscribe to a run. Events already logged are replayed first, so a
    /// late subscriber sees the same sequence as an early one.
    pub fn on_event<F>(&mut self, handle: RunHandle, mut callback: F) -> Result<(), AppError>
    where
        F: FnMut(&LoggedEvent) + 'static,
    {
        let slot = self
            .runs
            .get_mut(&handle.id)
            .ok_or(AppError::UnknownRun { id: handle.id.0 })?;
        for event in slot.run.log() {
            callback(event);
        }
        slot.subscribers.push(Box::new(callback));
        Ok(())
    }

    pub fn run(&self, handle: RunHandle) -> Result<&CommandRun, AppError> {
        self.slot(handle).map(|slot| &slot.run)
    }

    /// Forget a run. An unfinished run is cancelled first; its remaining
    /// events are dropped on arrival.
    pub fn close_run(&mut self, handle: RunHandle) -> Option<CommandRun> {
        let slot = self.runs.remove(&handle.id)?;
        if !slot.run.state().is_terminal() {
            slot.cancel.cancel();
        }
        Some(slot.run)
    }

    /// Deliver every event that has already arrived. Never waits.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(event) = self.inbox_rx.try_recv() {
            if self.deliver(&event) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Wait for the next event from any run and deliver it.
    pub async fn dispatch_next(&mut self) -> Option<RunId> {
        let event = self.inbox_rx.recv().await?;
        self.deliver(&event);
        Some(event.run)
    }

    /// Drive dispatch until the run reaches a terminal state.
    pub async fn wait_terminal(&mut self, handle: RunHandle) -> Result<RunOutcome, AppError> {
        loop {
            if let Some(outcome) = self.slot(handle)?.run.outcome() {
                return Ok(outcome.clone());
            }
            if self.dispatch_next().await.is_none() {
                return Err(AppError::Worker {
                    message: "event inbox closed".to_string(),
                });
            }
        }
    }

    fn slot(&self, handle: RunHandle) -> Result<&RunSlot, AppError> {
        self.runs.get(&handle.id).ok_or(AppError::UnknownRun { id: handle.id.0 })
    }

    /// Returns whether subscribers saw the event.
    fn deliver(&mut self, event: &LoggedEvent) -> bool {
        let Some(slot) = self.runs.get_mut(&event.run) else {
            tracing::debug!(run = %event.run, seq = event.seq, "dropping event for closed run");
            return false;
        };
        match reconcile(&mut slot.run, event) {
            Reconciled::Recorded => {
                for subscriber in &mut slot.subscribers {
                    subscriber(event);
                }
                true
            }
            Reconciled::Ignored => false,
        }
    }
}

// ── Worker ───────────────────────────────────────────────────────

struct Job {
    invoker: Arc<dyn CommandInvoker>,
    command: CommandIdentity,
    args: ArgumentSet,
    ctx: RunContext,
}

/// Blocking side of a run. Any panic in the command is caught and
/// reported as a fault.
fn work(job: &Job, tx: &mpsc::Sender<WorkerMsg>) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| drive(job, tx)));
    if let Err(payload) = outcome {
        let message = format!("command panicked: {}", panic_message(payload.as_ref()));
        // receiver gone means the supervisor already finished
        let _ = tx.blocking_send(WorkerMsg::Fault(message));
    }
}

fn drive(job: &Job, tx: &mpsc::Sender<WorkerMsg>) {
    let mut stream = match job.invoker.invoke(&job.command, &job.args, &job.ctx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = tx.blocking_send(WorkerMsg::Fault(e.to_string()));
            return;
        }
    };
    loop {
        if job.ctx.is_cancelled() {
            let _ = tx.blocking_send(WorkerMsg::CancelAck);
            return;
        }
        let Some(item) = stream.next() else {
            break;
        };
        let fatal = matches!(
            item,
            StreamItem::Error {
                recoverable: false,
                ..
            }
        );
        if tx.blocking_send(WorkerMsg::Item(item)).is_err() || fatal {
            return;
        }
    }
    // a stream that stops early because it saw the flag acknowledges the cancel
    let last = if job.ctx.is_cancelled() {
        WorkerMsg::CancelAck
    } else {
        WorkerMsg::Finished
    };
    let _ = tx.blocking_send(last);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ── Supervisor ───────────────────────────────────────────────────

/// Numbers events and keeps the completion tally for one run.
struct Emitter {
    run: RunId,
    seq: u64,
    results: usize,
    errors: usize,
    started: Instant,
    out: mpsc::UnboundedSender<LoggedEvent>,
}

impl Emitter {
    /// Returns whether the event was terminal.
    fn emit(&mut self, event: RunEvent) -> bool {
        let terminal = event.is_terminal();
        let logged = LoggedEvent {
            run: self.run,
            seq: self.seq,
            event,
        };
        self.seq += 1;
        if self.out.send(logged).is_err() {
            tracing::debug!(run = %self.run, "bridge dropped, discarding event");
        }
        terminal
    }

    fn item(&mut self, item: StreamItem) -> bool {
        match item {
            StreamItem::Progress { message, progress } => self.emit(RunEvent::Progress { message, progress }),
            StreamItem::Record(payload) => {
                self.results += 1;
                self.emit(RunEvent::PartialResult { payload })
            }
            StreamItem::Error { detail, recoverable } => {
                if recoverable {
                    self.errors += 1;
                }
                self.emit(RunEvent::Error {
                    detail,
                    recoverable,
                    cause: ErrorCause::Command,
                })
            }
        }
    }

    fn completed(&mut self) {
        let elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.emit(RunEvent::Completed {
            summary: RunSummary {
                results: self.results,
                errors: self.errors,
                elapsed_ms,
            },
        });
    }

    fn fault(&mut self, message: String) {
        self.emit(RunEvent::Error {
            detail: serde_json::Value::String(message),
            recoverable: false,
            cause: ErrorCause::Fault,
        });
    }
}

async fn supervise(job: Job, out: mpsc::UnboundedSender<LoggedEvent>, grace: Duration, capacity: usize) {
    let run = job.ctx.run;
    let cancel = job.ctx.cancel.clone();
    let mut emitter = Emitter {
        run,
        seq: 0,
        results: 0,
        errors: 0,
        started: Instant::now(),
        out,
    };

    let (tx, mut rx) = mpsc::channel(capacity);
    // detached: a worker stuck inside the command outlives a forced cancel
    // and exits on its next send
    tokio::task::spawn_blocking(move || work(&job, &tx));

    let mut deadline: Option<Instant> = None;
    loop {
        let msg = if let Some(at) = deadline {
            match tokio::time::timeout_at(at, rx.recv()).await {
                Ok(msg) => msg,
                Err(_) => {
                    tracing::warn!(run = %run, ?grace, "worker ignored cancellation, forcing teardown");
                    emitter.emit(RunEvent::cancelled(true));
                    return;
                }
            }
        } else {
            tokio::select! {
                biased;
                msg = rx.recv() => msg,
                () = cancel.requested() => {
                    tracing::debug!(run = %run, "waiting for cancel acknowledgement");
                    deadline = Some(Instant::now() + grace);
                    continue;
                }
            }
        };

        match msg {
            Some(WorkerMsg::Item(item)) => {
                if emitter.item(item) {
                    return;
                }
            }
            Some(WorkerMsg::CancelAck) => {
                emitter.emit(RunEvent::cancelled(false));
                return;
            }
            Some(WorkerMsg::Finished) => {
                emitter.completed();
                return;
            }
            Some(WorkerMsg::Fault(message)) => {
                tracing::warn!(run = %run, %message, "command fault");
                emitter.fault(message);
                return;
            }
            None => {
                emitter.fault("worker exited without a result".to_string());
                return;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::exec::invoker::{FnInvoker, InvokeError, ResultStream};
    use crate::exec::run::RunState;
    use crate::progress::Progress;

    fn bridge(invoker: FnInvoker, grace_ms: u64) -> ExecutionBridge {
        ExecutionBridge::new(
            Arc::new(invoker),
            Handle::current(),
            BridgeSettings {
                cancel_grace_ms: grace_ms,
                event_queue_capacity: 4,
            },
        )
    }

    fn records(n: usize) -> ResultStream {
        Box::new((0..n).map(|i| StreamItem::Record(json!({ "i": i }))))
    }

    /// Endless progress events; stops only through the cancel checkpoint.
    fn ticking() -> ResultStream {
        Box::new(std::iter::repeat_with(|| {
            std::thread::sleep(Duration::from_millis(5));
            StreamItem::Progress {
                message: "tick".into(),
                progress: Progress::Indeterminate,
            }
        }))
    }

    fn invoker() -> FnInvoker {
        FnInvoker::new()
            .register("three", |_, _| Ok(records(3)))
            .register("three_then_fail", |_, _| {
                Ok(Box::new(records(3).chain(std::iter::once(StreamItem::Error {
                    detail: json!("disk full"),
                    recoverable: false,
                }))))
            })
            .register("tick", |_, _| Ok(ticking()))
            .register("stubborn", |_, _| {
                let first = std::iter::once(StreamItem::Record(json!("early")));
                let slow = std::iter::once_with(|| {
                    std::thread::sleep(Duration::from_millis(400));
                    StreamItem::Record(json!("late"))
                });
                Ok(Box::new(first.chain(slow)))
            })
            .register("panics", |_, _| {
                Ok(Box::new(std::iter::once_with(|| -> StreamItem { panic!("kaboom") })))
            })
            .register("refuses", |_, _| Err(InvokeError::Failed("no backend".into())))
    }

    fn collect(bridge: &mut ExecutionBridge, handle: RunHandle) -> Rc<RefCell<Vec<LoggedEvent>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bridge.on_event(handle, move |e| sink.borrow_mut().push(e.clone())).unwrap();
        seen
    }

    fn assert_single_terminal(events: &[LoggedEvent]) {
        let terminals = events.iter().filter(|e| e.event.is_terminal()).count();
        assert_eq!(terminals, 1, "{events:?}");
        assert!(events.last().unwrap().event.is_terminal());
        for (i, e) in events.iter().enumerate() {
            assert_eq!(e.seq, i as u64);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn completed_run_delivers_results_in_order() {
        let mut bridge = bridge(invoker(), 1000);
        let handle = bridge.launch("three".into(), ArgumentSet::default());
        let seen = collect(&mut bridge, handle);
        let outcome = bridge.wait_terminal(handle).await.unwrap();
        assert_eq!(outcome, RunOutcome::Success);

        let events = seen.borrow();
        assert_single_terminal(&events);
        assert_eq!(events.len(), 4);
        let RunEvent::Completed { summary } = &events[3].event else {
            panic!("expected completion, got {:?}", events[3]);
        };
        assert_eq!(summary.results, 3);
        let run = bridge.run(handle).unwrap();
        assert_eq!(run.partial_results().cloned().collect::<Vec<_>>(), vec![json!({"i":0}), json!({"i":1}), json!({"i":2})]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_after_partials_keeps_the_partials() {
        let mut bridge = bridge(invoker(), 1000);
        let handle = bridge.launch("three_then_fail".into(), ArgumentSet::default());
        let outcome = bridge.wait_terminal(handle).await.unwrap();
        assert_eq!(outcome, RunOutcome::Failed { detail: json!("disk full") });

        let run = bridge.run(handle).unwrap();
        assert_eq!(run.state(), RunState::Failed);
        assert_eq!(run.partial_results().count(), 3);
        assert_single_terminal(run.log());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cooperative_cancel_is_acknowledged() {
        let mut bridge = bridge(invoker(), 2000);
        let handle = bridge.launch("tick".into(), ArgumentSet::default());
        let seen = collect(&mut bridge, handle);
        // let it start
        bridge.dispatch_next().await.unwrap();
        bridge.cancel(handle).unwrap();

        let outcome = bridge.wait_terminal(handle).await.unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled { forced: false });
        let events = seen.borrow();
        assert_single_terminal(&events);
        assert_eq!(events.last().unwrap().event, RunEvent::cancelled(false));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unresponsive_worker_is_torn_down_after_grace() {
        let mut bridge = bridge(invoker(), 50);
        let handle = bridge.launch("stubborn".into(), ArgumentSet::default());
        bridge.dispatch_next().await.unwrap();
        // worker is now blocked inside the slow item
        tokio::time::sleep(Duration::from_millis(50)).await;
        bridge.cancel(handle).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), bridge.wait_terminal(handle))
            .await
            .expect("bounded")
            .unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled { forced: true });
        let run = bridge.run(handle).unwrap();
        assert_eq!(run.state(), RunState::Cancelled);
        assert_eq!(run.log().last().unwrap().event, RunEvent::cancelled(true));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panics_become_fault_events() {
        let mut bridge = bridge(invoker(), 1000);
        let handle = bridge.launch("panics".into(), ArgumentSet::default());
        let outcome = bridge.wait_terminal(handle).await.unwrap();
        let RunOutcome::Failed { detail } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(detail.as_str().unwrap().contains("kaboom"));
        let run = bridge.run(handle).unwrap();
        let RunEvent::Error { cause, .. } = &run.log()[0].event else {
            panic!("expected error event");
        };
        assert_eq!(*cause, ErrorCause::Fault);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invoke_errors_and_unknown_commands_fail_the_run() {
        let mut bridge = bridge(invoker(), 1000);
        let refused = bridge.launch("refuses".into(), ArgumentSet::default());
        let unknown = bridge.launch("missing".into(), ArgumentSet::default());
        assert_eq!(
            bridge.wait_terminal(refused).await.unwrap(),
            RunOutcome::Failed { detail: json!("no backend") }
        );
        assert_eq!(
            bridge.wait_terminal(unknown).await.unwrap(),
            RunOutcome::Failed {
                detail: json!("unknown command 'missing'")
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_runs_never_cross_deliver() {
        let mut bridge = bridge(invoker(), 1000);
        let first = bridge.launch("three".into(), ArgumentSet::default());
        let second = bridge.launch("three_then_fail".into(), ArgumentSet::default());
        assert_ne!(first.id(), second.id());
        let seen_first = collect(&mut bridge, first);
        let seen_second = collect(&mut bridge, second);

        bridge.wait_terminal(first).await.unwrap();
        bridge.wait_terminal(second).await.unwrap();

        assert!(seen_first.borrow().iter().all(|e| e.run == first.id()));
        assert!(seen_second.borrow().iter().all(|e| e.run == second.id()));
        assert_single_terminal(&seen_first.borrow());
        assert_single_terminal(&seen_second.borrow());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn late_subscribers_get_a_replay() {
        let mut bridge = bridge(invoker(), 1000);
        let handle = bridge.launch("three".into(), ArgumentSet::default());
        bridge.wait_terminal(handle).await.unwrap();
        let seen = collect(&mut bridge, handle);
        assert_eq!(seen.borrow().len(), 4);
        // cancelling a finished run changes nothing
        bridge.cancel(handle).unwrap();
        assert_eq!(bridge.dispatch_pending(), 0);
        assert_eq!(bridge.run(handle).unwrap().outcome(), Some(&RunOutcome::Success));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_handles_are_reported() {
        let mut bridge = bridge(invoker(), 1000);
        let handle = bridge.launch("three".into(), ArgumentSet::default());
        bridge.wait_terminal(handle).await.unwrap();
        assert!(bridge.close_run(handle).is_some());
        assert!(matches!(bridge.cancel(handle), Err(AppError::UnknownRun { id: 1 })));
        assert!(bridge.run(handle).is_err());
    }
}
