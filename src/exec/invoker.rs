//! The command execution interface consumed by the bridge.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::exec::cancel::CancelToken;
use crate::exec::run::RunId;
use crate::form::marshal::ArgumentSet;
use crate::progress::Progress;
use crate::registry::CommandIdentity;

/// One item of a command's structured output.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Progress { message: String, progress: Progress },
    Record(Value),
    Error { detail: Value, recoverable: bool },
}

/// Lazily produced results. `next()` may block; it runs on a worker.
pub type ResultStream = Box<dyn Iterator<Item = StreamItem> + Send>;

/// Per-run context handed to the command.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run: RunId,
    pub cancel: CancelToken,
}

impl RunContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvokeError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Failed(String),
}

pub trait CommandInvoker: Send + Sync {
    fn invoke(&self, command: &CommandIdentity, args: &ArgumentSet, ctx: &RunContext) -> Result<ResultStream, InvokeError>;
}

type Handler = Box<dyn Fn(&ArgumentSet, &RunContext) -> Result<ResultStream, InvokeError> + Send + Sync>;

/// Invoker backed by a table of closures, one per command.
#[derive(Default)]
pub struct FnInvoker {
    handlers: HashMap<String, Handler>,
}

impl FnInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, command: &str, handler: F) -> Self
    where
        F: Fn(&ArgumentSet, &RunContext) -> Result<ResultStream, InvokeError> + Send + Sync + 'static,
    {
        self.handlers.insert(command.to_string(), Box::new(handler));
        self
    }
}

impl fmt::Debug for FnInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("FnInvoker").field("commands", &names).finish()
    }
}

impl CommandInvoker for FnInvoker {
    fn invoke(&self, command: &CommandIdentity, args: &ArgumentSet, ctx: &RunContext) -> Result<ResultStream, InvokeError> {
        let handler = self
            .handlers
            .get(command.as_str())
            .ok_or_else(|| InvokeError::UnknownCommand(command.to_string()))?;
        handler(args, ctx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dispatches_by_command_name() {
        let invoker = FnInvoker::new().register("echo", |args, _| {
            let payload = args.to_json_object();
            Ok(Box::new(std::iter::once(StreamItem::Record(payload))))
        });
        let ctx = RunContext {
            run: RunId(1),
            cancel: CancelToken::new(),
        };
        let items: Vec<_> = invoker
            .invoke(&"echo".into(), &ArgumentSet::default(), &ctx)
            .unwrap()
            .collect();
        assert_eq!(items, vec![StreamItem::Record(json!({}))]);

        let err = invoker
            .invoke(&"nope".into(), &ArgumentSet::default(), &ctx)
            .err()
            .unwrap();
        assert_eq!(err, InvokeError::UnknownCommand("nope".into()));
    }
}
