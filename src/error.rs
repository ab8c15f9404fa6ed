use serde::Serialize;
use thiserror::Error;

/// Structured error type for the form and execution core. The UI shell
/// matches on `code` to decide how to present a failed call.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "code", content = "detail")]
pub enum AppError {
    #[error("unknown command '{name}'")]
    UnknownCommand { name: String },
    #[error("form has no parameter named '{name}'")]
    UnknownField { name: String },
    #[error("no run with id {id}")]
    UnknownRun { id: u64 },
    #[error("run {id} is still in flight")]
    RunInFlight { id: u64 },
    #[error("{control} control does not accept {input} input")]
    UnsupportedInput { control: String, input: String },
    #[error("{control} control cannot represent {value}")]
    Unrepresentable { control: String, value: String },
    #[error("control has no entry {index}")]
    NoSuchEntry { index: usize },
    #[error("I/O error: {message}")]
    Io { message: String },
    #[error("JSON error: {message}")]
    Json { message: String },
    #[error("worker failed: {message}")]
    Worker { message: String },
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Json {
            message: e.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        AppError::Worker {
            message: e.to_string(),
        }
    }
}

/// A parameter declaration the adapter could not translate faithfully.
/// Never fatal: the descriptor degrades and carries this as an annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[cfg_attr(feature = "ts-export", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-export", ts(export))]
#[error("parameter '{parameter}': {message}")]
pub struct SchemaError {
    pub parameter: String,
    pub message: String,
}

impl SchemaError {
    pub fn new(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            message: message.into(),
        }
    }
}

/// One field that failed its predicate at submit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[cfg_attr(feature = "ts-export", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-export", ts(export))]
#[error("{field}: {reason}")]
pub struct ValidationFailure {
    pub field: String,
    pub reason: String,
}

impl ValidationFailure {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
