//! Single source of truth for notification topics exposed to the visual shell.

use serde::Serialize;

use crate::error::ValidationFailure;
use crate::form::assembler::FieldValidity;

pub const FIELD_VALIDITY: &str = "form:field_validity";
pub const SUBMIT_ENABLED: &str = "form:submit_enabled";
pub const FIELD_FAILURES: &str = "form:failures";
pub const RUN_EVENT: &str = "run:event";
pub const PROGRESS: &str = "run:progress";

/// Form-level notification. Emitted only when the underlying state changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "topic_kind", rename_all = "snake_case")]
pub enum Notification {
    FieldValidity { field: String, validity: FieldValidity },
    SubmitEnabled { enabled: bool },
    /// Submission was blocked; every failing field is listed.
    Failures { failures: Vec<ValidationFailure> },
}

impl Notification {
    pub fn topic(&self) -> &'static str {
        match self {
            Notification::FieldValidity { .. } => FIELD_VALIDITY,
            Notification::SubmitEnabled { .. } => SUBMIT_ENABLED,
            Notification::Failures { .. } => FIELD_FAILURES,
        }
    }
}
