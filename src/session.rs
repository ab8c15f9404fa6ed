//! Binds one form to the execution bridge.

use crate::error::{AppError, ValidationFailure};
use crate::exec::bridge::{ExecutionBridge, RunHandle};
use crate::exec::run::CommandRun;
use crate::form::assembler::Form;
use crate::form::marshal::marshal;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    App(#[from] AppError),
    #[error("{} field(s) failed validation", .0.len())]
    Invalid(Vec<ValidationFailure>),
}

/// A form plus the run it last submitted.
#[derive(Debug)]
pub struct FormSession {
    form: Form,
    current: Option<RunHandle>,
}

impl FormSession {
    pub fn new(form: Form) -> Self {
        Self { form, current: None }
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut Form {
        &mut self.form
    }

    pub fn current(&self) -> Option<RunHandle> {
        self.current
    }

    /// Marshal the form on a worker and launch the command.
    ///
    /// On validation failure every failing field is highlighted and the
    /// form stays editable. Rejected while the previous run is unfinished;
    /// a finished previous run is released once the new one launches.
    pub async fn submit(&mut self, bridge: &mut ExecutionBridge) -> Result<RunHandle, SubmitError> {
        if let Some(handle) = self.current {
            if bridge.run(handle).is_ok_and(|run| !run.state().is_terminal()) {
                return Err(AppError::RunInFlight { id: handle.id().0 }.into());
            }
        }

        let store = self.form.values().clone();
        let descriptors = self.form.descriptors().to_vec();
        let marshalled = tokio::task::spawn_blocking(move || marshal(&store, &descriptors))
            .await
            .map_err(AppError::from)?;

        match marshalled {
            Ok(args) => {
                if let Some(previous) = self.current.take() {
                    bridge.close_run(previous);
                }
                let handle = bridge.launch(self.form.command().clone(), args);
                self.current = Some(handle);
                Ok(handle)
            }
            Err(failures) => {
                tracing::info!(command = %self.form.command(), failures = failures.len(), "submission rejected");
                self.form.show_failures(&failures);
                Err(SubmitError::Invalid(failures))
            }
        }
    }

    /// Cancel the current run, if any.
    pub fn cancel(&self, bridge: &ExecutionBridge) -> Result<(), AppError> {
        match self.current {
            Some(handle) => bridge.cancel(handle),
            None => Ok(()),
        }
    }

    /// The dialog is going away: release the current run from the bridge,
    /// cancelling it first if it is still going. Returns its final record.
    pub fn close(&mut self, bridge: &mut ExecutionBridge) -> Option<CommandRun> {
        let handle = self.current.take()?;
        tracing::debug!(command = %self.form.command(), run = %handle.id(), "form session closed");
        bridge.close_run(handle)
    }
}
