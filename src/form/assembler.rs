//! Form assembler: lays out controls, keeps per-field validity and derives
//! the submit-enabled flag.
//!
//! Everything here runs on the interactive context. Expensive predicates are
//! never evaluated inline; leaving such a field hands out a [`FieldProbe`]
//! for a worker instead.

use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{AppError, ValidationFailure};
use crate::events::Notification;
use crate::form::descriptor::ParameterDescriptor;
use crate::form::probe::{FieldProbe, ProbeOutcome};
use crate::form::value::{FieldValue, ValueStore};
use crate::form::widgets::{Control, ControlInput, FieldChange, WidgetFactory};
use crate::registry::validation::CheckDepth;
use crate::registry::CommandIdentity;
use crate::settings::AppSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts-export", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-export", ts(export))]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FieldValidity {
    Valid,
    Invalid { reason: String },
}

impl FieldValidity {
    pub fn is_valid(&self) -> bool {
        matches!(self, FieldValidity::Valid)
    }

    fn from_result<T>(result: Result<T, String>) -> Self {
        match result {
            Ok(_) => FieldValidity::Valid,
            Err(reason) => FieldValidity::Invalid { reason },
        }
    }
}

/// Derived form state. Never persisted, never cached across changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormState {
    pub fields: IndexMap<String, FieldValidity>,
    pub submit_enabled: bool,
}

/// Pure derivation: submit is enabled iff every required field is valid.
/// Optional fields never block (an empty optional field is valid anyway;
/// a filled invalid one is caught by the final marshal pass).
pub fn derive_state(descriptors: &[ParameterDescriptor], validity: &IndexMap<String, FieldValidity>) -> FormState {
    let submit_enabled = descriptors
        .iter()
        .filter(|d| d.required)
        .all(|d| validity.get(&d.name).is_some_and(FieldValidity::is_valid));
    FormState {
        fields: validity.clone(),
        submit_enabled,
    }
}

/// Options a host applies to every form it opens.
#[derive(Debug, Clone, Default)]
pub struct FormOptions {
    pub factory: WidgetFactory,
    /// Parameter whose value becomes the base directory of other path pickers.
    pub context_parameter: Option<String>,
}

impl FormOptions {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            factory: WidgetFactory::from_settings(settings),
            context_parameter: settings.context_parameter.clone(),
        }
    }
}

/// One open command dialog.
#[derive(Debug)]
pub struct Form {
    command: CommandIdentity,
    /// Declared order.
    descriptors: Vec<ParameterDescriptor>,
    /// Indices into `descriptors`, in display order.
    layout: Vec<usize>,
    controls: IndexMap<String, Control>,
    store: ValueStore,
    validity: IndexMap<String, FieldValidity>,
    generations: IndexMap<String, u64>,
    state: FormState,
    context_parameter: Option<String>,
    outbox: Vec<Notification>,
}

impl Form {
    pub fn assemble(command: CommandIdentity, descriptors: Vec<ParameterDescriptor>) -> Self {
        Self::assemble_with(command, descriptors, &FormOptions::default())
    }

    /// Required parameters first, declared order kept within each group.
    pub fn assemble_with(command: CommandIdentity, descriptors: Vec<ParameterDescriptor>, options: &FormOptions) -> Self {
        let mut layout: Vec<usize> = (0..descriptors.len()).collect();
        layout.sort_by_key(|&i| descriptors.get(i).is_some_and(|d| !d.required));

        let controls: IndexMap<String, Control> = descriptors
            .iter()
            .map(|d| (d.name.clone(), options.factory.create_control(d)))
            .collect();

        let mut store = ValueStore::new(descriptors.iter().map(|d| d.name.clone()));
        for (name, control) in &controls {
            // keys come from the same descriptor list
            let _ = store.set(name, control.value());
            store.set_baseline(name, control.value());
        }

        let validity: IndexMap<String, FieldValidity> = descriptors
            .iter()
            .map(|d| {
                let value = store.get(&d.name).cloned().unwrap_or_default();
                let validity = FieldValidity::from_result(d.evaluate(&value, &store, CheckDepth::Cheap));
                (d.name.clone(), validity)
            })
            .collect();

        let state = derive_state(&descriptors, &validity);
        let generations = descriptors.iter().map(|d| (d.name.clone(), 0)).collect();

        let mut form = Self {
            command,
            descriptors,
            layout,
            controls,
            store,
            validity,
            generations,
            state,
            context_parameter: options.context_parameter.clone(),
            outbox: Vec::new(),
        };
        form.propagate_context();
        tracing::debug!(command = %form.command, fields = form.descriptors.len(), "form assembled");
        form
    }

    pub fn command(&self) -> &CommandIdentity {
        &self.command
    }

    /// Descriptors in declared order.
    pub fn descriptors(&self) -> &[ParameterDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, field: &str) -> Option<&ParameterDescriptor> {
        self.descriptors.iter().find(|d| d.name == field)
    }

    /// Descriptor/control pairs in layout order.
    pub fn layout(&self) -> impl Iterator<Item = (&ParameterDescriptor, &Control)> {
        self.layout
            .iter()
            .filter_map(|&i| self.descriptors.get(i))
            .filter_map(|d| self.controls.get(&d.name).map(|c| (d, c)))
    }

    pub fn control(&self, field: &str) -> Option<&Control> {
        self.controls.get(field)
    }

    /// For attaching shell listeners.
    pub fn control_mut(&mut self, field: &str) -> Option<&mut Control> {
        self.controls.get_mut(field)
    }

    pub fn values(&self) -> &ValueStore {
        &self.store
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    /// Apply a user edit to one control.
    pub fn edit(&mut self, field: &str, input: ControlInput) -> Result<(), AppError> {
        let change = self.control_entry(field)?.apply(input)?;
        self.sync(change)
    }

    /// Write a value into a control as if the user had entered it.
    pub fn set_value(&mut self, field: &str, value: &FieldValue) -> Result<(), AppError> {
        let change = self.control_entry(field)?.set_value(value)?;
        self.sync(change)
    }

    /// The user left a field. Returns a probe when the field has expensive
    /// predicates that still need to run on a worker.
    pub fn leave_field(&mut self, field: &str) -> Result<Option<FieldProbe>, AppError> {
        let descriptor = self
            .descriptor(field)
            .ok_or_else(|| AppError::UnknownField { name: field.to_string() })?;
        let value = self.store.get(field).cloned().unwrap_or_default();
        if !descriptor.has_expensive() || value.is_empty() {
            return Ok(None);
        }
        let generation = self.generations.get(field).copied().unwrap_or_default();
        Ok(Some(FieldProbe::new(descriptor.clone(), value, self.store.clone(), generation)))
    }

    /// Feed back a probe result. Stale outcomes (the field was edited since
    /// the probe was issued) are discarded; returns whether it was applied.
    pub fn apply_probe(&mut self, outcome: ProbeOutcome) -> bool {
        let current = self.generations.get(&outcome.field).copied();
        if current != Some(outcome.generation) {
            tracing::debug!(field = %outcome.field, "discarding stale probe outcome");
            return false;
        }
        self.record_validity(&outcome.field, outcome.validity);
        self.rederive();
        true
    }

    /// Highlight every failing field after a blocked submission.
    pub fn show_failures(&mut self, failures: &[ValidationFailure]) {
        for failure in failures {
            self.record_validity(
                &failure.field,
                FieldValidity::Invalid {
                    reason: failure.reason.clone(),
                },
            );
        }
        self.outbox.push(Notification::Failures {
            failures: failures.to_vec(),
        });
        self.rederive();
    }

    /// Take the notifications produced since the last drain.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }

    fn control_entry(&mut self, field: &str) -> Result<&mut Control, AppError> {
        self.controls
            .get_mut(field)
            .ok_or_else(|| AppError::UnknownField { name: field.to_string() })
    }

    /// Propagate a control change into the store and revalidate that field only.
    fn sync(&mut self, change: FieldChange) -> Result<(), AppError> {
        let changed = self.store.set(&change.field, change.value)?;
        if changed {
            if let Some(g) = self.generations.get_mut(&change.field) {
                *g += 1;
            }
            if self.context_parameter.as_deref() == Some(change.field.as_str()) {
                self.propagate_context();
            }
        }
        self.revalidate(&change.field);
        self.rederive();
        Ok(())
    }

    fn revalidate(&mut self, field: &str) {
        let Some(descriptor) = self.descriptors.iter().find(|d| d.name == field) else {
            return;
        };
        let value = self.store.get(field).cloned().unwrap_or_default();
        let validity = FieldValidity::from_result(descriptor.evaluate(&value, &self.store, CheckDepth::Cheap));
        self.record_validity(field, validity);
    }

    fn record_validity(&mut self, field: &str, validity: FieldValidity) {
        let Some(slot) = self.validity.get_mut(field) else {
            return;
        };
        if *slot != validity {
            *slot = validity.clone();
            self.outbox.push(Notification::FieldValidity {
                field: field.to_string(),
                validity,
            });
        }
    }

    fn rederive(&mut self) {
        let next = derive_state(&self.descriptors, &self.validity);
        if next.submit_enabled != self.state.submit_enabled {
            self.outbox.push(Notification::SubmitEnabled {
                enabled: next.submit_enabled,
            });
        }
        self.state = next;
    }

    /// Point every other path picker at the context parameter's value.
    fn propagate_context(&mut self) {
        let Some(context) = self.context_parameter.clone() else {
            return;
        };
        let basedir = match self.store.get(&context) {
            Some(FieldValue::Text(dir)) if !dir.is_empty() => Some(dir.clone()),
            _ => None,
        };
        for (name, control) in &mut self.controls {
            if *name != context {
                control.set_basedir(basedir.as_deref().map(Path::new));
            }
        }
    }
}
