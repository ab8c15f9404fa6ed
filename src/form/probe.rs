//! Deferred evaluation of expensive field predicates on a worker.

use crate::error::AppError;
use crate::form::assembler::FieldValidity;
use crate::form::descriptor::ParameterDescriptor;
use crate::form::value::{FieldValue, ValueStore};
use crate::registry::validation::CheckDepth;

/// A full validation of one field, detached from the form so it can move
/// to a worker. Stamped with the field's edit generation.
#[derive(Debug, Clone)]
pub struct FieldProbe {
    descriptor: ParameterDescriptor,
    value: FieldValue,
    store: ValueStore,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub field: String,
    pub generation: u64,
    pub validity: FieldValidity,
}

impl FieldProbe {
    pub(crate) fn new(descriptor: ParameterDescriptor, value: FieldValue, store: ValueStore, generation: u64) -> Self {
        Self {
            descriptor,
            value,
            store,
            generation,
        }
    }

    pub fn field(&self) -> &str {
        &self.descriptor.name
    }

    /// Run every predicate. May block on the filesystem.
    pub fn run(self) -> ProbeOutcome {
        let validity = match self.descriptor.evaluate(&self.value, &self.store, CheckDepth::Full) {
            Ok(_) => FieldValidity::Valid,
            Err(reason) => FieldValidity::Invalid { reason },
        };
        ProbeOutcome {
            field: self.descriptor.name,
            generation: self.generation,
            validity,
        }
    }
}

/// Run a probe on the blocking pool.
pub async fn run_probe(probe: FieldProbe) -> Result<ProbeOutcome, AppError> {
    Ok(tokio::task::spawn_blocking(move || probe.run()).await?)
}
