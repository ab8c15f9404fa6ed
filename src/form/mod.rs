//! Form generation: descriptors, controls, validity and marshalling.

pub mod assembler;
pub mod descriptor;
pub mod marshal;
pub mod probe;
pub mod value;
pub mod widgets;

pub use assembler::{FieldValidity, Form, FormOptions, FormState};
pub use descriptor::{adapt, adapt_param, Adaptation, ParamKind, ParameterDescriptor};
pub use marshal::{marshal, ArgumentSet};
pub use probe::{run_probe, FieldProbe, ProbeOutcome};
pub use value::{ArgValue, FieldValue, ValueStore};
pub use widgets::{create_control, Control, ControlHandle, ControlInput, FieldChange, Widget, WidgetFactory};
