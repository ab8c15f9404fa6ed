//! Toolkit-agnostic core for generated command forms: parameter schemas
//! become validated controls, submitted forms become argument sets, and
//! commands run on workers while their events are reconciled back on the
//! interactive side.

pub mod demo;
pub mod error;
pub mod events;
pub mod exec;
pub mod form;
pub mod paths;
pub mod progress;
pub mod registry;
pub mod session;
pub mod settings;
