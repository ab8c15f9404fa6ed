//! Parameter schema adapter: declared parameters → toolkit-agnostic descriptors.
//!
//! The mapping from type tag to [`ParamKind`] is closed. Anything the adapter
//! does not recognise degrades to a free-text descriptor carrying a
//! [`SchemaError`] annotation, so one odd parameter never blocks a form.

use std::collections::HashSet;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::SchemaError;
use crate::form::value::{ArgValue, FieldValue, ValueStore};
use crate::registry::params::{ParamSpec, ParameterSchema};
use crate::registry::suite::CommandSuite;
use crate::registry::validation::{choice_label, CheckDepth, Constraint, PathRequirement, Validator};
use crate::registry::CommandIdentity;

const DEFAULT_DELIMITER: &str = ":";

/// Closed set of parameter kinds. Every kind has exactly one control archetype.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamKind {
    Text { multiline: bool },
    /// A path that need not exist yet.
    Path { mode: PathRequirement },
    ExistingPath { mode: PathRequirement },
    Choice { choices: Vec<Value> },
    Bool,
    Integer,
    Float,
    /// Repeatable entries of an item kind, in entry order.
    List { item: Box<ParamKind> },
    KeyValue { delimiter: String },
    /// Mutually exclusive inputs; the selected one provides the value.
    Alternatives { options: Vec<ParamKind> },
}

impl ParamKind {
    pub fn name(&self) -> &'static str {
        match self {
            ParamKind::Text { .. } => "text",
            ParamKind::Path { .. } => "path",
            ParamKind::ExistingPath { .. } => "existing-path",
            ParamKind::Choice { .. } => "choice",
            ParamKind::Bool => "boolean",
            ParamKind::Integer => "integer",
            ParamKind::Float => "float",
            ParamKind::List { .. } => "list",
            ParamKind::KeyValue { .. } => "key-value",
            ParamKind::Alternatives { .. } => "alternatives",
        }
    }

    fn is_path(&self) -> bool {
        matches!(self, ParamKind::Path { .. } | ParamKind::ExistingPath { .. })
    }
}

/// Normalised, immutable description of one command parameter.
#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    pub name: String,
    /// Display name; the parameter name unless a suite overrides it.
    pub label: String,
    pub kind: ParamKind,
    pub default: Option<Value>,
    pub required: bool,
    pub positional: bool,
    /// Explicit null is a legal value.
    pub allow_none: bool,
    pub help: String,
    pub validator: Validator,
    /// One validator per option of an alternatives kind; empty otherwise.
    pub option_validators: Vec<Validator>,
    pub warnings: Vec<SchemaError>,
}

impl ParameterDescriptor {
    /// Allowed values of an enumerated kind (directly or as list items).
    pub fn allowed_values(&self) -> Option<&[Value]> {
        match &self.kind {
            ParamKind::Choice { choices } => Some(choices),
            ParamKind::List { item } => match item.as_ref() {
                ParamKind::Choice { choices } => Some(choices),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_path(&self) -> bool {
        match &self.kind {
            ParamKind::List { item } => item.is_path(),
            kind => kind.is_path(),
        }
    }

    pub fn has_expensive(&self) -> bool {
        self.validator.has_expensive() || self.option_validators.iter().any(Validator::has_expensive)
    }

    /// The declared default in argument shape, coerced like a user value
    /// would be.
    pub fn default_arg(&self) -> Option<ArgValue> {
        let default = self.default.as_ref()?;
        let coerced = match FieldValue::from_default(default) {
            FieldValue::Unset => None,
            value => coerce(&self.kind, &value).ok(),
        };
        Some(coerced.unwrap_or_else(|| ArgValue::from_json(default)))
    }

    /// Help text followed by the constraint summary, for tooltips.
    pub fn tooltip(&self) -> String {
        let rules: Vec<String> = self.validator.constraints().iter().map(Constraint::describe).collect();
        match (self.help.is_empty(), rules.is_empty()) {
            (_, true) => self.help.clone(),
            (true, false) => rules.join("; "),
            (false, false) => format!("{} ({})", self.help, rules.join("; ")),
        }
    }

    /// Coerce and validate a field value.
    ///
    /// `Ok(None)` means "empty optional field". Coercion failures (for example
    /// non-numeric text in an integer field) are reported like any other
    /// predicate failure.
    pub fn evaluate(&self, value: &FieldValue, store: &ValueStore, depth: CheckDepth) -> Result<Option<ArgValue>, String> {
        if value.is_empty() {
            return if self.required {
                Err("required".to_string())
            } else {
                Ok(None)
            };
        }
        if *value == FieldValue::Null {
            return if self.allow_none {
                Ok(Some(ArgValue::Null))
            } else {
                Err("a value is required, none is not allowed".to_string())
            };
        }
        let arg = match &self.kind {
            ParamKind::Alternatives { options } => {
                let (option, arg) = coerce_alternative(options, value)?;
                if let Some(validator) = self.option_validators.get(option) {
                    validator.check(&arg, store, depth)?;
                }
                arg
            }
            kind => coerce(kind, value)?,
        };
        self.validator.check(&arg, store, depth)?;
        Ok(Some(arg))
    }
}

/// Whether a kind takes a value: it coerces and passes the checks the kind
/// itself implies (choice membership). Decides which alternative a plain
/// value activates.
pub(crate) fn accepts(kind: &ParamKind, value: &FieldValue) -> bool {
    coerce(kind, value)
        .and_then(|arg| Validator::new(kind_constraints(kind)).check(&arg, &ValueStore::default(), CheckDepth::Cheap))
        .is_ok()
}

/// Coerce through the selected option, or through the first option that
/// accepts a plain value.
fn coerce_alternative(options: &[ParamKind], value: &FieldValue) -> Result<(usize, ArgValue), String> {
    if let FieldValue::Alternative { option, value } = value {
        let kind = options
            .get(*option)
            .ok_or_else(|| format!("no alternative #{option}"))?;
        return coerce(kind, value).map(|arg| (*option, arg));
    }
    options
        .iter()
        .position(|kind| accepts(kind, value))
        .and_then(|option| {
            let kind = options.get(option)?;
            coerce(kind, value).ok().map(|arg| (option, arg))
        })
        .ok_or_else(|| {
            let names: Vec<&str> = options.iter().map(ParamKind::name).collect();
            format!("matches none of the alternatives ({})", names.join(", "))
        })
}

fn coerce(kind: &ParamKind, value: &FieldValue) -> Result<ArgValue, String> {
    match (kind, value) {
        (_, FieldValue::Null) => Ok(ArgValue::Null),
        (ParamKind::List { item }, FieldValue::List(items)) => items
            .iter()
            .filter(|v| !v.is_empty())
            .map(|v| coerce(item, v))
            .collect::<Result<Vec<_>, _>>()
            .map(ArgValue::List),
        (ParamKind::List { item }, single) => Ok(ArgValue::List(vec![coerce(item, single)?])),
        (ParamKind::KeyValue { delimiter }, v) => coerce_pairs(v, delimiter),
        (ParamKind::Alternatives { options }, v) => coerce_alternative(options, v).map(|(_, arg)| arg),

        (ParamKind::Text { .. }, FieldValue::Text(s)) => Ok(ArgValue::Str(s.clone())),
        (ParamKind::Text { .. }, FieldValue::Int(i)) => Ok(ArgValue::Str(i.to_string())),
        (ParamKind::Text { .. }, FieldValue::Float(f)) => Ok(ArgValue::Str(f.to_string())),
        (ParamKind::Text { .. }, FieldValue::Bool(b)) => Ok(ArgValue::Str(b.to_string())),

        (ParamKind::Path { .. } | ParamKind::ExistingPath { .. }, FieldValue::Text(s)) => Ok(ArgValue::Path(PathBuf::from(s))),

        (ParamKind::Choice { .. }, FieldValue::Choice(v)) => Ok(ArgValue::from_json(v)),
        (ParamKind::Choice { choices }, FieldValue::Text(s)) => Ok(choices
            .iter()
            .find(|c| choice_label(c) == *s)
            .map_or_else(|| ArgValue::Str(s.clone()), ArgValue::from_json)),
        (ParamKind::Choice { .. }, FieldValue::Bool(b)) => Ok(ArgValue::Bool(*b)),
        (ParamKind::Choice { .. }, FieldValue::Int(i)) => Ok(ArgValue::Int(*i)),

        (ParamKind::Bool, FieldValue::Bool(b)) => Ok(ArgValue::Bool(*b)),
        (ParamKind::Bool, FieldValue::Text(s)) => parse_bool(s).map(ArgValue::Bool),

        (ParamKind::Integer, FieldValue::Int(i)) => Ok(ArgValue::Int(*i)),
        (ParamKind::Integer, FieldValue::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(ArgValue::Int)
            .map_err(|_| format!("'{s}' is not an integer")),

        (ParamKind::Float, FieldValue::Float(f)) if f.is_finite() => Ok(ArgValue::Float(*f)),
        #[allow(clippy::cast_precision_loss)]
        (ParamKind::Float, FieldValue::Int(i)) => Ok(ArgValue::Float(*i as f64)),
        (ParamKind::Float, FieldValue::Text(s)) => match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(ArgValue::Float(f)),
            _ => Err(format!("'{s}' is not a number")),
        },

        (kind, _) => Err(format!("expected a {} value", kind.name())),
    }
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(format!("'{s}' is not a boolean")),
    }
}

/// Key/value rows → mapping. Empty and duplicate keys are failures.
fn coerce_pairs(value: &FieldValue, delimiter: &str) -> Result<ArgValue, String> {
    let rows: Vec<(String, String)> = match value {
        FieldValue::Pairs(rows) => rows.clone(),
        FieldValue::Text(s) => s
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry
                    .split_once(delimiter)
                    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                    .ok_or_else(|| format!("'{entry}' is missing the '{delimiter}' delimiter"))
            })
            .collect::<Result<_, _>>()?,
        _ => return Err("expected key/value entries".to_string()),
    };
    let mut map = IndexMap::new();
    for (key, value) in rows.into_iter().filter(|(k, v)| !(k.is_empty() && v.is_empty())) {
        if key.is_empty() {
            return Err("entries need a non-empty key".to_string());
        }
        if map.contains_key(&key) {
            return Err(format!("duplicate key '{key}'"));
        }
        map.insert(key, ArgValue::Str(value));
    }
    Ok(ArgValue::Map(map))
}

// ── Adaptation ──────────────────────────────────────────────────

/// Result of adapting one command's schema.
#[derive(Debug, Clone, Default)]
pub struct Adaptation {
    /// One descriptor per (non-excluded, non-duplicate) parameter, in suite order.
    pub descriptors: Vec<ParameterDescriptor>,
    /// Every annotation raised, including dropped duplicate declarations.
    pub warnings: Vec<SchemaError>,
}

/// Adapt a declared schema into descriptors, applying suite overrides.
pub fn adapt(command: &CommandIdentity, schema: &ParameterSchema, suite: &CommandSuite) -> Adaptation {
    let mut warnings = Vec::new();
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(schema.params.len());
    for spec in &schema.params {
        if seen.insert(spec.name.as_str()) {
            unique.push(spec.clone());
        } else {
            tracing::warn!(%command, parameter = %spec.name, "duplicate parameter declaration ignored");
            warnings.push(SchemaError::new(&spec.name, "duplicate declaration ignored"));
        }
    }

    let descriptors: Vec<ParameterDescriptor> = suite
        .apply(command, &unique)
        .iter()
        .map(|spec| {
            let mut descriptor = adapt_param(spec);
            if let Some(label) = suite.display_name(command, &spec.name) {
                descriptor.label = label.to_string();
            }
            for w in &descriptor.warnings {
                tracing::warn!(%command, parameter = %w.parameter, "{}", w.message);
            }
            warnings.extend(descriptor.warnings.iter().cloned());
            descriptor
        })
        .collect();

    Adaptation { descriptors, warnings }
}

/// Adapt a single declaration. Never fails; problems become warnings.
pub fn adapt_param(spec: &ParamSpec) -> ParameterDescriptor {
    let mut warnings = Vec::new();
    let base = kind_for_tag(&spec.type_tag, spec, &mut warnings);

    let multi = spec.nargs.is_some_and(|n| n.is_multi());
    let kind = match base {
        ParamKind::List { .. } | ParamKind::KeyValue { .. } | ParamKind::Alternatives { .. } => base,
        item if multi => ParamKind::List { item: Box::new(item) },
        single => single,
    };

    let constraints = constraints_for(spec, &kind, &mut warnings);
    let option_validators = match &kind {
        ParamKind::Alternatives { options } => spec
            .alternatives
            .iter()
            .zip(options)
            .map(|(alt, option)| Validator::new(constraints_for(alt, option, &mut warnings)))
            .collect(),
        _ => Vec::new(),
    };

    ParameterDescriptor {
        name: spec.name.clone(),
        label: spec.name.clone(),
        kind,
        default: spec.default.clone(),
        required: spec.required,
        positional: spec.positional,
        allow_none: spec.allow_none || spec.choices.contains(&Value::Null),
        help: spec.doc.clone(),
        validator: Validator::new(constraints),
        option_validators,
        warnings,
    }
}

fn kind_for_tag(tag: &str, spec: &ParamSpec, warnings: &mut Vec<SchemaError>) -> ParamKind {
    match tag {
        "str" | "string" => ParamKind::Text { multiline: spec.multiline },
        "text" => ParamKind::Text { multiline: true },
        "path" => ParamKind::Path { mode: PathRequirement::Any },
        "file" => ParamKind::Path { mode: PathRequirement::File },
        "existing_path" => ParamKind::ExistingPath { mode: PathRequirement::Any },
        "existing_dir" | "directory" | "dataset" => ParamKind::ExistingPath { mode: PathRequirement::Directory },
        "existing_file" => ParamKind::ExistingPath { mode: PathRequirement::File },
        "choice" | "enum" => {
            if spec.choices.is_empty() {
                warnings.push(SchemaError::new(&spec.name, "choice parameter declares no choices; using free text"));
                return ParamKind::Text { multiline: false };
            }
            let mut choices = spec.choices.clone();
            if spec.allow_none && !choices.contains(&Value::Null) {
                choices.push(Value::Null);
            }
            ParamKind::Choice { choices }
        }
        "bool" | "flag" => ParamKind::Bool,
        "int" | "integer" => ParamKind::Integer,
        "float" | "number" => ParamKind::Float,
        "list" => {
            let item_tag = spec.item_type.as_deref().unwrap_or("str");
            let item = match item_tag {
                "list" | "mapping" | "key_value" | "alternatives" | "any_of" => {
                    warnings.push(SchemaError::new(
                        &spec.name,
                        format!("nested '{item_tag}' items are not supported; using free text"),
                    ));
                    ParamKind::Text { multiline: false }
                }
                other => kind_for_tag(other, spec, warnings),
            };
            ParamKind::List { item: Box::new(item) }
        }
        "alternatives" | "any_of" => alternatives_kind(spec, warnings),
        "mapping" | "key_value" => {
            let delimiter = match spec.delimiter.as_deref() {
                Some("") => {
                    warnings.push(SchemaError::new(&spec.name, "empty key/value delimiter; using ':'"));
                    DEFAULT_DELIMITER
                }
                Some(d) => d,
                None => DEFAULT_DELIMITER,
            };
            ParamKind::KeyValue {
                delimiter: delimiter.to_string(),
            }
        }
        other => {
            warnings.push(SchemaError::new(
                &spec.name,
                format!("unsupported type '{other}'; using free text"),
            ));
            ParamKind::Text { multiline: false }
        }
    }
}

/// Options keep their declaration order. Nested alternatives degrade to
/// free text.
fn alternatives_kind(spec: &ParamSpec, warnings: &mut Vec<SchemaError>) -> ParamKind {
    let options: Vec<ParamKind> = spec
        .alternatives
        .iter()
        .map(|alt| {
            let mut alt = alt.clone();
            alt.name.clone_from(&spec.name);
            match alt.type_tag.as_str() {
                "alternatives" | "any_of" => {
                    warnings.push(SchemaError::new(&spec.name, "nested alternatives are not supported; using free text"));
                    ParamKind::Text { multiline: false }
                }
                tag => kind_for_tag(tag, &alt, warnings),
            }
        })
        .collect();
    if options.is_empty() {
        warnings.push(SchemaError::new(&spec.name, "alternatives parameter declares no options; using free text"));
        return ParamKind::Text { multiline: false };
    }
    ParamKind::Alternatives { options }
}

/// Checks implied by a kind on its own, independent of declared bounds.
fn kind_constraints(kind: &ParamKind) -> Vec<Constraint> {
    match kind {
        ParamKind::Choice { choices } => vec![Constraint::OneOf(choices.clone())],
        ParamKind::ExistingPath { mode } => vec![Constraint::Exists(*mode)],
        _ => Vec::new(),
    }
}

fn constraints_for(spec: &ParamSpec, kind: &ParamKind, warnings: &mut Vec<SchemaError>) -> Vec<Constraint> {
    let mut constraints = Vec::new();

    if let Some(n) = spec.min_length {
        constraints.push(Constraint::MinLength(n));
    }
    if let Some(pattern) = &spec.pattern {
        match Constraint::pattern(pattern) {
            Ok(c) => constraints.push(c),
            Err(e) => warnings.push(SchemaError::new(&spec.name, format!("invalid pattern dropped: {e}"))),
        }
    }
    match (spec.min, spec.max) {
        (Some(lo), Some(hi)) if lo > hi => {
            warnings.push(SchemaError::new(
                &spec.name,
                format!("range {lo}..{hi} is empty; range dropped"),
            ));
        }
        (None, None) => {}
        (min, max) => constraints.push(Constraint::Range { min, max }),
    }

    let item = match kind {
        ParamKind::List { item } => item.as_ref(),
        other => other,
    };
    constraints.extend(kind_constraints(item));

    let min_items = spec.nargs.map_or(0, |n| n.min_items());
    if matches!(kind, ParamKind::List { .. }) && min_items > 0 {
        constraints.push(Constraint::MinItems(min_items));
    }
    if !spec.exclusive_with.is_empty() {
        constraints.push(Constraint::ExclusiveWith(spec.exclusive_with.clone()));
    }
    constraints
}
