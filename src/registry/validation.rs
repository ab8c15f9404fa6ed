//! Validation predicates attached to parameter descriptors.
//!
//! Centralizes the checks (ranges, patterns, path existence, exclusivity) so
//! every form produces consistent failure reasons. Predicates are evaluated
//! lazily on coerced values; path existence is flagged expensive and only
//! runs when a field is left or the form is submitted.

use std::path::Path;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::form::value::{ArgValue, ValueStore};

/// How costly a predicate is to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cost {
    Cheap,
    /// Touches the filesystem (or worse); never run per keystroke.
    Expensive,
}

/// Which checks a validation pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckDepth {
    /// Per-edit revalidation: cheap predicates only.
    Cheap,
    /// Leaving a field or submitting: every predicate.
    Full,
}

impl CheckDepth {
    fn includes(self, cost: Cost) -> bool {
        matches!((self, cost), (CheckDepth::Full, _) | (CheckDepth::Cheap, Cost::Cheap))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathRequirement {
    Any,
    File,
    Directory,
}

#[derive(Debug, Clone)]
pub enum Constraint {
    MinLength(usize),
    /// Full-match regular expression.
    Pattern(Regex),
    Range { min: Option<f64>, max: Option<f64> },
    OneOf(Vec<Value>),
    MinItems(usize),
    Exists(PathRequirement),
    /// Must stay empty when any of the named parameters was given a value
    /// (one that differs from its default).
    ExclusiveWith(Vec<String>),
}

impl Constraint {
    /// Compile a pattern constraint. The pattern must match the whole value.
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{pattern})$")).map(Constraint::Pattern)
    }

    pub fn cost(&self) -> Cost {
        match self {
            Constraint::Exists(_) => Cost::Expensive,
            _ => Cost::Cheap,
        }
    }

    /// Whether the predicate applies per item of a list value rather than
    /// to the list as a whole.
    fn per_item(&self) -> bool {
        !matches!(self, Constraint::MinItems(_) | Constraint::ExclusiveWith(_))
    }

    /// Short human-readable description, used as a tooltip next to the help text.
    pub fn describe(&self) -> String {
        match self {
            Constraint::MinLength(n) => format!("at least {n} characters"),
            Constraint::Pattern(re) => format!("must match {}", re.as_str()),
            Constraint::Range { min, max } => match (min, max) {
                (Some(lo), Some(hi)) => format!("between {lo} and {hi}"),
                (Some(lo), None) => format!("at least {lo}"),
                (None, Some(hi)) => format!("at most {hi}"),
                (None, None) => "any number".to_string(),
            },
            Constraint::OneOf(values) => format!(
                "one of {}",
                values.iter().map(choice_label).collect::<Vec<_>>().join(", ")
            ),
            Constraint::MinItems(n) => format!("at least {n} entries"),
            Constraint::Exists(PathRequirement::Any) => "existing path".to_string(),
            Constraint::Exists(PathRequirement::File) => "existing file".to_string(),
            Constraint::Exists(PathRequirement::Directory) => "existing directory".to_string(),
            Constraint::ExclusiveWith(others) => {
                format!("not together with {}", others.join(", "))
            }
        }
    }

    /// Evaluate against a coerced value. `store` gives access to the other
    /// fields for context-dependent predicates.
    pub fn check(&self, value: &ArgValue, store: &ValueStore) -> Result<(), String> {
        if let (ArgValue::List(items), true) = (value, self.per_item()) {
            return items.iter().try_for_each(|item| self.check(item, store));
        }
        match (self, value) {
            (Constraint::MinLength(n), ArgValue::Str(s)) => validate_min_length(s, *n),
            (Constraint::MinLength(n), ArgValue::Path(p)) => validate_min_length(&p.to_string_lossy(), *n),
            (Constraint::Pattern(re), ArgValue::Str(s)) => validate_pattern(re, s),
            (Constraint::Pattern(re), ArgValue::Path(p)) => validate_pattern(re, &p.to_string_lossy()),
            (Constraint::Range { min, max }, ArgValue::Int(v)) => {
                #[allow(clippy::cast_precision_loss)]
                let v = *v as f64;
                validate_range(v, *min, *max)
            }
            (Constraint::Range { min, max }, ArgValue::Float(v)) => validate_range(*v, *min, *max),
            (Constraint::OneOf(allowed), v) => {
                let json = v.to_json();
                if allowed.contains(&json) {
                    Ok(())
                } else {
                    Err(format!("{} is not an allowed value", choice_label(&json)))
                }
            }
            (Constraint::MinItems(n), ArgValue::List(items)) => {
                if items.len() >= *n {
                    Ok(())
                } else {
                    Err(format!("needs at least {n} entries"))
                }
            }
            (Constraint::Exists(req), ArgValue::Path(p)) => validate_existing_path(p, *req),
            (Constraint::Exists(req), ArgValue::Str(s)) => validate_existing_path(Path::new(s), *req),
            (Constraint::ExclusiveWith(others), _) => validate_exclusive(others, store),
            _ => Ok(()),
        }
    }
}

/// Ordered set of predicates for one parameter.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    constraints: Vec<Constraint>,
}

impl Validator {
    pub fn new(constraints: Vec<Constraint>) -> Self {
        Self { constraints }
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn has_expensive(&self) -> bool {
        self.constraints.iter().any(|c| c.cost() == Cost::Expensive)
    }

    /// Run every predicate included by `depth`; first failure wins.
    pub fn check(&self, value: &ArgValue, store: &ValueStore, depth: CheckDepth) -> Result<(), String> {
        self.constraints
            .iter()
            .filter(|c| depth.includes(c.cost()))
            .try_for_each(|c| c.check(value, store))
    }
}

pub(crate) fn choice_label(value: &Value) -> String {
    match value {
        Value::Null => "--none--".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Validate a string length in characters.
pub fn validate_min_length(value: &str, min: usize) -> Result<(), String> {
    if value.chars().count() < min {
        return Err(format!("must be at least {min} characters"));
    }
    Ok(())
}

fn validate_pattern(re: &Regex, value: &str) -> Result<(), String> {
    if re.is_match(value) {
        Ok(())
    } else {
        Err(format!("'{value}' does not match {}", re.as_str()))
    }
}

/// Validate that a number is finite and within optional inclusive bounds.
pub fn validate_range(value: f64, min: Option<f64>, max: Option<f64>) -> Result<(), String> {
    if !value.is_finite() {
        return Err("must be a finite number".to_string());
    }
    if let Some(lo) = min {
        if value < lo {
            return Err(format!("{value} is below the minimum of {lo}"));
        }
    }
    if let Some(hi) = max {
        if value > hi {
            return Err(format!("{value} is above the maximum of {hi}"));
        }
    }
    Ok(())
}

/// Validate that a path exists with the required type.
pub fn validate_existing_path(path: &Path, requirement: PathRequirement) -> Result<(), String> {
    let ok = match requirement {
        PathRequirement::Any => path.exists(),
        PathRequirement::File => path.is_file(),
        PathRequirement::Directory => path.is_dir(),
    };
    if ok {
        return Ok(());
    }
    let what = match requirement {
        PathRequirement::Any => "an existing path",
        PathRequirement::File => "an existing file",
        PathRequirement::Directory => "an existing directory",
    };
    Err(format!("{} is not {what}", path.display()))
}

fn validate_exclusive(others: &[String], store: &ValueStore) -> Result<(), String> {
    match others
        .iter()
        .find(|name| store.is_given(name))
    {
        Some(name) => Err(format!("cannot be combined with '{name}'")),
        None => Ok(()),
    }
}
