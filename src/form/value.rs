use std::path::PathBuf;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;

/// What a control currently holds. May be incomplete or invalid; coercion
/// into an [`ArgValue`] happens during validation.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Never touched and no default.
    #[default]
    Unset,
    /// Explicit "none", distinct from unset.
    Null,
    Text(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    /// The selected entry of a choice control, as declared.
    Choice(Value),
    List(Vec<FieldValue>),
    /// Key/value rows in entry order. Duplicates are kept until marshalling;
    /// rows with neither key nor value are ignored.
    Pairs(Vec<(String, String)>),
    /// The value of the selected input of an alternatives control.
    Alternative { option: usize, value: Box<FieldValue> },
}

impl FieldValue {
    /// Whether the field counts as "not filled in". Explicit null is a value.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Unset => true,
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::List(items) => items.iter().all(FieldValue::is_empty),
            FieldValue::Pairs(rows) => rows.iter().all(|(k, v)| k.is_empty() && v.is_empty()),
            FieldValue::Alternative { value, .. } => value.is_empty(),
            FieldValue::Null
            | FieldValue::Bool(_)
            | FieldValue::Int(_)
            | FieldValue::Float(_)
            | FieldValue::Choice(_) => false,
        }
    }

    /// Best-effort conversion of a declared default into a control value.
    pub fn from_default(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => n.as_f64().map_or(FieldValue::Unset, FieldValue::Float),
            },
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Array(items) => FieldValue::List(items.iter().map(FieldValue::from_default).collect()),
            Value::Object(map) => FieldValue::Pairs(
                map.iter()
                    .map(|(k, v)| {
                        let v = v.as_str().map_or_else(|| v.to_string(), ToString::to_string);
                        (k.clone(), v)
                    })
                    .collect(),
            ),
        }
    }

    /// Parse the value half of a `name=value` command-line edit.
    /// `none` maps to explicit null and `true`/`false` to booleans; anything
    /// else stays text. Splitting list input is up to the caller.
    pub fn parse_text(raw: &str) -> Self {
        match raw {
            "none" => FieldValue::Null,
            "true" => FieldValue::Bool(true),
            "false" => FieldValue::Bool(false),
            _ => FieldValue::Text(raw.to_string()),
        }
    }
}

/// A coerced argument value as handed to the command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Path(PathBuf),
    List(Vec<ArgValue>),
    Map(IndexMap<String, ArgValue>),
}

impl ArgValue {
    pub fn to_json(&self) -> Value {
        match self {
            ArgValue::Null => Value::Null,
            ArgValue::Bool(b) => Value::Bool(*b),
            ArgValue::Int(i) => Value::from(*i),
            ArgValue::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            ArgValue::Str(s) => Value::String(s.clone()),
            ArgValue::Path(p) => Value::String(p.to_string_lossy().into_owned()),
            ArgValue::List(items) => Value::Array(items.iter().map(ArgValue::to_json).collect()),
            ArgValue::Map(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => ArgValue::Null,
            Value::Bool(b) => ArgValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ArgValue::Int(i),
                None => n.as_f64().map_or(ArgValue::Null, ArgValue::Float),
            },
            Value::String(s) => ArgValue::Str(s.clone()),
            Value::Array(items) => ArgValue::List(items.iter().map(ArgValue::from_json).collect()),
            Value::Object(map) => ArgValue::Map(map.iter().map(|(k, v)| (k.clone(), ArgValue::from_json(v))).collect()),
        }
    }
}

/// Current user-entered values of one form, keyed by parameter name.
/// The key set is fixed when the form is assembled.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValueStore {
    values: IndexMap<String, FieldValue>,
    /// Per field, the value that does not count as given by the user.
    #[serde(skip)]
    baselines: IndexMap<String, FieldValue>,
}

impl ValueStore {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: names.into_iter().map(|n| (n.into(), FieldValue::Unset)).collect(),
            baselines: IndexMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// Replace a field's value. Returns whether the value actually changed.
    pub(crate) fn set(&mut self, name: &str, value: FieldValue) -> Result<bool, AppError> {
        let slot = self.values.get_mut(name).ok_or_else(|| AppError::UnknownField {
            name: name.to_string(),
        })?;
        if *slot == value {
            return Ok(false);
        }
        *slot = value;
        Ok(true)
    }

    /// Record what a field holds while the user has not given it a value:
    /// its declared default as the control shows it, or an unticked box.
    pub(crate) fn set_baseline(&mut self, name: &str, value: FieldValue) {
        if self.values.contains_key(name) {
            self.baselines.insert(name.to_string(), value);
        }
    }

    /// Whether the user gave this field a value: non-empty and different
    /// from its baseline.
    pub fn is_given(&self, name: &str) -> bool {
        self.values
            .get(name)
            .is_some_and(|v| !v.is_empty() && self.baselines.get(name) != Some(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn emptiness() {
        assert!(FieldValue::Unset.is_empty());
        assert!(FieldValue::Text(String::new()).is_empty());
        assert!(FieldValue::List(vec![FieldValue::Text(String::new())]).is_empty());
        assert!(!FieldValue::Null.is_empty());
        assert!(!FieldValue::Bool(false).is_empty());
    }

    #[test]
    fn store_rejects_unknown_fields_and_reports_changes() {
        let mut store = ValueStore::new(["path"]);
        assert!(store.set("path", FieldValue::Text("/tmp".into())).unwrap());
        assert!(!store.set("path", FieldValue::Text("/tmp".into())).unwrap());
        assert_eq!(
            store.set("other", FieldValue::Null).unwrap_err(),
            AppError::UnknownField { name: "other".into() }
        );
    }

    #[test]
    fn values_equal_to_the_baseline_are_not_given() {
        let mut store = ValueStore::new(["amend", "jobs", "label"]);
        store.set_baseline("amend", FieldValue::Bool(false));
        store.set_baseline("jobs", FieldValue::Int(4));
        store.set("amend", FieldValue::Bool(false)).unwrap();
        store.set("jobs", FieldValue::Int(4)).unwrap();
        assert!(!store.is_given("amend"));
        assert!(!store.is_given("jobs"));
        assert!(!store.is_given("label"));

        store.set("amend", FieldValue::Bool(true)).unwrap();
        store.set("jobs", FieldValue::Int(8)).unwrap();
        store.set("label", FieldValue::Text("x".into())).unwrap();
        assert!(store.is_given("amend"));
        assert!(store.is_given("jobs"));
        assert!(store.is_given("label"));
    }

    #[test]
    fn arg_values_serialize_as_plain_json() {
        let mut map = IndexMap::new();
        map.insert("k".to_string(), ArgValue::Str("v".into()));
        let value = ArgValue::List(vec![
            ArgValue::Path("/data".into()),
            ArgValue::Int(3),
            ArgValue::Null,
            ArgValue::Map(map),
        ]);
        let expected = json!(["/data", 3, null, { "k": "v" }]);
        assert_eq!(serde_json::to_value(&value).unwrap(), expected);
        assert_eq!(value.to_json(), expected);
    }

    #[test]
    fn defaults_become_field_values() {
        assert_eq!(FieldValue::from_default(&json!(false)), FieldValue::Bool(false));
        assert_eq!(FieldValue::from_default(&json!(2)), FieldValue::Int(2));
        assert_eq!(
            FieldValue::from_default(&json!({ "a": "b" })),
            FieldValue::Pairs(vec![("a".into(), "b".into())])
        );
    }
}
