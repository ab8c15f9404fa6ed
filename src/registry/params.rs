use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A command's declared parameter schema, as supplied by the host registry.
/// Order of `params` is the declared order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl ParameterSchema {
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Argument-count marker of a parameter, in the argparse convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NargsSymbol {
    #[serde(rename = "?")]
    Optional,
    #[serde(rename = "*")]
    Any,
    #[serde(rename = "+")]
    AtLeastOne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Nargs {
    Count(u32),
    Symbol(NargsSymbol),
}

impl Nargs {
    /// Whether this parameter takes a repeatable list of items.
    pub fn is_multi(self) -> bool {
        match self {
            Nargs::Count(n) => n > 1,
            Nargs::Symbol(NargsSymbol::Any | NargsSymbol::AtLeastOne) => true,
            Nargs::Symbol(NargsSymbol::Optional) => false,
        }
    }

    /// Minimum number of list entries a non-empty submission needs.
    pub fn min_items(self) -> usize {
        match self {
            Nargs::Count(n) if n > 1 => n as usize,
            Nargs::Symbol(NargsSymbol::AtLeastOne) => 1,
            _ => 0,
        }
    }
}

/// One declared parameter. Only `name` and `type` are mandatory; everything
/// else is an optional constraint or presentation hint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub positional: bool,
    #[serde(default)]
    pub choices: Vec<Value>,
    #[serde(default)]
    pub nargs: Option<Nargs>,
    /// Item type tag for `list` parameters (defaults to `str`).
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub min_length: Option<usize>,
    /// Parameters that must not be given together with this one.
    #[serde(default)]
    pub exclusive_with: Vec<String>,
    #[serde(default)]
    pub allow_none: bool,
    #[serde(default)]
    pub multiline: bool,
    /// Key/value delimiter for `mapping` parameters (defaults to `:`).
    #[serde(default)]
    pub delimiter: Option<String>,
    /// Candidate declarations of an `alternatives` parameter, in preference order.
    #[serde(default)]
    pub alternatives: Vec<ParamSpec>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
            ..Self::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn with_choices(mut self, choices: Vec<Value>) -> Self {
        self.choices = choices;
        self
    }

    pub fn with_nargs(mut self, nargs: Nargs) -> Self {
        self.nargs = Some(nargs);
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn exclusive_with(mut self, other: impl Into<String>) -> Self {
        self.exclusive_with.push(other.into());
        self
    }

    pub fn with_alternatives(mut self, alternatives: Vec<ParamSpec>) -> Self {
        self.alternatives = alternatives;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.allow_none = true;
        self
    }
}
