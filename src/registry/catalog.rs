#![allow(clippy::needless_pass_by_value)]

use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::schema_for;
use serde::Serialize;
use serde_json::{Map, Value};

use super::params::{Nargs, NargsSymbol, ParamSpec, ParameterSchema};
use super::{CommandIdentity, CommandRegistry};

/// A registry entry: metadata plus the declared parameter schema.
#[derive(Debug, Clone, Serialize)]
pub struct CommandRegistryEntry {
    pub identity: CommandIdentity,
    pub description: String,
    pub category: String,
    pub param_schema: ParameterSchema,
}

pub fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

pub fn schema_value<T: schemars::JsonSchema>() -> Value {
    let root = schema_for!(T);
    serde_json::to_value(root).unwrap_or(empty_object_schema())
}

/// Build an entry from a typed parameter struct.
pub fn entry<T: schemars::JsonSchema>(
    name: &str,
    description: &str,
    category: &str,
) -> CommandRegistryEntry {
    CommandRegistryEntry {
        identity: CommandIdentity::new(name),
        description: description.to_string(),
        category: category.to_string(),
        param_schema: schema_from_json(&schema_value::<T>()),
    }
}

/// Deserialize marshalled arguments into a typed parameter struct.
pub fn de<T: serde::de::DeserializeOwned>(input: &Value) -> Result<T, String> {
    serde_json::from_value(input.clone()).map_err(|e| e.to_string())
}

// ── schema_with helpers for typed parameter structs ─────────────

fn formatted_string(format: &str) -> Schema {
    SchemaObject {
        instance_type: Some(InstanceType::String.into()),
        format: Some(format.to_string()),
        ..Default::default()
    }
    .into()
}

/// `#[schemars(schema_with = "...")]` for a field that must name an existing directory.
pub fn existing_dir_schema(_gen: &mut SchemaGenerator) -> Schema {
    formatted_string("existing-dir")
}

/// `#[schemars(schema_with = "...")]` for a field that must name an existing file.
pub fn existing_file_schema(_gen: &mut SchemaGenerator) -> Schema {
    formatted_string("existing-file")
}

/// `#[schemars(schema_with = "...")]` for a free filesystem path.
pub fn path_schema(_gen: &mut SchemaGenerator) -> Schema {
    formatted_string("path")
}

/// `#[schemars(schema_with = "...")]` for multi-line text.
pub fn multiline_schema(_gen: &mut SchemaGenerator) -> Schema {
    formatted_string("multiline")
}

// ── JSON Schema → ParameterSchema ───────────────────────────────

/// Convert a JSON Schema object (as generated by schemars) into the
/// registry's declared parameter format. Shapes the format cannot express
/// keep their JSON type as the tag so the adapter can degrade them.
pub fn schema_from_json(root: &Value) -> ParameterSchema {
    let required: Vec<&str> = root
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let params = root
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, schema)| spec_from_property(name, schema, root, required.contains(&name.as_str())))
                .collect()
        })
        .unwrap_or_default();

    ParameterSchema { params }
}

fn spec_from_property(name: &str, raw: &Value, root: &Value, required: bool) -> ParamSpec {
    let mut spec = ParamSpec::new(name, "unknown");
    spec.required = required;
    spec.doc = raw
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    spec.default = raw.get("default").cloned();

    let (schema, nullable) = unwrap_nullable(resolve(raw, root), root);
    spec.allow_none = nullable;
    if spec.doc.is_empty() {
        if let Some(doc) = schema.get("description").and_then(Value::as_str) {
            spec.doc = doc.to_string();
        }
    }
    if spec.default.is_none() {
        spec.default = schema.get("default").cloned();
    }

    if let Some(Value::Array(branches)) = schema.get("anyOf") {
        spec.type_tag = "alternatives".to_string();
        spec.alternatives = branches
            .iter()
            .map(|branch| resolve(branch, root))
            .filter(|branch| !is_null_schema(branch))
            .map(|branch| {
                let mut alt = ParamSpec::new(name, "unknown");
                describe_type(&mut alt, branch, root, false);
                alt
            })
            .collect();
        return spec;
    }

    describe_type(&mut spec, schema, root, nullable);
    spec
}

/// Fill in bounds and the type tag from a (resolved, non-null) schema.
fn describe_type(spec: &mut ParamSpec, schema: &Value, root: &Value, nullable: bool) {
    let obj = schema.as_object();
    let get_f64 = |key: &str| obj.and_then(|o| o.get(key)).and_then(Value::as_f64);
    spec.min = get_f64("minimum");
    spec.max = get_f64("maximum");
    spec.min_length = obj
        .and_then(|o| o.get("minLength"))
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok());
    spec.pattern = obj
        .and_then(|o| o.get("pattern"))
        .and_then(Value::as_str)
        .map(ToString::to_string);

    match json_type(schema) {
        Some("array") => {
            spec.type_tag = "list".to_string();
            spec.nargs = Some(Nargs::Symbol(NargsSymbol::Any));
            if let Some(items) = schema.get("items") {
                let (item, _) = unwrap_nullable(resolve(items, root), root);
                let (tag, choices) = scalar_tag(item);
                spec.item_type = Some(tag);
                spec.choices = choices;
            }
        }
        Some("object") if schema.get("additionalProperties").is_some_and(|a| !matches!(a, Value::Bool(false))) => {
            spec.type_tag = "mapping".to_string();
        }
        _ => {
            let (tag, mut choices) = scalar_tag(schema);
            if tag == "choice" && nullable && !choices.contains(&Value::Null) {
                choices.push(Value::Null);
            }
            spec.multiline = tag == "text";
            spec.type_tag = tag;
            spec.choices = choices;
        }
    }
}

/// Follow a local `$ref` (also through a single-element `allOf` wrapper,
/// which schemars emits when a referenced field carries a doc comment).
fn resolve<'a>(schema: &'a Value, root: &'a Value) -> &'a Value {
    if let Some(name) = schema
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|r| r.strip_prefix("#/definitions/"))
    {
        if let Some(def) = root.get("definitions").and_then(|d| d.get(name)) {
            return def;
        }
    }
    if let Some(Value::Array(all)) = schema.get("allOf") {
        if let [only] = all.as_slice() {
            return resolve(only, root);
        }
    }
    schema
}

fn is_null_schema(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("null")
}

/// Strip `null` from `"type": [T, "null"]` and `anyOf: [T, {"type": "null"}]`.
/// An `anyOf` with several non-null branches is kept as is.
fn unwrap_nullable<'a>(schema: &'a Value, root: &'a Value) -> (&'a Value, bool) {
    if let Some(Value::Array(types)) = schema.get("type") {
        let nullable = types.iter().any(|t| t == "null");
        return (schema, nullable);
    }
    if let Some(Value::Array(any)) = schema.get("anyOf") {
        let nullable = any.iter().any(is_null_schema);
        let mut branches = any.iter().filter(|s| !is_null_schema(s));
        if let (Some(only), None) = (branches.next(), branches.next()) {
            return (resolve(only, root), nullable);
        }
        return (schema, nullable);
    }
    (schema, false)
}

/// The primary JSON type of a schema, ignoring `null` in type arrays.
fn json_type(schema: &Value) -> Option<&str> {
    match schema.get("type") {
        Some(Value::String(t)) => Some(t.as_str()),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
        _ => None,
    }
}

fn scalar_tag(schema: &Value) -> (String, Vec<Value>) {
    let map: Option<&Map<String, Value>> = schema.as_object();
    let format = map.and_then(|m| m.get("format")).and_then(Value::as_str);
    let tag = match format {
        Some("existing-dir") => "existing_dir",
        Some("existing-file") => "existing_file",
        Some("existing-path") => "existing_path",
        Some("path") => "path",
        Some("multiline") => "text",
        _ => {
            if let Some(Value::Array(choices)) = map.and_then(|m| m.get("enum")) {
                return ("choice".to_string(), choices.clone());
            }
            match json_type(schema) {
                Some("string") => "str",
                Some("integer") => "int",
                Some("number") => "float",
                Some("boolean") => "bool",
                Some(other) => return (other.to_string(), Vec::new()),
                None => "unknown",
            }
        }
    };
    (tag.to_string(), Vec::new())
}

// ── Static registry ─────────────────────────────────────────────

/// In-memory registry built from a fixed list of entries.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    entries: Vec<CommandRegistryEntry>,
}

impl StaticRegistry {
    pub fn new(entries: Vec<CommandRegistryEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CommandRegistryEntry] {
        &self.entries
    }
}

impl CommandRegistry for StaticRegistry {
    fn list_commands(&self) -> Vec<CommandIdentity> {
        self.entries.iter().map(|e| e.identity.clone()).collect()
    }

    fn get_schema(&self, command: &CommandIdentity) -> Option<ParameterSchema> {
        self.entries
            .iter()
            .find(|e| &e.identity == command)
            .map(|e| e.param_schema.clone())
    }

    fn describe(&self, command: &CommandIdentity) -> Option<String> {
        self.entries
            .iter()
            .find(|e| &e.identity == command)
            .map(|e| e.description.clone())
    }
}

/// Help text for command discovery.
/// No topic → command list grouped by category; command name → parameter table.
pub fn help_text(registry: &StaticRegistry, topic: Option<&str>) -> String {
    match topic {
        None => {
            let mut lines = vec!["Available commands:".to_string()];
            let mut categories: Vec<&str> = Vec::new();
            for e in registry.entries() {
                if !categories.contains(&e.category.as_str()) {
                    categories.push(&e.category);
                }
            }
            for category in categories {
                lines.push(format!("  [{category}]"));
                for e in registry.entries().iter().filter(|e| e.category == category) {
                    lines.push(format!("    {} — {}", e.identity, e.description));
                }
            }
            lines.join("\n")
        }
        Some(topic) => match registry.entries().iter().find(|e| e.identity.as_str() == topic) {
            Some(e) => {
                let mut lines = vec![format!("{}: {}", e.identity, e.description), String::new()];
                for p in &e.param_schema.params {
                    let marker = if p.required { "*" } else { " " };
                    lines.push(format!("  {marker} {} ({}) {}", p.name, p.type_tag, p.doc));
                }
                lines.join("\n")
            }
            None => format!("Unknown topic: \"{topic}\". Run without a topic to list commands."),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, schemars::JsonSchema)]
    #[allow(dead_code)]
    struct ListParams {
        /// Directory to list.
        #[schemars(schema_with = "existing_dir_schema")]
        path: std::path::PathBuf,
        #[serde(default)]
        recursive: bool,
        #[serde(default)]
        depth: Option<u32>,
        #[serde(default)]
        patterns: Vec<String>,
    }

    #[test]
    fn typed_struct_becomes_declared_schema() {
        let e = entry::<ListParams>("ls", "List a directory", "files");
        let schema = &e.param_schema;

        let path = schema.get("path").unwrap();
        assert_eq!(path.type_tag, "existing_dir");
        assert!(path.required);

        let recursive = schema.get("recursive").unwrap();
        assert_eq!(recursive.type_tag, "bool");
        assert!(!recursive.required);

        let depth = schema.get("depth").unwrap();
        assert_eq!(depth.type_tag, "int");
        assert!(depth.allow_none);

        let patterns = schema.get("patterns").unwrap();
        assert_eq!(patterns.type_tag, "list");
        assert_eq!(patterns.item_type.as_deref(), Some("str"));
    }

    #[test]
    fn hand_written_schema_with_refs_and_enums() {
        let root = json!({
            "type": "object",
            "required": ["mode"],
            "properties": {
                "mode": { "description": "How to save", "allOf": [{ "$ref": "#/definitions/Mode" }] },
                "to": { "anyOf": [{ "$ref": "#/definitions/Mode" }, { "type": "null" }] },
                "labels": { "type": "object", "additionalProperties": { "type": "string" } },
                "blob": { "type": "object" }
            },
            "definitions": {
                "Mode": { "type": "string", "enum": ["fast", "safe"] }
            }
        });
        let schema = schema_from_json(&root);

        let mode = schema.get("mode").unwrap();
        assert_eq!(mode.type_tag, "choice");
        assert_eq!(mode.choices, vec![json!("fast"), json!("safe")]);
        assert_eq!(mode.doc, "How to save");
        assert!(mode.required);

        let to = schema.get("to").unwrap();
        assert_eq!(to.type_tag, "choice");
        assert!(to.choices.contains(&Value::Null));

        assert_eq!(schema.get("labels").unwrap().type_tag, "mapping");
        // an object without a value schema is not expressible; tag stays "object"
        assert_eq!(schema.get("blob").unwrap().type_tag, "object");
    }

    #[derive(Deserialize, schemars::JsonSchema)]
    #[serde(untagged)]
    #[allow(dead_code)]
    enum Since {
        Count(u32),
        Reference(String),
    }

    #[derive(Deserialize, schemars::JsonSchema)]
    #[allow(dead_code)]
    struct LogParams {
        since: Option<Since>,
    }

    #[test]
    fn untagged_enum_becomes_alternatives() {
        let e = entry::<LogParams>("log", "Show history", "history");
        let since = e.param_schema.get("since").unwrap();
        assert_eq!(since.type_tag, "alternatives");
        assert!(since.allow_none);
        let tags: Vec<&str> = since.alternatives.iter().map(|a| a.type_tag.as_str()).collect();
        assert_eq!(tags, ["int", "str"]);
        assert_eq!(since.alternatives[0].min, Some(0.0));
        assert!(since.alternatives.iter().all(|a| a.name == "since"));
    }

    #[test]
    fn any_of_with_one_branch_stays_a_plain_parameter() {
        let root = json!({
            "type": "object",
            "properties": {
                "jobs": { "anyOf": [{ "type": "integer" }, { "type": "null" }] },
                "since": { "anyOf": [{ "type": "integer" }, { "type": "string", "enum": ["HEAD"] }] }
            }
        });
        let schema = schema_from_json(&root);
        let jobs = schema.get("jobs").unwrap();
        assert_eq!(jobs.type_tag, "int");
        assert!(jobs.allow_none);

        let since = schema.get("since").unwrap();
        assert_eq!(since.type_tag, "alternatives");
        assert!(!since.allow_none);
        assert_eq!(since.alternatives[1].type_tag, "choice");
        assert_eq!(since.alternatives[1].choices, vec![json!("HEAD")]);
    }

    #[test]
    fn static_registry_serves_entries() {
        let registry = StaticRegistry::new(vec![entry::<ListParams>("ls", "List", "files")]);
        assert_eq!(registry.list_commands(), vec![CommandIdentity::new("ls")]);
        assert!(registry.get_schema(&"ls".into()).is_some());
        assert_eq!(registry.describe(&"ls".into()).as_deref(), Some("List"));
        assert!(help_text(&registry, None).contains("ls — List"));
        assert!(help_text(&registry, Some("ls")).contains("* path (existing_dir)"));
        assert!(help_text(&registry, Some("zzz")).starts_with("Unknown topic"));
    }

    #[test]
    fn de_reads_typed_params() {
        let params: ListParams = de(&json!({ "path": "/tmp" })).unwrap();
        assert!(!params.recursive);
        assert!(de::<ListParams>(&json!({})).is_err());
    }
}
