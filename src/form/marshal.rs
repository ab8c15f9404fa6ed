//! Argument marshaller: the final validation gate before execution.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ValidationFailure;
use crate::form::descriptor::ParameterDescriptor;
use crate::form::value::{ArgValue, FieldValue, ValueStore};
use crate::registry::validation::CheckDepth;

/// Call arguments in the shape the command expects.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArgumentSet {
    /// Declared order.
    pub positional: Vec<(String, ArgValue)>,
    pub keywords: IndexMap<String, ArgValue>,
}

impl ArgumentSet {
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.positional
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .or_else(|| self.keywords.get(name))
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All arguments by name, for commands that take a single JSON object.
    pub fn to_json_object(&self) -> Value {
        let map: Map<String, Value> = self
            .positional
            .iter()
            .map(|(n, v)| (n, v))
            .chain(self.keywords.iter())
            .map(|(n, v)| (n.clone(), v.to_json()))
            .collect();
        Value::Object(map)
    }
}

/// Run every field's full validation and, if all pass, build the argument set.
///
/// Every failing field is reported, not just the first. Omitted optional
/// parameters with a declared default receive it; others are left out.
pub fn marshal(store: &ValueStore, descriptors: &[ParameterDescriptor]) -> Result<ArgumentSet, Vec<ValidationFailure>> {
    let mut args = ArgumentSet::default();
    let mut failures = Vec::new();

    for descriptor in descriptors {
        let value = store.get(&descriptor.name).unwrap_or(&FieldValue::Unset);
        let arg = match descriptor.evaluate(value, store, CheckDepth::Full) {
            Ok(Some(arg)) => arg,
            Ok(None) => match descriptor.default_arg() {
                Some(default) => default,
                None => continue,
            },
            Err(reason) => {
                failures.push(ValidationFailure::new(&descriptor.name, reason));
                continue;
            }
        };
        if descriptor.positional {
            args.positional.push((descriptor.name.clone(), arg));
        } else {
            args.keywords.insert(descriptor.name.clone(), arg);
        }
    }

    if failures.is_empty() {
        Ok(args)
    } else {
        tracing::debug!(failures = failures.len(), "submission blocked");
        Err(failures)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::form::assembler::Form;
    use crate::form::descriptor::adapt_param;
    use crate::form::widgets::ControlInput;
    use crate::registry::params::{Nargs, NargsSymbol, ParamSpec};
    use serde_json::json;

    fn ls_form() -> Form {
        let specs = [
            ParamSpec::new("path", "existing_path").required(),
            ParamSpec::new("recursive", "bool").with_default(json!(false)),
        ];
        Form::assemble("ls".into(), specs.iter().map(adapt_param).collect())
    }

    #[test]
    fn empty_required_path_blocks_submission() {
        let form = ls_form();
        assert!(!form.state().submit_enabled);
        let failures = marshal(form.values(), form.descriptors()).unwrap_err();
        let rendered: Vec<String> = failures.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["path: required"]);
    }

    #[test]
    fn valid_directory_marshals_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut form = ls_form();
        form.edit("path", ControlInput::Text(dir.path().display().to_string()))
            .unwrap();
        assert!(form.state().submit_enabled);

        let args = marshal(form.values(), form.descriptors()).unwrap();
        assert_eq!(args.get("path"), Some(&ArgValue::Path(dir.path().to_path_buf())));
        assert_eq!(args.get("recursive"), Some(&ArgValue::Bool(false)));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn all_failures_are_collected() {
        let specs = [
            ParamSpec::new("a", "str").required(),
            ParamSpec::new("b", "int").required(),
            ParamSpec::new("c", "str"),
        ];
        let form = Form::assemble("x".into(), specs.iter().map(adapt_param).collect());
        let failures = marshal(form.values(), form.descriptors()).unwrap_err();
        let fields: Vec<_> = failures.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, ["a", "b"]);
    }

    #[test]
    fn mutually_exclusive_parameters_fail_at_submit() {
        let specs = [
            ParamSpec::new("message", "str").exclusive_with("message_file"),
            ParamSpec::new("message_file", "path"),
        ];
        let mut form = Form::assemble("save".into(), specs.iter().map(adapt_param).collect());
        form.edit("message", ControlInput::Text("hi".into())).unwrap();
        form.edit("message_file", ControlInput::Text("/tmp/msg".into())).unwrap();

        let failures = marshal(form.values(), form.descriptors()).unwrap_err();
        assert_eq!(failures, vec![ValidationFailure::new("message", "cannot be combined with 'message_file'")]);
    }

    #[test]
    fn exclusivity_ignores_an_untouched_flag() {
        let specs = [
            ParamSpec::new("message", "str").exclusive_with("amend"),
            ParamSpec::new("amend", "bool"),
        ];
        let mut form = Form::assemble("save".into(), specs.iter().map(adapt_param).collect());
        assert_eq!(form.values().get("amend"), Some(&FieldValue::Bool(false)));
        form.edit("message", ControlInput::Text("hi".into())).unwrap();

        let args = marshal(form.values(), form.descriptors()).unwrap();
        assert_eq!(args.get("message"), Some(&ArgValue::Str("hi".into())));

        form.edit("amend", ControlInput::Check(Some(true))).unwrap();
        let failures = marshal(form.values(), form.descriptors()).unwrap_err();
        assert_eq!(failures, vec![ValidationFailure::new("message", "cannot be combined with 'amend'")]);
    }

    #[test]
    fn exclusivity_ignores_a_field_left_at_its_default() {
        let specs = [
            ParamSpec::new("jobs", "int").exclusive_with("mode"),
            ParamSpec::new("mode", "choice")
                .with_choices(vec![json!("fast"), json!("safe")])
                .with_default(json!("fast")),
        ];
        let mut form = Form::assemble("x".into(), specs.iter().map(adapt_param).collect());
        form.edit("jobs", ControlInput::Text("2".into())).unwrap();
        assert!(marshal(form.values(), form.descriptors()).is_ok());

        form.edit("mode", ControlInput::Select(1)).unwrap();
        assert!(marshal(form.values(), form.descriptors()).is_err());
    }

    #[test]
    fn cleared_path_gets_its_default_as_a_path() {
        let specs = [ParamSpec::new("path", "path").with_default(json!("."))];
        let mut form = Form::assemble("x".into(), specs.iter().map(adapt_param).collect());
        form.edit("path", ControlInput::Clear).unwrap();
        let args = marshal(form.values(), form.descriptors()).unwrap();
        assert_eq!(args.get("path"), Some(&ArgValue::Path(".".into())));
    }

    #[test]
    fn omitted_optionals_take_declared_defaults_or_stay_out() {
        let specs = [
            ParamSpec::new("jobs", "int").with_default(json!(4)),
            ParamSpec::new("label", "str"),
            ParamSpec::new("to", "str").nullable().with_default(json!(null)),
        ];
        let mut form = Form::assemble("x".into(), specs.iter().map(adapt_param).collect());
        form.edit("jobs", ControlInput::Clear).unwrap();
        let args = marshal(form.values(), form.descriptors()).unwrap();
        assert_eq!(args.get("jobs"), Some(&ArgValue::Int(4)));
        assert_eq!(args.get("label"), None);
        assert_eq!(args.get("to"), Some(&ArgValue::Null));
    }

    #[test]
    fn positional_and_list_arguments() {
        let mut files = ParamSpec::new("files", "path").with_nargs(Nargs::Symbol(NargsSymbol::AtLeastOne));
        files.positional = true;
        let specs = [ParamSpec::new("opt", "str"), files];
        let mut form = Form::assemble("x".into(), specs.iter().map(adapt_param).collect());

        form.edit("files", ControlInput::AddRow).unwrap();
        form.edit("files", ControlInput::AddRow).unwrap();
        form.edit(
            "files",
            ControlInput::Row {
                index: 0,
                input: Box::new(ControlInput::Text("a".into())),
            },
        )
        .unwrap();
        form.edit(
            "files",
            ControlInput::Row {
                index: 1,
                input: Box::new(ControlInput::Text("b".into())),
            },
        )
        .unwrap();

        let args = marshal(form.values(), form.descriptors()).unwrap();
        assert_eq!(
            args.positional,
            vec![(
                "files".to_string(),
                ArgValue::List(vec![ArgValue::Path("a".into()), ArgValue::Path("b".into())])
            )]
        );
        assert_eq!(args.to_json_object(), json!({ "files": ["a", "b"] }));
    }
}
