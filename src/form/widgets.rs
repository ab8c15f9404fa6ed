//! Widget factory: one control archetype per parameter kind.
//!
//! Controls are toolkit-agnostic state machines. A visual shell renders the
//! [`Widget`] state and forwards user edits as [`ControlInput`]s; the control
//! updates itself and emits a [`FieldChange`] for every edit.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;
use crate::form::descriptor::{accepts, ParamKind, ParameterDescriptor};
use crate::form::value::FieldValue;
use crate::registry::validation::{choice_label, PathRequirement};
use crate::settings::AppSettings;

/// Identifies a control within its form (the parameter name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ControlHandle(String);

impl ControlHandle {
    pub fn field(&self) -> &str {
        &self.0
    }
}

/// Renderable control state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "archetype", rename_all = "snake_case")]
pub enum Widget {
    LineEdit {
        text: String,
    },
    TextArea {
        text: String,
    },
    /// Text entry plus a file/directory picker. With `manual_edit` off only
    /// picker selections are accepted.
    PathPicker {
        mode: PathRequirement,
        text: String,
        manual_edit: bool,
        basedir: Option<PathBuf>,
    },
    ComboBox {
        choices: Vec<Value>,
        selected: Option<usize>,
    },
    CheckBox {
        tristate: bool,
        state: Option<bool>,
    },
    /// Integer entry. Raw text is kept so unparseable input stays visible
    /// (and invalid) instead of being silently dropped.
    SpinBox {
        text: String,
        allow_none: bool,
    },
    NumberEdit {
        text: String,
        allow_none: bool,
    },
    /// Editable rows of one item archetype.
    RowEditor {
        template: Box<Widget>,
        rows: Vec<Widget>,
    },
    KeyValueEditor {
        delimiter: String,
        rows: Vec<(String, String)>,
    },
    /// A radio button per option, each next to its own input. Only the
    /// input of the active option provides the value.
    Alternatives {
        options: Vec<ParamKind>,
        inputs: Vec<Widget>,
        active: Option<usize>,
    },
}

/// A user edit, as forwarded by the visual shell.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlInput {
    Text(String),
    /// `None` is the indeterminate state of a tri-state box.
    Check(Option<bool>),
    Select(usize),
    Pick(PathBuf),
    Clear,
    AddRow,
    RemoveRow(usize),
    Row { index: usize, input: Box<ControlInput> },
    Pair { index: usize, key: String, value: String },
}

impl ControlInput {
    fn kind(&self) -> &'static str {
        match self {
            ControlInput::Text(_) => "text",
            ControlInput::Check(_) => "check",
            ControlInput::Select(_) => "select",
            ControlInput::Pick(_) => "pick",
            ControlInput::Clear => "clear",
            ControlInput::AddRow => "add-row",
            ControlInput::RemoveRow(_) => "remove-row",
            ControlInput::Row { .. } => "row",
            ControlInput::Pair { .. } => "pair",
        }
    }
}

impl Widget {
    pub fn archetype(&self) -> &'static str {
        match self {
            Widget::LineEdit { .. } => "line-edit",
            Widget::TextArea { .. } => "text-area",
            Widget::PathPicker { .. } => "path-picker",
            Widget::ComboBox { .. } => "combo-box",
            Widget::CheckBox { .. } => "check-box",
            Widget::SpinBox { .. } => "spin-box",
            Widget::NumberEdit { .. } => "number-edit",
            Widget::RowEditor { .. } => "row-editor",
            Widget::KeyValueEditor { .. } => "key-value-editor",
            Widget::Alternatives { .. } => "alternatives",
        }
    }

    fn read(&self) -> FieldValue {
        match self {
            Widget::LineEdit { text } | Widget::TextArea { text } | Widget::PathPicker { text, .. } => {
                if text.is_empty() {
                    FieldValue::Unset
                } else {
                    FieldValue::Text(text.clone())
                }
            }
            Widget::ComboBox { choices, selected } => match selected.and_then(|i| choices.get(i)) {
                None => FieldValue::Unset,
                Some(Value::Null) => FieldValue::Null,
                Some(v) => FieldValue::Choice(v.clone()),
            },
            Widget::CheckBox { tristate, state } => match state {
                Some(b) => FieldValue::Bool(*b),
                None if *tristate => FieldValue::Null,
                None => FieldValue::Unset,
            },
            Widget::SpinBox { text, allow_none } => {
                read_number(text, *allow_none, |s| s.parse::<i64>().ok().map(FieldValue::Int))
            }
            Widget::NumberEdit { text, allow_none } => read_number(text, *allow_none, |s| {
                s.parse::<f64>().ok().filter(|f| f.is_finite()).map(FieldValue::Float)
            }),
            Widget::RowEditor { rows, .. } => FieldValue::List(rows.iter().map(Widget::read).collect()),
            Widget::KeyValueEditor { rows, .. } => FieldValue::Pairs(rows.clone()),
            Widget::Alternatives { inputs, active, .. } => {
                let Some((option, input)) = active.and_then(|i| inputs.get(i).map(|w| (i, w))) else {
                    return FieldValue::Unset;
                };
                match input.read() {
                    value @ (FieldValue::Unset | FieldValue::Null) => value,
                    value => FieldValue::Alternative {
                        option,
                        value: Box::new(value),
                    },
                }
            }
        }
    }

    fn write(&mut self, value: &FieldValue) -> Result<(), AppError> {
        let archetype = self.archetype();
        let unrepresentable = || AppError::Unrepresentable {
            control: archetype.to_string(),
            value: format!("{value:?}"),
        };
        match (self, value) {
            (widget, FieldValue::Unset) => widget.clear(),
            (
                Widget::LineEdit { text } | Widget::TextArea { text } | Widget::PathPicker { text, .. },
                FieldValue::Text(s),
            ) => *text = s.clone(),
            (Widget::LineEdit { text } | Widget::TextArea { text }, FieldValue::Int(i)) => *text = i.to_string(),
            (Widget::LineEdit { text } | Widget::TextArea { text }, FieldValue::Float(f)) => *text = f.to_string(),
            (Widget::LineEdit { text } | Widget::TextArea { text }, FieldValue::Bool(b)) => *text = b.to_string(),

            (Widget::ComboBox { choices, selected }, v) => {
                let found = choices.iter().position(|c| match v {
                    FieldValue::Choice(want) => c == want,
                    FieldValue::Null => c.is_null(),
                    FieldValue::Text(s) => choice_label(c) == *s,
                    FieldValue::Bool(b) => c == &Value::Bool(*b),
                    FieldValue::Int(i) => c == &Value::from(*i),
                    _ => false,
                });
                *selected = Some(found.ok_or_else(unrepresentable)?);
            }

            (Widget::CheckBox { state, .. }, FieldValue::Bool(b)) => *state = Some(*b),
            (Widget::CheckBox { tristate: true, state }, FieldValue::Null) => *state = None,

            (Widget::SpinBox { text, .. }, FieldValue::Int(i)) => *text = i.to_string(),
            (Widget::NumberEdit { text, .. }, FieldValue::Float(f)) => *text = f.to_string(),
            (Widget::NumberEdit { text, .. }, FieldValue::Int(i)) => *text = i.to_string(),
            (
                Widget::SpinBox { text, allow_none: true } | Widget::NumberEdit { text, allow_none: true },
                FieldValue::Null,
            ) => *text = "none".to_string(),
            (Widget::SpinBox { text, .. } | Widget::NumberEdit { text, .. }, FieldValue::Text(s)) => *text = s.clone(),

            (Widget::RowEditor { template, rows }, FieldValue::List(items)) => {
                *rows = items
                    .iter()
                    .map(|item| {
                        let mut row = (**template).clone();
                        row.write(item).map(|()| row)
                    })
                    .collect::<Result<_, _>>()?;
            }
            (Widget::RowEditor { template, rows }, single) if *single != FieldValue::Null => {
                let mut row = (**template).clone();
                row.write(single)?;
                *rows = vec![row];
            }

            (Widget::KeyValueEditor { rows, .. }, FieldValue::Pairs(pairs)) => *rows = pairs.clone(),
            (Widget::KeyValueEditor { delimiter, rows }, FieldValue::Text(s)) => {
                *rows = s
                    .split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(|entry| {
                        entry
                            .split_once(delimiter.as_str())
                            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                    })
                    .collect::<Option<_>>()
                    .ok_or_else(unrepresentable)?;
            }

            (Widget::Alternatives { inputs, active, .. }, FieldValue::Alternative { option, value }) => {
                inputs
                    .get_mut(*option)
                    .ok_or(AppError::NoSuchEntry { index: *option })?
                    .write(value)?;
                *active = Some(*option);
            }
            // every input shows what it can of the value; the first option
            // that accepts it becomes active
            (Widget::Alternatives { options, inputs, active }, v) => {
                let mut next = inputs.clone();
                let mut first = None;
                for (index, (kind, input)) in options.iter().zip(next.iter_mut()).enumerate() {
                    if input.write(v).is_err() {
                        input.clear();
                    } else if first.is_none() && accepts(kind, v) {
                        first = Some(index);
                    }
                }
                *active = Some(first.ok_or_else(unrepresentable)?);
                *inputs = next;
            }

            _ => return Err(unrepresentable()),
        }
        Ok(())
    }

    fn apply(&mut self, input: ControlInput) -> Result<(), AppError> {
        let archetype = self.archetype();
        match (self, input) {
            (widget, ControlInput::Clear) => widget.clear(),
            (
                Widget::LineEdit { text }
                | Widget::TextArea { text }
                | Widget::SpinBox { text, .. }
                | Widget::NumberEdit { text, .. }
                | Widget::PathPicker {
                    text, manual_edit: true, ..
                },
                ControlInput::Text(s),
            ) => *text = s,
            (Widget::PathPicker { text, basedir, .. }, ControlInput::Pick(path)) => {
                let path = match basedir {
                    Some(base) if path.is_relative() => base.join(path),
                    _ => path,
                };
                *text = path.to_string_lossy().into_owned();
            }
            (Widget::ComboBox { choices, selected }, ControlInput::Select(index)) => {
                if index >= choices.len() {
                    return Err(AppError::NoSuchEntry { index });
                }
                *selected = Some(index);
            }
            (Widget::CheckBox { tristate, state }, ControlInput::Check(value)) if value.is_some() || *tristate => {
                *state = value;
            }
            (Widget::RowEditor { template, rows }, ControlInput::AddRow) => rows.push((**template).clone()),
            (Widget::RowEditor { rows, .. }, ControlInput::RemoveRow(index)) => remove_row(rows, index)?,
            (Widget::RowEditor { rows, .. }, ControlInput::Row { index, input }) => {
                rows.get_mut(index)
                    .ok_or(AppError::NoSuchEntry { index })?
                    .apply(*input)?;
            }
            (Widget::KeyValueEditor { rows, .. }, ControlInput::AddRow) => rows.push((String::new(), String::new())),
            (Widget::KeyValueEditor { rows, .. }, ControlInput::RemoveRow(index)) => remove_row(rows, index)?,
            (Widget::KeyValueEditor { rows, .. }, ControlInput::Pair { index, key, value }) => {
                *rows.get_mut(index).ok_or(AppError::NoSuchEntry { index })? = (key, value);
            }
            (Widget::Alternatives { inputs, active, .. }, ControlInput::Select(index)) => {
                if index >= inputs.len() {
                    return Err(AppError::NoSuchEntry { index });
                }
                *active = Some(index);
            }
            // editing an option's input selects that option
            (Widget::Alternatives { inputs, active, .. }, ControlInput::Row { index, input }) => {
                inputs
                    .get_mut(index)
                    .ok_or(AppError::NoSuchEntry { index })?
                    .apply(*input)?;
                *active = Some(index);
            }
            (Widget::Alternatives { inputs, active: Some(index), .. }, input) => {
                let index = *index;
                inputs
                    .get_mut(index)
                    .ok_or(AppError::NoSuchEntry { index })?
                    .apply(input)?;
            }
            (_, input) => {
                return Err(AppError::UnsupportedInput {
                    control: archetype.to_string(),
                    input: input.kind().to_string(),
                })
            }
        }
        Ok(())
    }

    fn clear(&mut self) {
        match self {
            Widget::LineEdit { text }
            | Widget::TextArea { text }
            | Widget::PathPicker { text, .. }
            | Widget::SpinBox { text, .. }
            | Widget::NumberEdit { text, .. } => text.clear(),
            Widget::ComboBox { selected, .. } => *selected = None,
            Widget::CheckBox { tristate, state } => *state = if *tristate { None } else { Some(false) },
            Widget::RowEditor { rows, .. } => rows.clear(),
            Widget::KeyValueEditor { rows, .. } => rows.clear(),
            Widget::Alternatives { inputs, .. } => inputs.iter_mut().for_each(Widget::clear),
        }
    }

    fn set_basedir(&mut self, dir: Option<&Path>) -> bool {
        match self {
            Widget::PathPicker { basedir, .. } => {
                if basedir.as_deref() == dir {
                    return false;
                }
                *basedir = dir.map(Path::to_path_buf);
                true
            }
            Widget::RowEditor { template, rows } => {
                let mut changed = template.set_basedir(dir);
                for row in rows {
                    changed |= row.set_basedir(dir);
                }
                changed
            }
            Widget::Alternatives { inputs, .. } => inputs
                .iter_mut()
                .fold(false, |changed, input| input.set_basedir(dir) | changed),
            _ => false,
        }
    }
}

fn read_number(text: &str, allow_none: bool, parse: impl Fn(&str) -> Option<FieldValue>) -> FieldValue {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return FieldValue::Unset;
    }
    if allow_none && trimmed == "none" {
        return FieldValue::Null;
    }
    parse(trimmed).unwrap_or_else(|| FieldValue::Text(text.to_string()))
}

fn remove_row<T>(rows: &mut Vec<T>, index: usize) -> Result<(), AppError> {
    if index >= rows.len() {
        return Err(AppError::NoSuchEntry { index });
    }
    rows.remove(index);
    Ok(())
}

// ── Change notification ─────────────────────────────────────────

/// Emitted after every edit, whether or not the value changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub value: FieldValue,
}

type Listener = Box<dyn FnMut(&FieldChange)>;

/// Listeners registered by the shell. Runs on the interactive context only.
#[derive(Default)]
pub struct ChangeNotifier {
    listeners: Vec<Listener>,
}

impl ChangeNotifier {
    pub fn subscribe(&mut self, listener: impl FnMut(&FieldChange) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn notify(&mut self, change: &FieldChange) {
        for listener in &mut self.listeners {
            listener(change);
        }
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

// ── Controls ────────────────────────────────────────────────────

/// A control bound to one parameter: handle, value accessor and notifier.
#[derive(Debug)]
pub struct Control {
    handle: ControlHandle,
    widget: Widget,
    notifier: ChangeNotifier,
}

impl Control {
    pub fn handle(&self) -> &ControlHandle {
        &self.handle
    }

    pub fn widget(&self) -> &Widget {
        &self.widget
    }

    /// Current value as the control shows it.
    pub fn value(&self) -> FieldValue {
        self.widget.read()
    }

    /// Programmatic write. Reading back returns the written value for
    /// every value the archetype can represent.
    pub fn set_value(&mut self, value: &FieldValue) -> Result<FieldChange, AppError> {
        self.widget.write(value)?;
        Ok(self.emit())
    }

    /// Apply a user edit.
    pub fn apply(&mut self, input: ControlInput) -> Result<FieldChange, AppError> {
        self.widget.apply(input)?;
        Ok(self.emit())
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&FieldChange) + 'static) {
        self.notifier.subscribe(listener);
    }

    /// Set the picker base directory of path controls. Returns whether anything changed.
    pub fn set_basedir(&mut self, dir: Option<&Path>) -> bool {
        self.widget.set_basedir(dir)
    }

    fn emit(&mut self) -> FieldChange {
        let change = FieldChange {
            field: self.handle.0.clone(),
            value: self.widget.read(),
        };
        self.notifier.notify(&change);
        change
    }
}

/// Builds controls for descriptors.
#[derive(Debug, Clone)]
pub struct WidgetFactory {
    pub manual_path_input: bool,
}

impl Default for WidgetFactory {
    fn default() -> Self {
        Self {
            manual_path_input: true,
        }
    }
}

impl WidgetFactory {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            manual_path_input: !settings.disable_manual_path_input,
        }
    }

    /// Create the control for a descriptor, initialised with its default.
    pub fn create_control(&self, descriptor: &ParameterDescriptor) -> Control {
        let mut widget = self.widget_for(&descriptor.kind, descriptor.allow_none);
        if let Some(default) = &descriptor.default {
            if let Err(e) = widget.write(&FieldValue::from_default(default)) {
                tracing::debug!(parameter = %descriptor.name, error = %e, "default not shown in control");
                widget.clear();
            }
        }
        Control {
            handle: ControlHandle(descriptor.name.clone()),
            widget,
            notifier: ChangeNotifier::default(),
        }
    }

    fn widget_for(&self, kind: &ParamKind, allow_none: bool) -> Widget {
        match kind {
            ParamKind::Text { multiline: false } => Widget::LineEdit { text: String::new() },
            ParamKind::Text { multiline: true } => Widget::TextArea { text: String::new() },
            ParamKind::Path { mode } | ParamKind::ExistingPath { mode } => Widget::PathPicker {
                mode: *mode,
                text: String::new(),
                manual_edit: self.manual_path_input,
                basedir: None,
            },
            ParamKind::Choice { choices } => Widget::ComboBox {
                choices: choices.clone(),
                selected: None,
            },
            ParamKind::Bool => Widget::CheckBox {
                tristate: allow_none,
                state: if allow_none { None } else { Some(false) },
            },
            ParamKind::Integer => Widget::SpinBox {
                text: String::new(),
                allow_none,
            },
            ParamKind::Float => Widget::NumberEdit {
                text: String::new(),
                allow_none,
            },
            ParamKind::List { item } => Widget::RowEditor {
                template: Box::new(self.widget_for(item, false)),
                rows: Vec::new(),
            },
            ParamKind::KeyValue { delimiter } => Widget::KeyValueEditor {
                delimiter: delimiter.clone(),
                rows: Vec::new(),
            },
            ParamKind::Alternatives { options } => Widget::Alternatives {
                options: options.clone(),
                inputs: options.iter().map(|kind| self.widget_for(kind, allow_none)).collect(),
                active: None,
            },
        }
    }
}

/// Create a control with default factory options.
pub fn create_control(descriptor: &ParameterDescriptor) -> Control {
    WidgetFactory::default().create_control(descriptor)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::form::descriptor::adapt_param;
    use crate::registry::params::{Nargs, NargsSymbol, ParamSpec};
    use serde_json::json;

    fn control(spec: ParamSpec) -> Control {
        create_control(&adapt_param(&spec))
    }

    #[test]
    fn every_kind_round_trips_through_the_accessor() {
        let cases: Vec<(ParamSpec, FieldValue)> = vec![
            (ParamSpec::new("s", "str"), FieldValue::Text("hello".into())),
            (ParamSpec::new("t", "text"), FieldValue::Text("line one\nline two".into())),
            (ParamSpec::new("p", "path"), FieldValue::Text("/tmp/out.txt".into())),
            (ParamSpec::new("d", "existing_dir"), FieldValue::Text("/tmp".into())),
            (
                ParamSpec::new("c", "choice").with_choices(vec![json!("a"), json!("b")]),
                FieldValue::Choice(json!("b")),
            ),
            (
                ParamSpec::new("cn", "choice").with_choices(vec![json!("a")]).nullable(),
                FieldValue::Null,
            ),
            (ParamSpec::new("b", "bool"), FieldValue::Bool(true)),
            (ParamSpec::new("bn", "bool").nullable(), FieldValue::Null),
            (ParamSpec::new("i", "int"), FieldValue::Int(-4)),
            (ParamSpec::new("in", "int").nullable(), FieldValue::Null),
            (ParamSpec::new("f", "float"), FieldValue::Float(2.5)),
            (
                ParamSpec::new("l", "list"),
                FieldValue::List(vec![FieldValue::Text("x".into()), FieldValue::Text("y".into())]),
            ),
            (
                ParamSpec::new("m", "mapping"),
                FieldValue::Pairs(vec![("k".into(), "v".into()), ("k2".into(), "v2".into())]),
            ),
        ];
        for (spec, value) in cases {
            let name = spec.name.clone();
            let mut c = control(spec);
            c.set_value(&value).unwrap();
            assert_eq!(c.value(), value, "round trip of {name}");
        }
    }

    #[test]
    fn unrepresentable_values_are_rejected() {
        let mut combo = control(ParamSpec::new("c", "choice").with_choices(vec![json!("a")]));
        assert!(matches!(
            combo.set_value(&FieldValue::Choice(json!("z"))),
            Err(AppError::Unrepresentable { .. })
        ));
        let mut check = control(ParamSpec::new("b", "bool"));
        assert!(check.set_value(&FieldValue::Null).is_err());
    }

    #[test]
    fn controls_start_from_defaults() {
        let c = control(ParamSpec::new("recursive", "bool").with_default(json!(false)));
        assert_eq!(c.value(), FieldValue::Bool(false));
        let c = control(ParamSpec::new("to", "choice").with_choices(vec![json!("x"), json!("y")]).with_default(json!("y")));
        assert_eq!(c.value(), FieldValue::Choice(json!("y")));
        let c = control(ParamSpec::new("n", "int"));
        assert_eq!(c.value(), FieldValue::Unset);
    }

    #[test]
    fn unparseable_number_text_is_kept() {
        let mut c = control(ParamSpec::new("n", "int"));
        c.apply(ControlInput::Text("12a".into())).unwrap();
        assert_eq!(c.value(), FieldValue::Text("12a".into()));
        c.apply(ControlInput::Text("12".into())).unwrap();
        assert_eq!(c.value(), FieldValue::Int(12));
    }

    #[test]
    fn every_edit_notifies_listeners() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut c = control(ParamSpec::new("s", "str"));
        let sink = Rc::clone(&seen);
        c.subscribe(move |change| sink.borrow_mut().push(change.clone()));

        c.apply(ControlInput::Text("a".into())).unwrap();
        c.apply(ControlInput::Text("a".into())).unwrap();
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(seen.borrow()[0].field, "s");
        assert_eq!(seen.borrow()[0].value, FieldValue::Text("a".into()));
    }

    #[test]
    fn row_editor_adds_removes_and_keeps_order() {
        let mut c = control(ParamSpec::new("files", "path").with_nargs(Nargs::Symbol(NargsSymbol::Any)));
        c.apply(ControlInput::AddRow).unwrap();
        c.apply(ControlInput::AddRow).unwrap();
        c.apply(ControlInput::AddRow).unwrap();
        for (i, name) in ["a", "b", "c"].into_iter().enumerate() {
            c.apply(ControlInput::Row {
                index: i,
                input: Box::new(ControlInput::Text(name.into())),
            })
            .unwrap();
        }
        c.apply(ControlInput::RemoveRow(1)).unwrap();
        assert_eq!(
            c.value(),
            FieldValue::List(vec![FieldValue::Text("a".into()), FieldValue::Text("c".into())])
        );
        assert_eq!(c.apply(ControlInput::RemoveRow(5)).unwrap_err(), AppError::NoSuchEntry { index: 5 });
    }

    #[test]
    fn key_value_editor_rows() {
        let mut c = control(ParamSpec::new("m", "key_value"));
        c.apply(ControlInput::AddRow).unwrap();
        c.apply(ControlInput::Pair {
            index: 0,
            key: "k".into(),
            value: "v".into(),
        })
        .unwrap();
        assert_eq!(c.value(), FieldValue::Pairs(vec![("k".into(), "v".into())]));
    }

    #[test]
    fn mismatched_input_is_rejected() {
        let mut c = control(ParamSpec::new("b", "bool"));
        assert!(matches!(
            c.apply(ControlInput::Text("x".into())),
            Err(AppError::UnsupportedInput { .. })
        ));
        // indeterminate only on tri-state boxes
        assert!(c.apply(ControlInput::Check(None)).is_err());
        let mut tri = control(ParamSpec::new("b", "bool").nullable());
        tri.apply(ControlInput::Check(None)).unwrap();
        assert_eq!(tri.value(), FieldValue::Null);
    }

    fn since() -> Control {
        control(ParamSpec::new("since", "alternatives").with_alternatives(vec![
            ParamSpec::new("since", "int"),
            ParamSpec::new("since", "choice").with_choices(vec![json!("HEAD"), json!("origin")]),
        ]))
    }

    #[test]
    fn alternatives_activate_the_first_option_that_accepts_a_value() {
        let mut c = since();
        assert_eq!(c.widget().archetype(), "alternatives");
        assert_eq!(c.value(), FieldValue::Unset);

        c.set_value(&FieldValue::Text("HEAD".into())).unwrap();
        assert_eq!(
            c.value(),
            FieldValue::Alternative {
                option: 1,
                value: Box::new(FieldValue::Choice(json!("HEAD")))
            }
        );

        c.set_value(&FieldValue::Int(3)).unwrap();
        assert_eq!(
            c.value(),
            FieldValue::Alternative {
                option: 0,
                value: Box::new(FieldValue::Int(3))
            }
        );

        assert!(matches!(
            c.set_value(&FieldValue::Bool(true)),
            Err(AppError::Unrepresentable { .. })
        ));
        // a rejected write leaves the control as it was
        assert_eq!(
            c.value(),
            FieldValue::Alternative {
                option: 0,
                value: Box::new(FieldValue::Int(3))
            }
        );
    }

    #[test]
    fn alternatives_round_trip_and_follow_the_radio_buttons() {
        let mut c = since();
        let origin = FieldValue::Alternative {
            option: 1,
            value: Box::new(FieldValue::Choice(json!("origin"))),
        };
        c.set_value(&origin).unwrap();
        assert_eq!(c.value(), origin);

        // typing goes to the active input
        c.apply(ControlInput::Select(0)).unwrap();
        c.apply(ControlInput::Text("7".into())).unwrap();
        assert_eq!(
            c.value(),
            FieldValue::Alternative {
                option: 0,
                value: Box::new(FieldValue::Int(7))
            }
        );

        // editing another option's input selects it
        c.apply(ControlInput::Row {
            index: 1,
            input: Box::new(ControlInput::Select(0)),
        })
        .unwrap();
        assert_eq!(
            c.value(),
            FieldValue::Alternative {
                option: 1,
                value: Box::new(FieldValue::Choice(json!("HEAD")))
            }
        );
        assert_eq!(c.apply(ControlInput::Select(2)).unwrap_err(), AppError::NoSuchEntry { index: 2 });

        c.apply(ControlInput::Clear).unwrap();
        assert_eq!(c.value(), FieldValue::Unset);
    }

    #[test]
    fn picker_resolves_against_basedir_and_can_forbid_typing() {
        let factory = WidgetFactory {
            manual_path_input: false,
        };
        let mut c = factory.create_control(&adapt_param(&ParamSpec::new("path", "path")));
        assert!(c.apply(ControlInput::Text("typed".into())).is_err());

        assert!(c.set_basedir(Some(Path::new("/data"))));
        assert!(!c.set_basedir(Some(Path::new("/data"))));
        c.apply(ControlInput::Pick("sub/file".into())).unwrap();
        assert_eq!(
            c.value(),
            FieldValue::Text(PathBuf::from("/data").join("sub/file").to_string_lossy().into_owned())
        );
        c.apply(ControlInput::Pick("/abs".into())).unwrap();
        assert_eq!(c.value(), FieldValue::Text("/abs".into()));
    }
}
