//! Per-command presentation overrides ("command suite").
//!
//! A suite renames, reorders, hides or re-multiplies parameters without
//! touching the host's declared schemas. Loaded once from `suite.json`.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::params::{Nargs, ParamSpec};
use super::CommandIdentity;

/// Rank given to parameters a suite does not order explicitly.
pub const UNRANKED: i32 = 99;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandOverrides {
    #[serde(default)]
    pub exclude_parameters: Vec<String>,
    /// Lower ranks come first; ties keep the declared order.
    #[serde(default)]
    pub parameter_order: HashMap<String, i32>,
    #[serde(default)]
    pub parameter_display_names: HashMap<String, String>,
    #[serde(default)]
    pub parameter_nargs: HashMap<String, Nargs>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandSuite {
    /// Hidden from every command's form.
    #[serde(default)]
    pub exclude_parameters: Vec<String>,
    #[serde(default)]
    pub commands: HashMap<String, CommandOverrides>,
}

impl CommandSuite {
    pub fn overrides(&self, command: &CommandIdentity) -> Option<&CommandOverrides> {
        self.commands.get(command.as_str())
    }

    pub fn is_excluded(&self, command: &CommandIdentity, parameter: &str) -> bool {
        self.exclude_parameters.iter().any(|p| p == parameter)
            || self
                .overrides(command)
                .is_some_and(|o| o.exclude_parameters.iter().any(|p| p == parameter))
    }

    pub fn display_name(&self, command: &CommandIdentity, parameter: &str) -> Option<&str> {
        self.overrides(command)
            .and_then(|o| o.parameter_display_names.get(parameter))
            .map(String::as_str)
    }

    pub fn rank(&self, command: &CommandIdentity, parameter: &str) -> i32 {
        self.overrides(command)
            .and_then(|o| o.parameter_order.get(parameter).copied())
            .unwrap_or(UNRANKED)
    }

    /// Drop excluded parameters, apply nargs overrides and rank-sort what
    /// remains. The sort is stable, so unranked parameters keep their order.
    pub fn apply(&self, command: &CommandIdentity, params: &[ParamSpec]) -> Vec<ParamSpec> {
        let mut kept: Vec<ParamSpec> = params
            .iter()
            .filter(|p| !self.is_excluded(command, &p.name))
            .cloned()
            .map(|mut p| {
                if let Some(nargs) = self
                    .overrides(command)
                    .and_then(|o| o.parameter_nargs.get(&p.name))
                {
                    p.nargs = Some(*nargs);
                }
                p
            })
            .collect();
        kept.sort_by_key(|p| self.rank(command, &p.name));
        kept
    }
}

/// Load the suite from the config directory. A missing file is an empty
/// suite; an unreadable one is logged and ignored.
pub fn load_suite(app_config_dir: &Path) -> CommandSuite {
    let path = crate::paths::suite_path(app_config_dir);
    if !path.exists() {
        return CommandSuite::default();
    }
    match crate::settings::read_json::<CommandSuite>(&path) {
        Ok(suite) => suite,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable command suite");
            CommandSuite::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::registry::params::NargsSymbol;

    fn suite() -> CommandSuite {
        serde_json::from_value(serde_json::json!({
            "exclude_parameters": ["result_renderer"],
            "commands": {
                "save": {
                    "exclude_parameters": ["on_failure"],
                    "parameter_order": { "message": 0, "path": 1 },
                    "parameter_display_names": { "path": "Only save" },
                    "parameter_nargs": { "path": "*" }
                }
            }
        }))
        .unwrap()
    }

    fn params() -> Vec<ParamSpec> {
        ["dataset", "path", "result_renderer", "on_failure", "message", "recursive"]
            .into_iter()
            .map(|n| ParamSpec::new(n, "str"))
            .collect()
    }

    #[test]
    fn apply_excludes_sorts_and_overrides_nargs() {
        let cmd = CommandIdentity::new("save");
        let out = suite().apply(&cmd, &params());
        let names: Vec<_> = out.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["message", "path", "dataset", "recursive"]);
        assert_eq!(out[1].nargs, Some(Nargs::Symbol(NargsSymbol::Any)));
    }

    #[test]
    fn suite_wide_exclusion_applies_to_other_commands() {
        let cmd = CommandIdentity::new("status");
        let out = suite().apply(&cmd, &params());
        let names: Vec<_> = out.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["dataset", "path", "on_failure", "message", "recursive"]);
        assert_eq!(suite().display_name(&cmd, "path"), None);
        assert_eq!(suite().display_name(&"save".into(), "path"), Some("Only save"));
    }

    #[test]
    fn load_suite_tolerates_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_suite(dir.path()), CommandSuite::default());

        std::fs::write(crate::paths::suite_path(dir.path()), "[1,2").unwrap();
        assert_eq!(load_suite(dir.path()), CommandSuite::default());

        crate::settings::write_json(&crate::paths::suite_path(dir.path()), &suite()).unwrap();
        assert_eq!(load_suite(dir.path()), suite());
    }
}
