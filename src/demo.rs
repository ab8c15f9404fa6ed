//! A small catalog of filesystem commands used by the CLI and in tests.
//! Parameters are declared as typed structs; the registry derives their
//! forms from the generated JSON Schema.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::exec::cancel::{check_cancelled, CancelToken, Cancelled};
use crate::exec::invoker::{FnInvoker, InvokeError, ResultStream, RunContext, StreamItem};
use crate::form::marshal::ArgumentSet;
use crate::progress::Progress;
use crate::registry::catalog::{de, entry, existing_dir_schema, StaticRegistry};

// ── Parameter structs ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Name,
    Size,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LsParams {
    /// Directory to list.
    #[schemars(schema_with = "existing_dir_schema")]
    pub path: PathBuf,
    /// Descend into subdirectories.
    #[serde(default)]
    pub recursive: bool,
    /// Deepest level to descend to when recursive.
    pub max_depth: Option<u32>,
    #[serde(default)]
    pub sort: SortOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CountParams {
    /// Directory to scan recursively.
    #[schemars(schema_with = "existing_dir_schema")]
    pub path: PathBuf,
    /// Only count files with these extensions (without the dot).
    #[serde(default)]
    pub extensions: Vec<String>,
}

fn default_seconds() -> f64 {
    2.0
}

fn default_steps() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WaitParams {
    /// Total time to wait.
    #[serde(default = "default_seconds")]
    #[schemars(range(min = 0, max = 600))]
    pub seconds: f64,
    #[serde(default = "default_steps")]
    #[schemars(range(min = 1, max = 1000))]
    pub steps: u32,
    /// Sleep through cancellation requests (exercises forced teardown).
    #[serde(default)]
    pub ignore_cancel: bool,
}

fn default_partials() -> u32 {
    3
}

fn default_failure_message() -> String {
    "simulated failure".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FailParams {
    /// Results to emit before failing.
    #[serde(default = "default_partials")]
    #[schemars(range(max = 1000))]
    pub partials: u32,
    #[serde(default = "default_failure_message")]
    #[schemars(length(min = 1))]
    pub message: String,
    /// Fail at invocation instead of through the result stream.
    #[serde(default)]
    pub fault: bool,
}

// ── Registry and invoker ────────────────────────────────────────

pub fn demo_registry() -> StaticRegistry {
    StaticRegistry::new(vec![
        entry::<LsParams>("ls", "List the entries of a directory", "filesystem"),
        entry::<CountParams>("count", "Count files and bytes below a directory", "filesystem"),
        entry::<WaitParams>("wait", "Wait, reporting progress", "diagnostics"),
        entry::<FailParams>("fail", "Emit some results, then fail", "diagnostics"),
    ])
}

fn params<T: serde::de::DeserializeOwned>(args: &ArgumentSet) -> Result<T, InvokeError> {
    de(&args.to_json_object()).map_err(InvokeError::InvalidArguments)
}

pub fn demo_invoker() -> FnInvoker {
    FnInvoker::new()
        .register("ls", |args, _| Ok(Box::new(Listing::new(params(args)?)) as ResultStream))
        .register("count", |args, ctx| {
            Ok(Box::new(Counter::new(params(args)?, ctx.cancel.clone())) as ResultStream)
        })
        .register("wait", |args, ctx| Ok(wait(params(args)?, ctx)))
        .register("fail", |args, _| fail(params(args)?))
}

// ── ls ──────────────────────────────────────────────────────────

fn entry_error(path: &Path, e: &std::io::Error) -> StreamItem {
    StreamItem::Error {
        detail: json!({ "path": path.display().to_string(), "message": e.to_string() }),
        recoverable: true,
    }
}

/// Lazy directory walk: one directory is read per refill.
struct Listing {
    params: LsParams,
    queue: VecDeque<StreamItem>,
    dirs: Vec<(PathBuf, u32)>,
}

impl Listing {
    fn new(params: LsParams) -> Self {
        let root = params.path.clone();
        Self {
            params,
            queue: VecDeque::new(),
            dirs: vec![(root, 1)],
        }
    }

    fn descend(&self, depth: u32) -> bool {
        self.params.recursive && self.params.max_depth.map_or(true, |max| depth < max)
    }

    fn read(&mut self, dir: &Path, depth: u32) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                self.queue.push_back(entry_error(dir, &e));
                return;
            }
        };
        let mut rows = Vec::new();
        for entry in entries {
            match entry.and_then(|e| e.metadata().map(|m| (e.path(), m))) {
                Ok(row) => rows.push(row),
                Err(e) => self.queue.push_back(entry_error(dir, &e)),
            }
        }
        match self.params.sort {
            SortOrder::Name => rows.sort_by(|a, b| a.0.cmp(&b.0)),
            SortOrder::Size => rows.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0))),
        }

        let mut subdirs = Vec::new();
        for (path, meta) in rows {
            self.queue.push_back(StreamItem::Record(json!({
                "path": path.display().to_string(),
                "is_dir": meta.is_dir(),
                "size": meta.len(),
                "depth": depth,
            })));
            if meta.is_dir() && self.descend(depth) {
                subdirs.push((path, depth + 1));
            }
        }
        // stack: reverse so subdirectories are visited in listing order
        self.dirs.extend(subdirs.into_iter().rev());
    }
}

impl Iterator for Listing {
    type Item = StreamItem;

    fn next(&mut self) -> Option<StreamItem> {
        loop {
            if let Some(item) = self.queue.pop_front() {
                return Some(item);
            }
            let (dir, depth) = self.dirs.pop()?;
            self.read(&dir, depth);
        }
    }
}

// ── count ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Tally {
    files: u64,
    bytes: u64,
    errors: Vec<StreamItem>,
}

/// Walks one top-level entry per step and reports progress in between.
struct Counter {
    params: CountParams,
    cancel: CancelToken,
    top: Option<Vec<PathBuf>>,
    index: usize,
    tally: Tally,
    done: bool,
}

impl Counter {
    fn new(params: CountParams, cancel: CancelToken) -> Self {
        Self {
            params,
            cancel,
            top: None,
            index: 0,
            tally: Tally::default(),
            done: false,
        }
    }

    fn matches(&self, path: &Path) -> bool {
        if self.params.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.params.extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
    }

    fn visit(&mut self, path: &Path) -> Result<(), Cancelled> {
        check_cancelled(&self.cancel, "count")?;
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                self.tally.errors.push(entry_error(path, &e));
                return Ok(());
            }
        };
        if meta.is_dir() {
            let entries = match fs::read_dir(path) {
                Ok(entries) => entries,
                Err(e) => {
                    self.tally.errors.push(entry_error(path, &e));
                    return Ok(());
                }
            };
            for entry in entries.flatten() {
                self.visit(&entry.path())?;
            }
        } else if meta.is_file() && self.matches(path) {
            self.tally.files += 1;
            self.tally.bytes += meta.len();
        }
        Ok(())
    }
}

impl Iterator for Counter {
    type Item = StreamItem;

    fn next(&mut self) -> Option<StreamItem> {
        if let Some(error) = self.tally.errors.pop() {
            return Some(error);
        }
        if self.done {
            return None;
        }
        if self.top.is_none() {
            match fs::read_dir(&self.params.path) {
                Ok(entries) => self.top = Some(entries.flatten().map(|e| e.path()).collect()),
                Err(e) => {
                    self.done = true;
                    return Some(StreamItem::Error {
                        detail: json!(e.to_string()),
                        recoverable: false,
                    });
                }
            }
        }
        let total = self.top.as_ref().map_or(0, Vec::len);
        let Some(path) = self.top.as_ref().and_then(|top| top.get(self.index)).cloned() else {
            self.done = true;
            return Some(StreamItem::Record(json!({
                "path": self.params.path.display().to_string(),
                "files": self.tally.files,
                "bytes": self.tally.bytes,
            })));
        };
        self.index += 1;
        if self.visit(&path).is_err() {
            tracing::debug!("count interrupted by cancellation");
            self.done = true;
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.index as f64 / total as f64;
        Some(StreamItem::Progress {
            message: format!("scanned {}", path.display()),
            progress: Progress::ratio(ratio),
        })
    }
}

// ── wait ────────────────────────────────────────────────────────

fn wait(params: WaitParams, ctx: &RunContext) -> ResultStream {
    let steps = params.steps.max(1);
    let step = Duration::from_secs_f64(params.seconds.max(0.0) / f64::from(steps));
    if params.ignore_cancel {
        // one long blocking step the worker cannot interrupt
        let total = step * steps;
        return Box::new(std::iter::once_with(move || {
            std::thread::sleep(total);
            StreamItem::Progress {
                message: "waited".to_string(),
                progress: Progress::ratio(1.0),
            }
        }));
    }
    tracing::debug!(run = %ctx.run, steps, "waiting");
    Box::new((1..=steps).map(move |i| {
        std::thread::sleep(step);
        StreamItem::Progress {
            message: format!("step {i}/{steps}"),
            progress: Progress::ratio(f64::from(i) / f64::from(steps)),
        }
    }))
}

// ── fail ────────────────────────────────────────────────────────

fn fail(params: FailParams) -> Result<ResultStream, InvokeError> {
    if params.fault {
        return Err(InvokeError::Failed(params.message));
    }
    let error = StreamItem::Error {
        detail: json!(params.message),
        recoverable: false,
    };
    Ok(Box::new(
        (0..params.partials)
            .map(|i| StreamItem::Record(json!({ "item": i })))
            .chain(std::iter::once(error)),
    ))
}
