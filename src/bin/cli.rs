// CLI binary: exiting on unrecoverable errors is standard for CLI tools.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::unreachable, clippy::indexing_slicing)]

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use gooey_forms::demo::{demo_invoker, demo_registry};
use gooey_forms::exec::{ExecutionBridge, LoggedEvent, RunEvent, RunOutcome};
use gooey_forms::form::{adapt, run_probe, FieldValidity, FieldValue, Form, FormOptions, ParamKind};
use gooey_forms::progress::ProgressNotice;
use gooey_forms::registry::catalog::help_text;
use gooey_forms::registry::suite::load_suite;
use gooey_forms::registry::{CommandIdentity, RegistrySnapshot};
use gooey_forms::session::{FormSession, SubmitError};
use gooey_forms::settings::{self, AppSettings};
use gooey_forms::paths;

const EXIT_FAILED: i32 = 1;
const EXIT_INVALID: i32 = 2;
const EXIT_CANCELLED: i32 = 130;

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "gooey-cli", about = "Headless front end for generated command forms", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config directory override
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List available commands
    Commands,
    /// Show the form generated for a command
    Form { command: String },
    /// Fill a command's form and run it
    Run {
        command: String,
        /// Field edit, repeatable (e.g. --set path=/tmp --set recursive=true)
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,
        /// Request cancellation after this many milliseconds
        #[arg(long)]
        cancel_after_ms: Option<u64>,
    },
}

// ── Setup ────────────────────────────────────────────────────────

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

struct Context {
    settings: AppSettings,
    snapshot: RegistrySnapshot,
    config_dir: Option<PathBuf>,
}

fn load_context(config_dir: Option<PathBuf>) -> Context {
    let config_dir = config_dir.or_else(paths::default_config_dir);
    let settings = config_dir
        .as_deref()
        .and_then(settings::load_settings)
        .unwrap_or_default();
    Context {
        settings,
        snapshot: RegistrySnapshot::capture(&demo_registry()),
        config_dir,
    }
}

fn build_form(ctx: &Context, command: &str) -> Form {
    let identity = CommandIdentity::new(command);
    let schema = match ctx.snapshot.get_schema(&identity) {
        Ok(schema) => schema,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(EXIT_INVALID);
        }
    };
    let suite = ctx.config_dir.as_deref().map(load_suite).unwrap_or_default();
    let adaptation = adapt(&identity, schema, &suite);
    for warning in &adaptation.warnings {
        eprintln!("warning: {warning}");
    }
    Form::assemble_with(identity, adaptation.descriptors, &FormOptions::from_settings(&ctx.settings))
}

/// Text from `--set` as the value a user would put into the control.
fn cli_value(kind: &ParamKind, raw: &str) -> FieldValue {
    match kind {
        ParamKind::List { .. } => FieldValue::List(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(FieldValue::parse_text)
                .collect(),
        ),
        ParamKind::KeyValue { .. } => FieldValue::Text(raw.to_string()),
        _ => FieldValue::parse_text(raw),
    }
}

// ── Output formatting ────────────────────────────────────────────

fn print_form(form: &Form, raw_json: bool) {
    if raw_json {
        let fields: Vec<Value> = form
            .layout()
            .map(|(d, control)| {
                json!({
                    "name": d.name,
                    "label": d.label,
                    "kind": d.kind,
                    "required": d.required,
                    "default": d.default,
                    "help": d.help,
                    "widget": control.widget(),
                    "validity": form.state().fields.get(&d.name),
                })
            })
            .collect();
        let out = json!({
            "command": form.command(),
            "fields": fields,
            "submit_enabled": form.state().submit_enabled,
        });
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
        return;
    }

    println!("{}", form.command());
    for (d, control) in form.layout() {
        let marker = if d.required { "*" } else { " " };
        let validity = match form.state().fields.get(&d.name) {
            Some(FieldValidity::Invalid { reason }) => format!("  ({reason})"),
            _ => String::new(),
        };
        println!(
            "  {marker} {:<14} {:<12} {}{validity}",
            d.label,
            control.widget().archetype(),
            d.tooltip().lines().next().unwrap_or_default()
        );
    }
    println!("submit enabled: {}", form.state().submit_enabled);
}

fn print_event(command: &str, event: &LoggedEvent, raw_json: bool) {
    if raw_json {
        println!("{}", serde_json::to_string(event).unwrap_or_default());
        return;
    }
    match &event.event {
        RunEvent::Progress { message, progress } => {
            let notice = ProgressNotice {
                run_id: event.run.0,
                command: command.to_string(),
                message: message.clone(),
                progress: *progress,
            };
            eprintln!("{}", notice.render());
        }
        RunEvent::PartialResult { payload } => println!("{payload}"),
        RunEvent::Error {
            detail, recoverable, ..
        } => {
            let level = if *recoverable { "warning" } else { "error" };
            eprintln!("{level}: {detail}");
        }
        RunEvent::Completed { summary } => eprintln!(
            "completed: {} result(s), {} error(s) in {} ms",
            summary.results, summary.errors, summary.elapsed_ms
        ),
    }
}

// ── Run ──────────────────────────────────────────────────────────

enum Wake {
    Event,
    CancelTimer,
    Interrupt,
}

async fn run_command(ctx: &Context, command: &str, edits: &[String], cancel_after: Option<Duration>, raw: bool) -> i32 {
    let mut form = build_form(ctx, command);

    for edit in edits {
        let Some((name, raw_value)) = edit.split_once('=') else {
            eprintln!("Error: expected NAME=VALUE, got '{edit}'");
            return EXIT_INVALID;
        };
        let Some(descriptor) = form.descriptor(name) else {
            eprintln!("Error: {command} has no parameter named '{name}'");
            return EXIT_INVALID;
        };
        let value = cli_value(&descriptor.kind, raw_value);
        if let Err(e) = form.set_value(name, &value) {
            eprintln!("Error: {name}: {e}");
            return EXIT_INVALID;
        }
    }

    // run the expensive checks a shell would run on focus loss
    let names: Vec<String> = form.descriptors().iter().map(|d| d.name.clone()).collect();
    for name in &names {
        if let Ok(Some(probe)) = form.leave_field(name) {
            match run_probe(probe).await {
                Ok(outcome) => {
                    form.apply_probe(outcome);
                }
                Err(e) => tracing::warn!("probe for {name} failed: {e}"),
            }
        }
    }

    let mut bridge = ExecutionBridge::new(Arc::new(demo_invoker()), Handle::current(), ctx.settings.bridge.clone());
    let mut session = FormSession::new(form);
    let handle = match session.submit(&mut bridge).await {
        Ok(handle) => handle,
        Err(SubmitError::Invalid(failures)) => {
            for failure in &failures {
                eprintln!("invalid: {failure}");
            }
            return EXIT_INVALID;
        }
        Err(SubmitError::App(e)) => {
            eprintln!("Error: {e}");
            return EXIT_FAILED;
        }
    };

    let label = command.to_string();
    bridge
        .on_event(handle, move |event| print_event(&label, event, raw))
        .expect("run was just launched");

    let mut cancel_at = cancel_after.map(|d| Instant::now() + d);
    let outcome = loop {
        if let Some(outcome) = bridge.run(handle).expect("run is tracked").outcome() {
            break outcome.clone();
        }
        let wake = match cancel_at {
            Some(at) => tokio::select! {
                _ = bridge.dispatch_next() => Wake::Event,
                () = tokio::time::sleep_until(at) => Wake::CancelTimer,
                _ = tokio::signal::ctrl_c() => Wake::Interrupt,
            },
            None => tokio::select! {
                _ = bridge.dispatch_next() => Wake::Event,
                _ = tokio::signal::ctrl_c() => Wake::Interrupt,
            },
        };
        match wake {
            Wake::Event => {}
            Wake::CancelTimer | Wake::Interrupt => {
                cancel_at = None;
                if let Err(e) = session.cancel(&bridge) {
                    eprintln!("Error: {e}");
                }
            }
        }
    };
    session.close(&mut bridge);

    if raw {
        println!("{}", serde_json::to_string(&outcome).unwrap_or_default());
    }
    match outcome {
        RunOutcome::Success | RunOutcome::Partial { .. } => 0,
        RunOutcome::Failed { .. } => EXIT_FAILED,
        RunOutcome::Cancelled { forced } => {
            eprintln!("{}", if forced { "cancelled (forced)" } else { "cancelled" });
            EXIT_CANCELLED
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let ctx = load_context(cli.config_dir);
    let raw = cli.json;

    let code = match &cli.command {
        Commands::Commands => {
            if raw {
                let list: Vec<Value> = ctx
                    .snapshot
                    .list_commands()
                    .map(|c| json!({ "command": c, "description": ctx.snapshot.description(c) }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&list).unwrap_or_default());
            } else {
                println!("{}", help_text(&demo_registry(), None));
            }
            0
        }
        Commands::Form { command } => {
            print_form(&build_form(&ctx, command), raw);
            0
        }
        Commands::Run {
            command,
            set,
            cancel_after_ms,
        } => run_command(&ctx, command, set, cancel_after_ms.map(Duration::from_millis), raw).await,
    };
    process::exit(code);
}
