//! # baton
//!
//! Runs a small demo agent graph with a human at the keyboard playing the model.
//! Type a plain reply to answer, or use `/tool <name> <json>` and
//! `/handoff <agent>` lines to act like a model that calls tools.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use serde_json::json;
use tracing::Level;

use baton_core::agent::{Agent, AgentGraph};
use baton_core::events::RunEvent;
use baton_core::guardrail::FnGuardrail;
use baton_core::handoff::Handoff;
use baton_core::ids::SessionId;
use baton_core::items::{Item, ToolOutput};
use baton_core::result::{RunOutcome, RunResult};
use baton_core::session::SessionHandle;
use baton_core::tools::{FunctionTool, ToolError};
use baton_engine::{RunOptions, Runner, RunnerConfig};
use baton_llm::ManualBackend;
use baton_store::{Database, SqliteSessionStore};
use baton_telemetry::{init_telemetry, parse_module_level, TelemetryConfig, TracingSink};

/// Manual agent run.
#[derive(Parser, Debug)]
#[command(name = "baton", about = "Drive a demo agent graph by hand")]
struct Cli {
    /// JSON file with runner settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Turn budget for this run (overrides the config file).
    #[arg(long)]
    max_turns: Option<u32>,

    /// SQLite file holding session history.
    #[arg(long, requires = "session")]
    session_db: Option<PathBuf>,

    /// Session to resume and extend.
    #[arg(long, requires = "session_db")]
    session: Option<String>,

    /// Log as JSON lines instead of text.
    #[arg(long)]
    json_logs: bool,

    /// Per-module log level, e.g. `baton_engine=debug`. Repeatable.
    #[arg(long = "log-module", value_name = "MODULE=LEVEL", value_parser = parse_module_level)]
    log_modules: Vec<(String, Level)>,

    /// The user message that starts the run.
    prompt: String,
}

fn load_config(path: Option<&Path>) -> Result<RunnerConfig> {
    let Some(path) = path else {
        return Ok(RunnerConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid config: {}", path.display()))
}

fn add_tool() -> FunctionTool {
    FunctionTool::new(
        "add",
        "Add two integers",
        json!({
            "type": "object",
            "properties": {
                "a": {"type": "integer"},
                "b": {"type": "integer"}
            },
            "required": ["a", "b"]
        }),
        |args, _ctx| async move {
            let (Some(a), Some(b)) = (args["a"].as_i64(), args["b"].as_i64()) else {
                return Err(ToolError::InvalidArguments("a and b must be integers".into()));
            };
            a.checked_add(b)
                .map(|sum| json!(sum))
                .ok_or_else(|| ToolError::ExecutionFailed("integer overflow".into()))
        },
    )
}

fn demo_graph() -> Result<AgentGraph> {
    let triage = Agent::builder("triage")
        .instructions("Route arithmetic questions to the math agent. Answer anything else yourself.")
        .handoff(Handoff::to("math").with_description("Arithmetic specialist"))
        .build();
    let math = Agent::builder("math")
        .instructions("Use the add tool to answer. Never reveal confidential information.")
        .tool(add_tool())
        .output_guardrail(FnGuardrail::deny_substring("confidential", "confidential"))
        .handoff(Handoff::to("triage").with_description("Hand back for non-math questions"))
        .build();
    Ok(AgentGraph::new([triage, math])?)
}

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::TurnStarted { turn, agent } => println!("--- turn {turn} ({agent}) ---"),
        RunEvent::ItemAppended { item } => match item {
            Item::ToolCall(call) => println!("[tool call] {}({})", call.name, call.arguments),
            Item::ToolResult(result) => match &result.output {
                ToolOutput::Success { value } => {
                    println!("[tool result] {} -> {value}", result.tool_name)
                }
                ToolOutput::Failure { kind, message } => {
                    println!("[tool failure] {} ({kind:?}): {message}", result.tool_name)
                }
            },
            Item::Handoff(marker) => {
                println!("[handoff] {} -> {}", marker.source, marker.destination)
            }
            Item::Assistant { agent, text } => println!("[{agent}] {text}"),
            Item::User { .. } => {}
        },
        RunEvent::GuardrailEvaluated { result } if result.verdict.is_trip() => {
            println!("[guardrail] {} tripped", result.guardrail)
        }
        _ => {}
    }
}

fn print_outcome(result: &RunResult) {
    println!("=== {} after {} turn(s) ===", result.outcome.kind(), result.turns);
    match &result.outcome {
        RunOutcome::Success { output } => println!("{}", output.as_text()),
        RunOutcome::GuardrailTripped { trip } => {
            println!("{} guardrail `{}`: {}", trip.kind, trip.guardrail, trip.reason)
        }
        RunOutcome::MaxTurnsExceeded { max_turns } => println!("turn budget of {max_turns} used up"),
        RunOutcome::UnauthorizedHandoff { source, target } => {
            println!("{source} may not hand off to {target}")
        }
        RunOutcome::BackendFailure { error } => println!("{}: {}", error.kind, error.message),
        RunOutcome::InvalidOutput { reason } => println!("{reason}"),
        RunOutcome::Cancelled => println!("run cancelled"),
    }
    println!(
        "tokens: {} in / {} out over {} request(s)",
        result.usage.input_tokens, result.usage.output_tokens, result.usage.requests
    );
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        json: cli.json_logs,
        module_levels: cli.log_modules.clone(),
        ..TelemetryConfig::default()
    })?;

    let config = load_config(cli.config.as_deref())?;
    let backend = Arc::new(ManualBackend::new().with_directives(true));
    let runner = Runner::new(demo_graph()?, backend, config);

    let mut options = RunOptions::new().with_trace_sink(Arc::new(TracingSink::new()));
    if let Some(max_turns) = cli.max_turns {
        options = options.with_max_turns(max_turns);
    }
    if let (Some(db_path), Some(session)) = (&cli.session_db, &cli.session) {
        let db = Database::open(db_path)
            .with_context(|| format!("Failed to open session DB: {}", db_path.display()))?;
        let store = Arc::new(SqliteSessionStore::new(db));
        options = options.with_session(SessionHandle::new(store, SessionId::from_raw(session)));
    }

    let mut stream = runner.run_streamed("triage", cli.prompt, options)?;
    let cancel = stream.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    while let Some(event) = stream.next().await {
        print_event(&event);
    }
    let result = stream.finish().await?;

    print_outcome(&result);
    Ok(if result.outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
