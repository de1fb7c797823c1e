//! End-to-end runs against a scripted backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use baton_core::agent::{Agent, AgentGraph};
use baton_core::events::RunEvent;
use baton_core::guardrail::{FnGuardrail, GuardrailKind};
use baton_core::handoff::{Handoff, HistoryFilter};
use baton_core::ids::SessionId;
use baton_core::items::{FinalOutput, Item, OutputItem, ToolFailureKind, ToolOutput};
use baton_core::result::RunOutcome;
use baton_core::session::{SessionHandle, SessionStore};
use baton_core::tools::{FunctionTool, ToolError};
use baton_engine::{RunOptions, Runner, RunnerConfig};
use baton_llm::{MockBackend, MockResponse};
use baton_store::{Database, MemorySessionStore, SqliteSessionStore};
use baton_telemetry::MemorySink;

fn add_tool() -> FunctionTool {
    FunctionTool::new(
        "add",
        "Add two integers",
        json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
            "required": ["a", "b"]
        }),
        |args, _ctx| async move {
            let a = args["a"].as_i64().unwrap_or_default();
            let b = args["b"].as_i64().unwrap_or_default();
            Ok::<_, ToolError>(json!(a + b))
        },
    )
}

fn sleeper(name: &str, ms: u64) -> FunctionTool {
    FunctionTool::new(name, "sleeps", json!({"type": "object"}), move |_args, _ctx| async move {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok::<_, ToolError>(json!(ms))
    })
}

fn runner(agents: Vec<Agent>, responses: Vec<MockResponse>) -> (Runner, Arc<MockBackend>) {
    let backend = Arc::new(MockBackend::new(responses));
    let graph = AgentGraph::new(agents).unwrap();
    (
        Runner::new(graph, backend.clone(), RunnerConfig::default()),
        backend,
    )
}

/// Every tool call in `items` paired with the number of results carrying its id.
fn result_counts(items: &[Item]) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = items
        .iter()
        .filter_map(|item| match item {
            Item::ToolCall(call) => Some((call.id.to_string(), 0)),
            _ => None,
        })
        .collect();
    for item in items {
        if let Item::ToolResult(result) = item {
            *counts.entry(result.call_id.to_string()).or_default() += 1;
        }
    }
    counts
}

#[tokio::test]
async fn add_two_and_three() {
    let (runner, backend) = runner(
        vec![Agent::builder("calculator").tool(add_tool()).build()],
        vec![
            MockResponse::tool_call("add", json!({"a": 2, "b": 3})),
            MockResponse::text("5"),
        ],
    );

    let result = runner
        .run("calculator", "what is 2+3?", RunOptions::new())
        .await
        .unwrap();

    assert_eq!(result.final_output(), Some(&FinalOutput::Text("5".into())));
    assert_eq!(result.turns, 2);
    let kinds: Vec<&str> = result.items.iter().map(Item::kind).collect();
    assert_eq!(kinds, vec!["user", "tool_call", "tool_result", "assistant"]);

    let second = &backend.requests()[1];
    let carried = second.history.iter().find_map(|item| match item {
        Item::ToolResult(r) => Some(&r.output),
        _ => None,
    });
    assert_eq!(carried, Some(&ToolOutput::Success { value: json!(5) }));
}

#[tokio::test]
async fn every_tool_call_gets_exactly_one_result_even_when_tools_fault() {
    let failing = FunctionTool::new("fail", "always fails", json!({"type": "object"}), |_args, _ctx| async move {
        Err::<serde_json::Value, _>(ToolError::ExecutionFailed("disk on fire".into()))
    });
    let exploding = FunctionTool::new(
        "explode",
        "panics when asked",
        json!({"type": "object"}),
        |args, _ctx| async move {
            if args["now"].as_bool().unwrap_or(true) {
                panic!("tool exploded");
            }
            Ok::<_, ToolError>(json!(null))
        },
    );
    let (runner, _) = runner(
        vec![Agent::builder("a")
            .tool(add_tool())
            .tool(failing)
            .tool(exploding)
            .build()],
        vec![
            MockResponse::items(vec![
                OutputItem::tool_call("add", json!({"a": 1, "b": 2})),
                OutputItem::tool_call("missing", json!({})),
                OutputItem::tool_call("add", json!({"a": "one"})),
                OutputItem::tool_call("fail", json!({})),
                OutputItem::tool_call("explode", json!({"now": true})),
            ]),
            MockResponse::text("done"),
        ],
    );

    let result = runner.run("a", "go", RunOptions::new()).await.unwrap();
    assert!(result.outcome.is_success());

    let counts = result_counts(&result.items);
    assert_eq!(counts.len(), 5);
    assert!(counts.values().all(|&n| n == 1), "{counts:?}");

    let failures: Vec<Option<ToolFailureKind>> = result
        .items
        .iter()
        .filter_map(|item| match item {
            Item::ToolResult(r) => Some(match &r.output {
                ToolOutput::Success { .. } => None,
                ToolOutput::Failure { kind, .. } => Some(*kind),
            }),
            _ => None,
        })
        .collect();
    assert_eq!(
        failures,
        vec![
            None,
            Some(ToolFailureKind::UnknownTool),
            Some(ToolFailureKind::InvalidArguments),
            Some(ToolFailureKind::ExecutionFailed),
            Some(ToolFailureKind::Panicked),
        ]
    );
}

#[tokio::test]
async fn input_guardrail_trip_makes_no_backend_call() {
    let store = Arc::new(MemorySessionStore::new());
    let session = SessionId::new();
    let (runner, backend) = runner(
        vec![Agent::builder("a")
            .input_guardrail(FnGuardrail::deny_substring("no_passwords", "password"))
            .build()],
        vec![MockResponse::text("never sent")],
    );

    let result = runner
        .run(
            "a",
            "my PASSWORD is hunter2",
            RunOptions::new().with_session(SessionHandle::new(store.clone(), session.clone())),
        )
        .await
        .unwrap();

    assert_eq!(backend.call_count(), 0);
    let trip = result.tripped_guardrail().unwrap();
    assert_eq!(trip.guardrail, "no_passwords");
    assert_eq!(trip.kind, GuardrailKind::Input);
    assert_eq!(result.turns, 0);
    assert!(store.load(&session).await.unwrap().is_empty());
}

#[tokio::test]
async fn confidential_output_trips_and_keeps_history() {
    let store = Arc::new(MemorySessionStore::new());
    let session = SessionId::new();
    let (runner, _) = runner(
        vec![Agent::builder("math")
            .tool(add_tool())
            .output_guardrail(FnGuardrail::deny_substring("confidential", "confidential"))
            .output_guardrail(FnGuardrail::deny_substring("harmless", "zebra"))
            .build()],
        vec![
            MockResponse::tool_call("add", json!({"a": 2, "b": 2})),
            MockResponse::text("The answer is 4, but that is Confidential."),
        ],
    );

    let result = runner
        .run(
            "math",
            "2+2?",
            RunOptions::new().with_session(SessionHandle::new(store.clone(), session.clone())),
        )
        .await
        .unwrap();

    let trip = result.tripped_guardrail().unwrap();
    assert_eq!(trip.guardrail, "confidential");
    assert_eq!(trip.kind, GuardrailKind::Output);
    assert_eq!(result.guardrail_results.len(), 2);

    let kinds: Vec<&str> = result.items.iter().map(Item::kind).collect();
    assert_eq!(kinds, vec!["user", "tool_call", "tool_result", "assistant"]);
    assert_eq!(store.load(&session).await.unwrap(), result.items);
}

#[tokio::test]
async fn undeclared_handoff_is_unauthorized() {
    let (runner, backend) = runner(
        vec![
            Agent::builder("triage").handoff(Handoff::to("math")).build(),
            Agent::builder("math").build(),
            Agent::builder("billing").build(),
        ],
        vec![MockResponse::handoff("billing"), MockResponse::text("unused")],
    );

    let result = runner.run("triage", "refund me", RunOptions::new()).await.unwrap();

    match &result.outcome {
        RunOutcome::UnauthorizedHandoff { source, target } => {
            assert_eq!(source.as_str(), "triage");
            assert_eq!(target.as_str(), "billing");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(result.last_agent.as_str(), "triage");
    assert!(!result.items.iter().any(|i| matches!(i, Item::Handoff(_))));
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn max_turns_is_exact() {
    for max_turns in 1..=4u32 {
        let responses = (0..10)
            .map(|_| MockResponse::tool_call("add", json!({"a": 1, "b": 1})))
            .collect();
        let (runner, backend) = runner(vec![Agent::builder("a").tool(add_tool()).build()], responses);

        let result = runner
            .run("a", "loop", RunOptions::new().with_max_turns(max_turns))
            .await
            .unwrap();

        assert_eq!(result.outcome, RunOutcome::MaxTurnsExceeded { max_turns });
        assert_eq!(result.turns, max_turns);
        assert_eq!(backend.call_count(), max_turns as usize);
    }
}

#[tokio::test(start_paused = true)]
async fn staggered_tools_are_all_awaited_in_call_order() {
    let (runner, backend) = runner(
        vec![Agent::builder("a")
            .tool(sleeper("slow", 300))
            .tool(sleeper("fast", 100))
            .tool(sleeper("medium", 200))
            .build()],
        vec![
            MockResponse::items(vec![
                OutputItem::tool_call("slow", json!({})),
                OutputItem::tool_call("fast", json!({})),
                OutputItem::tool_call("medium", json!({})),
            ]),
            MockResponse::text("all done"),
        ],
    );

    let start = tokio::time::Instant::now();
    let result = runner.run("a", "go", RunOptions::new()).await.unwrap();
    let elapsed = start.elapsed();

    assert!(result.outcome.is_success());
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(600), "tools ran sequentially: {elapsed:?}");

    let second = &backend.requests()[1];
    let values: Vec<serde_json::Value> = second
        .history
        .iter()
        .filter_map(|item| match item {
            Item::ToolResult(r) => match &r.output {
                ToolOutput::Success { value } => Some(value.clone()),
                ToolOutput::Failure { .. } => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(values, vec![json!(300), json!(100), json!(200)]);
}

#[tokio::test]
async fn identity_handoff_carries_full_history() {
    let (runner, backend) = runner(
        vec![
            Agent::builder("triage")
                .tool(add_tool())
                .handoff(Handoff::to("math"))
                .build(),
            Agent::builder("math").build(),
        ],
        vec![
            MockResponse::tool_call("add", json!({"a": 1, "b": 1})),
            MockResponse::items(vec![
                OutputItem::message("sending you to math"),
                OutputItem::handoff("math"),
            ]),
            MockResponse::text("2"),
        ],
    );

    let result = runner.run("triage", "1+1", RunOptions::new()).await.unwrap();
    assert_eq!(result.last_agent.as_str(), "math");
    assert!(result.outcome.is_success());

    let requests = backend.requests();
    assert_eq!(requests[2].agent.as_str(), "math");
    let math_history = &requests[2].history;
    let (marker, carried) = math_history.split_last().unwrap();
    match marker {
        Item::Handoff(m) => {
            assert_eq!(m.source.as_str(), "triage");
            assert_eq!(m.destination.as_str(), "math");
        }
        other => panic!("expected a handoff marker, got {other:?}"),
    }

    // Everything triage had seen plus what its last turn produced.
    let mut expected = requests[1].history.clone();
    expected.push(Item::assistant("triage".into(), "sending you to math"));
    assert_eq!(carried, expected.as_slice());
}

#[tokio::test]
async fn handoff_filter_shapes_destination_history() {
    let (runner, backend) = runner(
        vec![
            Agent::builder("triage")
                .tool(add_tool())
                .handoff(Handoff::to("math").with_filter(HistoryFilter::RemoveToolItems))
                .build(),
            Agent::builder("math").build(),
        ],
        vec![
            MockResponse::tool_call("add", json!({"a": 1, "b": 1})),
            MockResponse::handoff("math"),
            MockResponse::text("2"),
        ],
    );

    let result = runner.run("triage", "1+1", RunOptions::new()).await.unwrap();
    assert!(result.outcome.is_success());

    let math_history = &backend.requests()[2].history;
    assert!(!math_history.iter().any(Item::is_tool_item));
    assert!(matches!(math_history.last(), Some(Item::Handoff(_))));

    // The full transcript still has the tool exchange.
    assert!(result.items.iter().any(Item::is_tool_item));
}

#[tokio::test(start_paused = true)]
async fn cancel_with_two_tools_in_flight() {
    let cancel = CancellationToken::new();
    let (runner, _) = runner(
        vec![Agent::builder("a")
            .tool(sleeper("quick", 10))
            .tool(sleeper("stuck", 60_000))
            .build()],
        vec![
            MockResponse::items(vec![
                OutputItem::tool_call("quick", json!({})),
                OutputItem::tool_call("stuck", json!({})),
            ]),
            MockResponse::text("unreachable"),
        ],
    );

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = runner
        .run("a", "go", RunOptions::new().with_cancel(cancel))
        .await
        .unwrap();

    assert_eq!(result.outcome, RunOutcome::Cancelled);
    let calls = result.items.iter().filter(|i| matches!(i, Item::ToolCall(_))).count();
    let results: Vec<_> = result
        .items
        .iter()
        .filter_map(|i| match i {
            Item::ToolResult(r) => Some(r),
            _ => None,
        })
        .collect();
    assert_eq!(calls, 2);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].tool_name, "quick");
    assert!(result_counts(&result.items).values().all(|&n| n <= 1));
}

#[tokio::test(start_paused = true)]
async fn streamed_run_can_be_cancelled_mid_model_call() {
    let (runner, _) = runner(
        vec![Agent::builder("a").build()],
        vec![MockResponse::delayed(
            Duration::from_secs(60),
            MockResponse::text("too late"),
        )],
    );

    let mut stream = runner.run_streamed("a", "hi", RunOptions::new()).unwrap();
    while let Some(event) = stream.next().await {
        if matches!(event, RunEvent::TurnStarted { .. }) {
            break;
        }
    }
    stream.cancel();

    let result = stream.finish().await.unwrap();
    assert_eq!(result.outcome, RunOutcome::Cancelled);
    assert_eq!(result.items, vec![Item::user("hi")]);
}

#[tokio::test]
async fn trace_sink_sees_every_event_but_deltas() {
    let sink = Arc::new(MemorySink::new());
    let (runner, _) = runner(
        vec![Agent::builder("a").tool(add_tool()).build()],
        vec![
            MockResponse::tool_call("add", json!({"a": 2, "b": 3})),
            MockResponse::text("5"),
        ],
    );

    let stream = runner
        .run_streamed("a", "2+3", RunOptions::new().with_trace_sink(sink.clone()))
        .unwrap();
    let streamed: Vec<RunEvent> = stream.collect().await;

    let types = sink.event_types();
    assert_eq!(types.first(), Some(&"run_started"));
    assert_eq!(types.last(), Some(&"run_finished"));
    assert!(types.contains(&"tool_started"));
    assert!(types.contains(&"tool_finished"));
    assert!(!types.contains(&"text_delta"));

    let non_deltas = streamed.iter().filter(|e| !e.is_delta()).count();
    assert_eq!(non_deltas, sink.len());
    assert!(streamed.iter().any(RunEvent::is_delta));
}

#[tokio::test]
async fn missing_trace_sink_changes_nothing() {
    let script = || {
        vec![
            MockResponse::tool_call("add", json!({"a": 2, "b": 3})),
            MockResponse::text("5"),
        ]
    };
    let agents = || vec![Agent::builder("a").tool(add_tool()).build()];

    let (plain, _) = runner(agents(), script());
    let (traced, _) = runner(agents(), script());
    let without = plain.run("a", "2+3", RunOptions::new()).await.unwrap();
    let with = traced
        .run(
            "a",
            "2+3",
            RunOptions::new().with_trace_sink(Arc::new(MemorySink::new())),
        )
        .await
        .unwrap();

    assert_eq!(without.outcome, with.outcome);
    assert_eq!(without.turns, with.turns);
    assert_eq!(without.items.len(), with.items.len());
}

#[tokio::test]
async fn sqlite_session_carries_history_across_runs() {
    let store = Arc::new(SqliteSessionStore::new(Database::in_memory().unwrap()));
    let session = SessionHandle::new(store.clone(), SessionId::new());
    let (runner, backend) = runner(
        vec![Agent::builder("a").build()],
        vec![MockResponse::text("hello"), MockResponse::text("again")],
    );

    let first = runner
        .run("a", "hi", RunOptions::new().with_session(session.clone()))
        .await
        .unwrap();
    assert_eq!(first.session_items, 0);

    let second = runner
        .run("a", "and now?", RunOptions::new().with_session(session.clone()))
        .await
        .unwrap();
    assert_eq!(second.session_items, 2);
    assert_eq!(second.new_items().len(), 2);

    let sent = &backend.requests()[1].history;
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0], Item::user("hi"));
    assert_eq!(sent[2], Item::user("and now?"));

    assert_eq!(store.load(&session.id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn transient_failure_is_retried_once() {
    let backend = Arc::new(MockBackend::new(vec![
        MockResponse::Error(baton_core::errors::BackendError::Overloaded),
        MockResponse::text("recovered"),
    ]));
    let mut config = RunnerConfig::default();
    config.retry.base_delay_ms = 1;
    config.retry.jitter_factor = 0.0;
    let runner = Runner::new(
        AgentGraph::new([Agent::builder("a").build()]).unwrap(),
        backend.clone(),
        config,
    );

    let result = runner.run("a", "hi", RunOptions::new()).await.unwrap();
    assert_eq!(
        result.final_output(),
        Some(&FinalOutput::Text("recovered".into()))
    );
    assert_eq!(backend.call_count(), 2);
    assert_eq!(result.turns, 1);
}

/// A tool with a side effect we can count.
fn charge_tool(hits: Arc<AtomicUsize>) -> FunctionTool {
    FunctionTool::new("charge", "charges a card", json!({"type": "object"}), move |_args, _ctx| {
        let hits = Arc::clone(&hits);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ToolError>(json!("charged"))
        }
    })
}

#[tokio::test(start_paused = true)]
async fn caller_timeout_cancels_the_run() {
    let hits = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(MemorySessionStore::new());
    let session = SessionId::new();
    let (runner, backend) = runner(
        vec![Agent::builder("a").tool(charge_tool(hits.clone())).build()],
        vec![
            MockResponse::delayed(
                Duration::from_secs(1),
                MockResponse::tool_call("charge", json!({})),
            ),
            MockResponse::text("charged you"),
        ],
    );

    let options = RunOptions::new().with_session(SessionHandle::new(store.clone(), session.clone()));
    let timed_out = tokio::time::timeout(Duration::from_millis(100), runner.run("a", "go", options)).await;
    assert!(timed_out.is_err());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(backend.call_count(), 1);
    assert_eq!(store.load(&session).await.unwrap(), vec![Item::user("go")]);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_stream_cancels_the_run() {
    let hits = Arc::new(AtomicUsize::new(0));
    let (runner, backend) = runner(
        vec![Agent::builder("a").tool(charge_tool(hits.clone())).build()],
        vec![
            MockResponse::delayed(
                Duration::from_secs(1),
                MockResponse::tool_call("charge", json!({})),
            ),
            MockResponse::text("charged you"),
        ],
    );

    let caller = CancellationToken::new();
    let mut stream = runner
        .run_streamed("a", "go", RunOptions::new().with_cancel(caller.clone()))
        .unwrap();
    while let Some(event) = stream.next().await {
        if matches!(event, RunEvent::TurnStarted { .. }) {
            break;
        }
    }
    drop(stream);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(backend.call_count() <= 1);
    assert!(!caller.is_cancelled(), "the caller's own token must stay usable");
}

#[tokio::test]
async fn detached_run_keeps_going() {
    let hits = Arc::new(AtomicUsize::new(0));
    let (runner, _) = runner(
        vec![Agent::builder("a").tool(charge_tool(hits.clone())).build()],
        vec![
            MockResponse::tool_call("charge", json!({})),
            MockResponse::text("charged you"),
        ],
    );

    let handle = runner
        .run_streamed("a", "go", RunOptions::new())
        .unwrap()
        .detach();
    let result = handle.await.unwrap().unwrap();

    assert!(result.outcome.is_success());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_tools_leave_no_unpaired_calls_in_the_session() {
    let store = Arc::new(MemorySessionStore::new());
    let session = SessionHandle::new(store.clone(), SessionId::new());
    let (runner, backend) = runner(
        vec![Agent::builder("a")
            .tool(sleeper("quick", 10))
            .tool(sleeper("stuck", 60_000))
            .build()],
        vec![
            MockResponse::items(vec![
                OutputItem::tool_call("quick", json!({})),
                OutputItem::tool_call("stuck", json!({})),
            ]),
            MockResponse::text("fresh start"),
        ],
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let first = runner
        .run(
            "a",
            "go",
            RunOptions::new().with_session(session.clone()).with_cancel(cancel),
        )
        .await
        .unwrap();
    assert_eq!(first.outcome, RunOutcome::Cancelled);

    let loaded = store.load(&session.id).await.unwrap();
    let calls = loaded.iter().filter(|i| matches!(i, Item::ToolCall(_))).count();
    let results = loaded.iter().filter(|i| matches!(i, Item::ToolResult(_))).count();
    assert_eq!(calls, 1);
    assert_eq!(results, 1);
    assert!(result_counts(&loaded).values().all(|&n| n == 1));

    let second = runner
        .run("a", "again", RunOptions::new().with_session(session))
        .await
        .unwrap();
    assert!(second.outcome.is_success());
    let sent = &backend.requests()[1].history;
    assert!(result_counts(sent).values().all(|&n| n == 1));
}

#[tokio::test]
async fn tool_calls_resolve_before_a_handoff_in_the_same_turn() {
    let (runner, backend) = runner(
        vec![
            Agent::builder("a")
                .tool(add_tool())
                .handoff(Handoff::to("b"))
                .build(),
            Agent::builder("b").build(),
        ],
        vec![
            MockResponse::items(vec![
                OutputItem::handoff("b"),
                OutputItem::tool_call("add", json!({"a": 1, "b": 1})),
            ]),
            MockResponse::text("2"),
        ],
    );

    let result = runner.run("a", "1+1 then b", RunOptions::new()).await.unwrap();

    assert!(result.outcome.is_success());
    assert_eq!(result.last_agent.as_str(), "b");
    let kinds: Vec<&str> = result.items.iter().map(Item::kind).collect();
    assert_eq!(
        kinds,
        vec!["user", "tool_call", "tool_result", "handoff", "assistant"]
    );

    let requests = backend.requests();
    assert_eq!(requests[1].agent.as_str(), "b");
    let carried = requests[1].history.iter().find_map(|item| match item {
        Item::ToolResult(r) => Some(&r.output),
        _ => None,
    });
    assert_eq!(carried, Some(&ToolOutput::Success { value: json!(2) }));
}

#[tokio::test]
async fn tool_calls_resolve_before_an_unauthorized_handoff() {
    let (runner, backend) = runner(
        vec![
            Agent::builder("a")
                .tool(add_tool())
                .handoff(Handoff::to("b"))
                .build(),
            Agent::builder("b").build(),
            Agent::builder("c").build(),
        ],
        vec![
            MockResponse::items(vec![
                OutputItem::handoff("c"),
                OutputItem::tool_call("add", json!({"a": 1, "b": 1})),
            ]),
            MockResponse::text("unused"),
        ],
    );

    let result = runner.run("a", "1+1 then c", RunOptions::new()).await.unwrap();

    assert!(matches!(
        &result.outcome,
        RunOutcome::UnauthorizedHandoff { target, .. } if target.as_str() == "c"
    ));
    assert_eq!(result.last_agent.as_str(), "a");
    let kinds: Vec<&str> = result.items.iter().map(Item::kind).collect();
    assert_eq!(kinds, vec!["user", "tool_call", "tool_result"]);
    assert_eq!(backend.call_count(), 1);
}
