//! Exchange behavior: event ordering, tool rounds, retrieval and commits.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::Notify;

use common::*;
use encore::config::EncoreConfig;
use encore::conversation::{Pipeline, MAX_TOOL_ROUNDS};
use encore::error::EncoreError;
use encore::model::ChatDelta;
use encore::retrieval::RetrievedChunk;
use encore::session::Session;
use encore::tools::{AgentTool, AgentToolParameters, Artifact, ToolRegistry};
use encore::types::{Role, SendOptions, StreamEvent};

fn session_with(model: &Arc<ScriptedModel>) -> Arc<Session> {
    Arc::new(Session::new("s-1", pipeline(model.clone())))
}

async fn wait_until_idle(session: &Session) {
    for _ in 0..100 {
        if !session.is_busy() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session stayed busy");
}

fn roles(session_history: &[encore::types::Message]) -> Vec<Role> {
    session_history.iter().map(|m| m.role).collect()
}

fn system_prompt(model: &ScriptedModel, call: usize) -> String {
    model.requests()[call].messages[0].content.clone()
}

#[tokio::test]
async fn plain_reply_streams_tokens_and_commits() {
    let model = Arc::new(ScriptedModel::new());
    model.reply("Try a ii-V-I.");
    let session = session_with(&model);

    let stream = session.send_stream("Suggest a progression", SendOptions::default()).unwrap();
    let (events, err) = drain(stream).await;

    assert!(err.is_none());
    assert_eq!(kinds(&events), vec!["status", "token"]);
    assert_eq!(visible_text(&events), "Try a ii-V-I.");

    let history = session.history().await;
    assert_eq!(roles(&history), vec![Role::User, Role::Assistant]);
    assert_eq!(history[0].content, "Suggest a progression");
    assert_eq!(history[1].content, "Try a ii-V-I.");
}

#[tokio::test]
async fn inline_reasoning_is_streamed_but_never_persisted() {
    let model = Arc::new(ScriptedModel::new());
    model.reply("<think>the user wants something dark</think>Use Phrygian.");
    let session = session_with(&model);

    let (events, err) = drain(session.send_stream("Mood?", SendOptions::default()).unwrap()).await;
    assert!(err.is_none());

    let thinking: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Thinking { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(thinking, "the user wants something dark");
    assert_eq!(visible_text(&events), "Use Phrygian.");
    assert_eq!(kinds(&events), vec!["status", "thinking", "token"]);

    let history = session.history().await;
    assert_eq!(history.last().unwrap().content, "Use Phrygian.");
    assert!(history.iter().all(|m| !m.content.contains("dark")));
}

#[tokio::test]
async fn native_reasoning_deltas_become_thinking_events() {
    let model = Arc::new(ScriptedModel::new());
    model.push(Script::Deltas(vec![
        ChatDelta::thinking("weighing keys"),
        ChatDelta::text("E minor."),
        ChatDelta::done(Vec::new()),
    ]));
    let session = session_with(&model);

    let (events, _) = drain(session.send_stream("Key?", SendOptions::default()).unwrap()).await;
    assert_eq!(
        events[1..].to_vec(),
        vec![StreamEvent::thinking("weighing keys"), StreamEvent::token("E minor.")]
    );
    assert_eq!(session.history().await[1].content, "E minor.");
}

#[tokio::test]
async fn tool_round_emits_ordered_events_and_artifacts() {
    let model = Arc::new(ScriptedModel::new());
    model.tool_call("render", json!({ "name": "intro" }));
    model.reply("Rendered.");
    let session = session_with(&model);

    let (events, err) = drain(session.send_stream("Render the intro", SendOptions::default()).unwrap()).await;
    assert!(err.is_none());
    assert_eq!(kinds(&events), vec!["status", "status", "tool_call", "part", "token"]);

    assert_eq!(events[0], StreamEvent::status("retrieving", None));
    assert_eq!(events[1], StreamEvent::status("tool", Some("Running render".into())));
    match &events[2] {
        StreamEvent::ToolCall { name, arguments, result } => {
            assert_eq!(name, "render");
            assert_eq!(arguments, &json!({ "name": "intro" }));
            assert_eq!(result["file_path"], "out/intro.mid");
        }
        other => panic!("expected tool call, got {other:?}"),
    }
    assert_eq!(
        events[3],
        StreamEvent::Part {
            kind: "file".into(),
            data: json!({ "path": "out/intro.mid" }),
        }
    );
    assert_eq!(session.artifacts().await, vec![Artifact::file("out/intro.mid")]);

    // The follow-up call sees the full result; history keeps the condensed form.
    let requests = model.requests();
    let second = &requests[1];
    let tool_message = second.messages.iter().find(|m| m.role == Role::Tool).unwrap();
    assert!(tool_message.content.contains("199"));

    let history = session.history().await;
    assert_eq!(
        roles(&history),
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(history[1].tool_calls.len(), 1);
    assert_eq!(history[2].tool_name.as_deref(), Some("render"));
    assert!(history[2].content.contains("[200 items]"));
    assert!(history[2].content.contains("out/intro.mid"));
    assert_eq!(history[3].content, "Rendered.");
}

#[tokio::test]
async fn tool_rounds_are_bounded() {
    let model = Arc::new(ScriptedModel::new());
    model.always(Script::Deltas(vec![ChatDelta::done(vec![encore::types::ToolCall::new(
        "echo",
        json!({ "text": "again" }),
    )])]));
    let session = session_with(&model);

    let (events, err) = drain(session.send_stream("Loop forever", SendOptions::default()).unwrap()).await;
    assert!(err.is_none());

    assert_eq!(model.calls(), MAX_TOOL_ROUNDS + 1);
    let requests = model.requests();
    assert!(requests[..MAX_TOOL_ROUNDS].iter().all(|r| !r.tools.is_empty()));
    assert!(requests[MAX_TOOL_ROUNDS].tools.is_empty());

    let tool_events = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::ToolCall { .. }))
        .count();
    assert_eq!(tool_events, MAX_TOOL_ROUNDS);
    assert_eq!(session.history().await.len(), 2 + 2 * MAX_TOOL_ROUNDS);
}

#[tokio::test]
async fn failing_tool_is_reported_and_exchange_continues() {
    let model = Arc::new(ScriptedModel::new());
    model.tool_call("explode", json!({}));
    model.reply("That did not work, try again later.");
    let session = session_with(&model);

    let (events, err) = drain(session.send_stream("Blow it up", SendOptions::default()).unwrap()).await;
    assert!(err.is_none());
    assert_eq!(events[1], StreamEvent::status("tool", Some("Detonating".into())));
    match &events[2] {
        StreamEvent::ToolCall { result, .. } => {
            assert_eq!(result, &json!({ "error": "Tool execution error: explode: kaboom" }));
        }
        other => panic!("expected tool call, got {other:?}"),
    }
    assert_eq!(visible_text(&events), "That did not work, try again later.");
    assert!(session.artifacts().await.is_empty());
}

#[tokio::test]
async fn unknown_tool_and_bad_arguments_become_error_results() {
    let model = Arc::new(ScriptedModel::new());
    model.tool_calls(vec![("teleport", json!({})), ("echo", json!({ "txt": "typo" }))]);
    model.reply("Sorry.");
    let session = session_with(&model);

    let (events, err) = drain(session.send_stream("Go", SendOptions::default()).unwrap()).await;
    assert!(err.is_none());

    let results: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::ToolCall { result, .. } => result["error"].as_str().map(str::to_string),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0], "Unknown tool: teleport");
    assert!(results[1].starts_with("Invalid arguments for echo"));
    assert_eq!(visible_text(&events), "Sorry.");
}

#[tokio::test]
async fn retrieval_failure_yields_a_normal_exchange() {
    let model = Arc::new(ScriptedModel::new());
    model.reply("Fine without notes.");
    let pipeline = pipeline(model.clone()).with_retriever(Arc::new(FailingRetriever));
    let session = Arc::new(Session::new("s-1", pipeline));

    let (events, err) = drain(session.send_stream("Hi", SendOptions::default()).unwrap()).await;
    assert!(err.is_none());
    assert_eq!(visible_text(&events), "Fine without notes.");
    assert_eq!(system_prompt(&model, 0), "You are a test persona.");
}

#[tokio::test]
async fn slow_retrieval_times_out_to_empty_context() {
    let model = Arc::new(ScriptedModel::new());
    model.reply("Moving on.");
    let pipeline = pipeline(model.clone()).with_retriever(Arc::new(HangingRetriever));
    let session = Arc::new(Session::new("s-1", pipeline));

    let stream = session.send_stream("Hi", SendOptions::default()).unwrap();
    let (events, err) = tokio::time::timeout(Duration::from_secs(5), drain(stream))
        .await
        .expect("retrieval timeout should bound the exchange");
    assert!(err.is_none());
    assert_eq!(visible_text(&events), "Moving on.");
}

#[tokio::test]
async fn retrieved_context_lands_in_the_system_prompt() {
    let model = Arc::new(ScriptedModel::new());
    model.reply("Borrow from the parallel minor.");
    let retriever = Arc::new(RecordingRetriever {
        chunks: vec![RetrievedChunk::new("Modal interchange borrows chords.")],
        ..Default::default()
    });
    let pipeline = pipeline(model.clone()).with_retriever(retriever.clone());
    let session = Arc::new(Session::new("s-1", pipeline));

    let options = SendOptions::builder().top_k(3).category_filter("harmony").build();
    drain(session.send_stream("Color my chords", options).unwrap()).await;

    let queries = retriever.queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].k, 3);
    assert_eq!(queries[0].category_filter.as_deref(), Some("harmony"));
    assert!(system_prompt(&model, 0).contains("Modal interchange borrows chords."));
}

#[tokio::test]
async fn zero_top_k_skips_retrieval() {
    let model = Arc::new(ScriptedModel::new());
    model.reply("ok");
    let retriever = Arc::new(RecordingRetriever::default());
    let pipeline = pipeline(model.clone()).with_retriever(retriever.clone());
    let session = Arc::new(Session::new("s-1", pipeline));

    let options = SendOptions::builder().top_k(0).build();
    let (events, _) = drain(session.send_stream("Hi", options).unwrap()).await;
    assert_eq!(kinds(&events), vec!["token"]);
    assert!(retriever.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn context_summary_applies_to_one_exchange_only() {
    let model = Arc::new(ScriptedModel::new());
    model.reply("Noted.");
    model.reply("Anything else?");
    let session = session_with(&model);

    session.set_context_summary("Track is in D minor at 92 BPM.");
    drain(session.send_stream("What key?", SendOptions::default()).unwrap()).await;
    assert!(!session.has_context_summary());
    drain(session.send_stream("And tempo?", SendOptions::default()).unwrap()).await;

    assert!(system_prompt(&model, 0).contains("D minor at 92 BPM"));
    assert!(!system_prompt(&model, 1).contains("D minor"));
}

#[tokio::test]
async fn follow_up_requests_carry_committed_history() {
    let model = Arc::new(ScriptedModel::new());
    model.reply("First answer.");
    model.reply("Second answer.");
    let session = session_with(&model);

    drain(session.send_stream("one", SendOptions::default()).unwrap()).await;
    drain(session.send_stream("two", SendOptions::builder().temperature(0.2).build()).unwrap()).await;

    let requests = model.requests();
    let request = &requests[1];
    let contents: Vec<&str> = request.messages[1..].iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "First answer.", "two"]);
    assert_eq!(request.temperature, Some(0.2));
    assert_eq!(requests[0].temperature, Some(0.7));
}

#[tokio::test]
async fn model_failure_ends_stream_with_error_and_no_commit() {
    let model = Arc::new(ScriptedModel::new());
    model.fail("connection refused");
    let session = session_with(&model);

    let (events, err) = drain(session.send_stream("Hi", SendOptions::default()).unwrap()).await;
    assert_eq!(kinds(&events), vec!["status"]);
    assert!(matches!(err, Some(EncoreError::ModelUnavailable { .. })));
    assert!(session.history().await.is_empty());
}

#[tokio::test]
async fn mid_stream_failure_discards_partial_reply() {
    let model = Arc::new(ScriptedModel::new());
    let mut deltas = text_deltas("Partial answ");
    deltas.pop();
    model.push(Script::FailMidStream(deltas, "socket closed".into()));
    let session = session_with(&model);

    let (events, err) = drain(session.send_stream("Hi", SendOptions::default()).unwrap()).await;
    assert_eq!(visible_text(&events), "Partial answ");
    let err = err.expect("terminal error");
    assert!(err.to_string().contains("socket closed"));
    assert!(session.history().await.is_empty());
}

#[tokio::test]
async fn dropping_the_stream_cancels_without_commit() {
    let model = Arc::new(ScriptedModel::new());
    model.push(Script::Slow(text_deltas("a long and winding answer"), Duration::from_millis(20)));
    let session = session_with(&model);

    let mut stream = session.send_stream("Hi", SendOptions::default()).unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first, StreamEvent::status("retrieving", None));
    drop(stream);

    wait_until_idle(&session).await;
    assert!(session.history().await.is_empty());
}

/// Tool that signals when it starts and records when it finishes.
fn slow_tool(started: Arc<Notify>, finished: Arc<AtomicBool>) -> AgentTool {
    AgentTool::new("slow", "Takes a while", AgentToolParameters::empty(), move |_args, _ctx| {
        let started = started.clone();
        let finished = finished.clone();
        async move {
            started.notify_one();
            tokio::time::sleep(Duration::from_millis(100)).await;
            finished.store(true, Ordering::SeqCst);
            Ok(json!({ "done": true }))
        }
    })
}

#[tokio::test]
async fn cancelling_during_a_tool_lets_it_finish_without_commit() {
    let model = Arc::new(ScriptedModel::new());
    model.tool_call("slow", json!({}));
    model.reply("never reached");
    let started = Arc::new(Notify::new());
    let finished = Arc::new(AtomicBool::new(false));
    let tools = ToolRegistry::new()
        .with(slow_tool(started.clone(), finished.clone()))
        .unwrap();
    let session = Arc::new(Session::new(
        "s-1",
        Pipeline::new(model.clone(), test_config()).with_tools(tools),
    ));

    let stream = session.send_stream("go", SendOptions::default()).unwrap();
    started.notified().await;
    stream.cancel();
    let (events, err) = drain(stream).await;

    assert!(finished.load(Ordering::SeqCst), "running tool was interrupted");
    assert!(events.iter().all(|e| !matches!(e, StreamEvent::ToolCall { .. })));
    assert!(matches!(err, None | Some(EncoreError::Cancelled)));
    assert_eq!(model.calls(), 1);
    wait_until_idle(&session).await;
    assert!(session.history().await.is_empty());
}

#[tokio::test]
async fn history_is_readable_while_a_stream_is_undrained() {
    let model = Arc::new(ScriptedModel::new());
    model.reply("First answer.");
    model.reply(&"la ".repeat(200));
    let config = EncoreConfig {
        event_queue_capacity: 1,
        ..test_config()
    };
    let session = Arc::new(Session::new(
        "s-1",
        Pipeline::new(model.clone(), config).with_tools(registry()),
    ));
    session.send("first", SendOptions::default()).await.unwrap();

    let stream = session.send_stream("second", SendOptions::default()).unwrap();
    tokio::task::yield_now().await;
    let history = tokio::time::timeout(Duration::from_secs(1), session.history())
        .await
        .expect("history does not wait on the running exchange");
    assert_eq!(history.len(), 2);
    assert!(session.is_busy());

    let (events, err) = drain(stream).await;
    assert!(err.is_none());
    assert_eq!(visible_text(&events), "la ".repeat(200));
    assert_eq!(session.history().await.len(), 4);
}

#[tokio::test]
async fn blocking_send_returns_clean_text() {
    let model = Arc::new(ScriptedModel::new());
    model.reply("<think>short</think>Final answer");
    let session = session_with(&model);

    let text = session.send("Hi", SendOptions::default()).await.unwrap();
    assert_eq!(text, "Final answer");
    assert_eq!(session.history().await[1].content, "Final answer");
}

#[tokio::test]
async fn blocking_send_runs_tool_rounds() {
    let model = Arc::new(ScriptedModel::new());
    model.tool_call("echo", json!({ "text": "ping" }));
    model.reply("pong");
    let session = session_with(&model);

    let text = session.send("Ping it", SendOptions::default()).await.unwrap();
    assert_eq!(text, "pong");
    let history = session.history().await;
    assert_eq!(history[2].content, r#"{"echo":"ping"}"#);
}
