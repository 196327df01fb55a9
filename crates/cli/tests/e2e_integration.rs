//! End-to-end tests for the handoff runtime.
//!
//! Each test starts from a TOML config, builds the runtime the binary would
//! build (personas, built-in tools, memory, telemetry) around a scripted
//! provider, and drives a [`Session`] the way the interactive shell does.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use handoff_agent::Session;
use handoff_agent::testing::{ScriptedProvider, call};
use handoff_cli::repl::{self, Input};
use handoff_cli::{Runtime, build_runtime};
use handoff_config::AppConfig;
use handoff_core::error::{ProviderError, TurnError};
use handoff_core::message::{MessageContent, Role};
use handoff_telemetry::SpanKind;
use serde_json::json;

const PERSONAS: &str = r#"
default_persona = "planner"

[agent]
max_iterations = 6
user_id = "alice"

[memory]
backend = "none"

[[personas]]
id = "planner"
description = "Breaks requests down and hands parts to specialists"
system_prompt = "You plan. Delegate jokes to joke_writer."
tools = ["delegate", "calculator"]

[[personas]]
id = "joke_writer"
description = "Writes short jokes"
system_prompt = "You write one short joke."
tools = []
"#;

fn config(toml_str: &str, dir: &Path) -> AppConfig {
    let path = dir.join("config.toml");
    std::fs::write(&path, toml_str).unwrap();
    let mut config = AppConfig::load_from(&path).unwrap();
    config.tools.workspace_dir = Some(dir.join("workspace"));
    config
}

fn runtime(config: &AppConfig, provider: &Arc<ScriptedProvider>) -> Runtime {
    build_runtime(config, provider.clone()).unwrap()
}

fn roles(session: &Session) -> Vec<Role> {
    session.history().messages().iter().map(|m| m.role).collect()
}

// ── Example scenarios ─────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_direct_answer() {
    let dir = tempfile::tempdir().unwrap();
    let config = config("", dir.path());
    let provider = Arc::new(ScriptedProvider::new().then_answer("2 + 2 = 4"));
    let mut session = runtime(&config, &provider).session();

    let answer = session.process("what's 2+2").await.unwrap();

    assert_eq!(answer, "2 + 2 = 4");
    assert_eq!(roles(&session), vec![Role::User, Role::Assistant]);
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn e2e_tool_call_then_answer() {
    let dir = tempfile::tempdir().unwrap();
    let config = config("", dir.path());
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_calls(vec![call("c1", "calculator", json!({"expression": "17 * 23"}))])
            .then_answer("17 * 23 is 391."),
    );
    let mut session = runtime(&config, &provider).session();

    let answer = session.process("what is 17 times 23?").await.unwrap();
    assert_eq!(answer, "17 * 23 is 391.");

    assert_eq!(
        roles(&session),
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    let result = session.history().messages()[2].result().unwrap();
    assert_eq!(result.call_id, "c1");
    assert!(result.is_ok());
    assert_eq!(result.render(), "391");

    // The second model call saw the tool result.
    let second = &provider.requests()[1];
    assert_eq!(second.messages.len(), 3);
}

#[tokio::test]
async fn e2e_delegation_folds_callee_answer_into_caller() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(PERSONAS, dir.path());
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_calls(vec![call(
                "d1",
                "delegate",
                json!({"callee": "joke_writer", "task": "write a joke about cats"}),
            )])
            .then_answer("Why did the cat sit on the computer? To keep an eye on the mouse.")
            .then_answer(
                "Here you go: Why did the cat sit on the computer? To keep an eye on the mouse.",
            ),
    );
    let runtime = runtime(&config, &provider);
    let mut session = runtime.session();
    assert_eq!(session.active_persona(), "planner");

    let answer = session.process("tell me a joke about cats").await.unwrap();
    assert!(answer.contains("keep an eye on the mouse"));

    // Caller history: user, delegate call, one tool result, final answer.
    let messages = session.history().messages();
    assert_eq!(
        roles(&session),
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert!(messages.iter().all(|m| m.persona_id == "planner"));
    let folded = messages[2].result().unwrap();
    assert_eq!(folded.call_id, "d1");
    assert!(folded.render().starts_with("Why did the cat"));

    // The callee ran in its own history, seeded with the task only.
    let requests = provider.requests();
    assert_eq!(requests[1].system_prompt, "You write one short joke.");
    assert_eq!(requests[1].messages.len(), 1);
    assert_eq!(requests[1].messages[0].text(), Some("write a joke about cats"));
    assert!(requests[1].tools.is_empty());

    // Sequence indices stay strictly increasing across the hand-off.
    assert!(messages.windows(2).all(|w| w[0].sequence < w[1].sequence));

    // Telemetry nests the delegation inside the user's trace.
    let telemetry = runtime.telemetry.as_ref().unwrap();
    let trace = &telemetry.recent_traces(1)[0];
    assert_eq!(trace.count(SpanKind::Turn), 1);
    assert_eq!(trace.count(SpanKind::Delegation), 1);
    assert_eq!(trace.count(SpanKind::LlmCall), 3);
    let usage = telemetry.usage_snapshot();
    assert_eq!(usage.requests, 1);
    assert_eq!(usage.delegations, 1);
}

#[tokio::test]
async fn e2e_invalid_arguments_are_corrected_within_the_turn() {
    let dir = tempfile::tempdir().unwrap();
    let config = config("", dir.path());
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_calls(vec![call("c1", "calculator", json!({"expr": "2+2"}))])
            .then_calls(vec![call("c2", "calculator", json!({"expression": "2+2"}))])
            .then_answer("4"),
    );
    let mut session = runtime(&config, &provider).session();

    assert_eq!(session.process("add 2 and 2").await.unwrap(), "4");

    let messages = session.history().messages();
    assert_eq!(messages.len(), 6);
    let first = messages[2].result().unwrap();
    assert_eq!(first.error_detail().unwrap().kind, "invalid_arguments");

    // The model was shown the error before it retried.
    let retry_request = &provider.requests()[1];
    let shown = retry_request.messages.last().unwrap().result().unwrap();
    assert_eq!(shown.call_id, "c1");
    assert!(!shown.is_ok());

    assert!(messages[4].result().unwrap().is_ok());
}

#[tokio::test]
async fn e2e_delegation_beyond_depth_bound_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let toml_str = PERSONAS
        .replace("tools = []", "tools = [\"delegate\"]")
        .replace("user_id = \"alice\"", "user_id = \"alice\"\nmax_delegation_depth = 1");
    let config = config(&toml_str, dir.path());
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_calls(vec![call(
                "d1",
                "delegate",
                json!({"callee": "joke_writer", "task": "write a joke"}),
            )])
            // joke_writer tries to hand the task back.
            .then_calls(vec![call(
                "d2",
                "delegate",
                json!({"callee": "planner", "task": "you do it"}),
            )])
            .then_answer("Fine, a joke.")
            .then_answer("Here it is: a joke."),
    );
    let mut session = runtime(&config, &provider).session();

    session.process("joke please").await.unwrap();

    let requests = provider.requests();
    // No room for a second hop, so joke_writer is not offered `delegate`.
    assert!(requests[1].tools.iter().all(|t| t.name != "delegate"));
    let refused = requests[2].messages.last().unwrap().result().unwrap();
    assert_eq!(refused.call_id, "d2");
    assert_eq!(
        refused.error_detail().unwrap().kind,
        "delegation_depth_exceeded"
    );
    // planner never ran as a callee.
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[3].system_prompt, "You plan. Delegate jokes to joke_writer.");
}

// ── Failure handling across the stack ─────────────────────────────────────

#[tokio::test]
async fn e2e_fatal_turn_error_keeps_session_usable() {
    let dir = tempfile::tempdir().unwrap();
    let config = config("", dir.path());
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_error(ProviderError::Network("connection refused".into()))
            .then_answer("back online"),
    );
    let mut session = runtime(&config, &provider).session();

    let err = session.process("hello?").await.unwrap_err();
    assert!(matches!(err, TurnError::ModelUnavailable(_)));

    assert_eq!(session.process("hello again").await.unwrap(), "back online");
}

#[tokio::test]
async fn e2e_tool_loop_hits_iteration_cap() {
    let dir = tempfile::tempdir().unwrap();
    let config = config("[agent]\nmax_iterations = 2\n", dir.path());
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_calls(vec![call("c1", "calculator", json!({"expression": "1+1"}))])
            .then_calls(vec![call("c2", "calculator", json!({"expression": "2+2"}))])
            .then_answer("never reached"),
    );
    let mut session = runtime(&config, &provider).session();

    let err = session.process("keep going").await.unwrap_err();
    assert!(matches!(err, TurnError::TurnLimitExceeded { .. }));
    assert_eq!(provider.request_count(), 2);
    // Every requested call still got its result.
    assert!(session.history().unanswered_calls().is_empty());
}

#[tokio::test]
async fn e2e_web_search_without_key_is_a_tool_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config("", dir.path());
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_calls(vec![call("c1", "web_search", json!({"query": "rust async"}))])
            .then_answer("Search is unavailable right now."),
    );
    let mut session = runtime(&config, &provider).session();

    let answer = session.process("search for rust async").await.unwrap();
    assert_eq!(answer, "Search is unavailable right now.");
    let result = session.history().messages()[2].result().unwrap();
    assert_eq!(result.error_detail().unwrap().kind, "execution_failed");
    assert!(result.render().contains("TAVILY_API_KEY"));
}

#[tokio::test]
async fn e2e_file_write_lands_in_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let config = config("", dir.path());
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_calls(vec![call(
                "c1",
                "file_write",
                json!({"filename": "notes/cats.md", "content": "# Cats\n"}),
            )])
            .then_answer("Saved."),
    );
    let mut session = runtime(&config, &provider).session();

    session.process("save a note about cats").await.unwrap();

    let written = std::fs::read_to_string(dir.path().join("workspace/notes/cats.md")).unwrap();
    assert_eq!(written, "# Cats\n");
}

#[tokio::test]
async fn e2e_planner_returns_a_plan_over_the_builtins() {
    let dir = tempfile::tempdir().unwrap();
    let config = config("", dir.path());
    let plan = r#"{"plan": [
        {"step": 1, "task": "Find facts", "tool": "web_search", "arguments": {"query": "cats"}},
        {"step": 2, "task": "Save them", "tool": "file_write",
         "arguments": {"filename": "cats.md", "content": "{{result_of_step_1}}"}}
    ]}"#;
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_calls(vec![call("c1", "planner", json!({"goal": "write a note on cats"}))])
            .then_answer(plan)
            .then_answer("I have a two step plan."),
    );
    let mut session = runtime(&config, &provider).session();

    let answer = session.process("plan a note on cats").await.unwrap();

    assert_eq!(answer, "I have a two step plan.");
    let result = session.history().messages()[2].result().unwrap();
    assert!(result.is_ok());
    assert!(result.render().contains("file_write"));
    // The planner's own model call carries no tools.
    assert!(provider.requests()[1].tools.is_empty());
    assert_eq!(provider.request_count(), 3);
}

// ── Memory ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_file_memory_is_recalled_in_later_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let memory_file = dir.path().join("memories.jsonl");
    let toml_str = format!(
        "[agent]\nuser_id = \"alice\"\n[memory]\nbackend = \"file\"\npath = {:?}\n",
        memory_file.display().to_string()
    );
    let config = config(&toml_str, dir.path());

    let first = Arc::new(ScriptedProvider::new().then_answer("Noted, you like green tea."));
    let mut session = runtime(&config, &first).session();
    session.process("my favourite drink is green tea").await.unwrap();

    // The store runs detached; wait for it to reach the disk.
    for _ in 0..100 {
        if std::fs::read_to_string(&memory_file).is_ok_and(|s| s.contains("green tea")) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // A new runtime reloads the file.
    let second = Arc::new(ScriptedProvider::new().then_answer("Green tea."));
    let mut session = runtime(&config, &second).session();
    session.process("what is my favourite drink?").await.unwrap();

    let prompt = &second.requests()[0].system_prompt;
    assert!(prompt.contains("Recalled Memories"));
    assert!(prompt.contains("green tea"));
    // Recall never touches the stored history.
    assert_eq!(session.history().len(), 2);
}

// ── Interactive shell ─────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_shell_commands_drive_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(PERSONAS, dir.path());
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_answer("A plan.")
            .then_answer("A joke."),
    );
    let mut session = runtime(&config, &provider).session();

    for line in ["plan my day", "/persona joke_writer", "tell me one", "reset"] {
        match repl::parse(line) {
            Input::Message(text) => {
                let answer = session.process(&text).await.unwrap();
                let shown = repl::format_answer(session.active_persona(), &answer);
                assert!(shown.starts_with(&format!("[{}]", session.active_persona())));
            }
            Input::SwitchPersona(id) => session.switch_persona(&id).unwrap(),
            Input::Reset => session.reset(),
            other => panic!("unexpected input {other:?}"),
        }
    }

    assert!(session.history().is_empty());
    assert_eq!(session.active_persona(), "joke_writer");
    let requests = provider.requests();
    assert_eq!(requests[1].system_prompt, "You write one short joke.");
    // History survives a persona switch until reset.
    assert_eq!(requests[1].messages.len(), 3);
    assert!(matches!(
        requests[1].messages[0].content,
        MessageContent::Text { .. }
    ));
}

#[test]
fn e2e_missing_prompt_file_fails_runtime_build() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(
        "[[personas]]\nid = \"default\"\nprompt_file = \"personas/missing.md\"\n",
        dir.path(),
    );
    let provider = Arc::new(ScriptedProvider::new());
    assert!(build_runtime(&config, provider).is_err());
}
