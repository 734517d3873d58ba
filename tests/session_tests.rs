mod common;

use std::sync::Arc;

use futures::StreamExt;
use pretty_assertions::assert_eq;

use common::{calc_tool, collect, screenshot, FixedProbe, Script, ScriptedAdapter};
use glimpse::config::{EngineSettings, GlimpseConfig};
use glimpse::context::ScreenshotMode;
use glimpse::error::GlimpseError;
use glimpse::session::{Session, SessionManager, TurnEvent, TurnInput};
use glimpse::tools::ToolRegistry;
use glimpse::types::{MessageStatus, Role, Usage};

fn settings() -> EngineSettings {
    EngineSettings {
        min_request_interval_ms: 0,
        ..Default::default()
    }
}

fn new_session(adapter: &ScriptedAdapter) -> Session {
    Session::with_adapter("s1", adapter.boxed(), settings(), ToolRegistry::new())
}

#[tokio::test]
async fn hello_streams_fragments_in_order() {
    let adapter = ScriptedAdapter::new();
    adapter.reply(&["Hi", " there"]);
    let mut session = new_session(&adapter);

    let (text, summary) = collect(session.submit_turn("hello")).await;
    let summary = summary.expect("turn must end with a summary");

    assert_eq!(text, vec!["Hi".to_string(), " there".to_string()]);
    assert_eq!(summary.status, MessageStatus::Complete);
    assert_eq!(summary.message.text(), "Hi there");
    assert_eq!(summary.usage, Usage::new(10, 5));
    assert_eq!(summary.rounds, 1);

    let history = session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].text(), "hello");
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].text(), "Hi there");
    assert_eq!(history[1].status, MessageStatus::Complete);
}

#[tokio::test]
async fn tool_call_runs_once_and_continues() {
    let adapter = ScriptedAdapter::new();
    adapter
        .tool_call("calc", r#"{"expr":"2+2"}"#)
        .reply(&["2+2 is ", "4."]);
    let tools = ToolRegistry::new().with(calc_tool()).unwrap();
    let mut session = Session::with_adapter("s1", adapter.boxed(), settings(), tools);

    let (text, summary) = collect(session.submit_turn("what's 2+2")).await;
    let summary = summary.unwrap();
    assert_eq!(text.concat(), "2+2 is 4.");
    assert!(summary.is_complete());
    assert_eq!(summary.rounds, 2);
    assert_eq!(summary.usage, Usage::new(18, 8));

    let requests = adapter.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 1);
    assert!(requests[0].follow_up.is_empty());

    let follow_up = &requests[1].follow_up;
    assert_eq!(follow_up.len(), 2);
    let call = &follow_up[0].tool_calls[0];
    assert_eq!(call.name, "calc");
    assert_eq!(call.arguments, serde_json::json!({"expr": "2+2"}));
    let result = follow_up[1].tool_result.as_ref().unwrap();
    assert_eq!(follow_up[1].role, Role::Tool);
    assert_eq!(result.tool_call_id, call.id);
    assert_eq!(result.content, "4");
    assert!(!result.is_error);

    let roles: Vec<Role> = session.history().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
}

#[tokio::test]
async fn calls_from_the_last_round_are_reported_not_run() {
    let adapter = ScriptedAdapter::new();
    adapter
        .tool_call("calc", r#"{"expr":"1+1"}"#)
        .tool_call("calc", r#"{"expr":"2+2"}"#)
        .reply(&["unused"]);
    let tools = ToolRegistry::new().with(calc_tool()).unwrap();
    let mut session = Session::with_adapter("s1", adapter.boxed(), settings(), tools);

    let (_, summary) = collect(session.submit_turn("loop forever")).await;
    let summary = summary.unwrap();

    assert_eq!(adapter.requests().len(), 2);
    assert_eq!(adapter.remaining(), 1);
    assert!(summary.is_complete());
    assert_eq!(summary.pending_tool_calls.len(), 1);
    assert_eq!(summary.pending_tool_calls[0].arguments, serde_json::json!({"expr": "2+2"}));
    assert!(summary.message.tool_calls.is_empty());

    let tool_results = session
        .history()
        .iter()
        .filter(|m| m.role == Role::Tool)
        .count();
    assert_eq!(tool_results, 1);
}

#[tokio::test]
async fn unknown_tool_becomes_an_error_result() {
    let adapter = ScriptedAdapter::new();
    adapter.tool_call("weather", r#"{"city": "Oslo"}"#).reply(&["Sorry."]);
    let mut session = new_session(&adapter);

    let (_, summary) = collect(session.submit_turn("weather?")).await;
    assert!(summary.unwrap().is_complete());

    let result = adapter.requests()[1].follow_up[1].tool_result.clone().unwrap();
    assert!(result.is_error);
    assert_eq!(result.content, "Error: unknown tool 'weather'");
}

#[tokio::test]
async fn first_turn_image_follows_probe_verdict() {
    for (probe, attached) in [(FixedProbe::yes(), true), (FixedProbe::no(), false)] {
        let adapter = ScriptedAdapter::new();
        adapter.reply(&["ok"]).reply(&["ok"]).reply(&["ok"]);
        let mut session = new_session(&adapter).with_probe(Arc::new(probe.clone()));

        let input = TurnInput::new("fix this bug").with_image(screenshot());
        collect(session.submit_turn(input)).await;
        assert_eq!(adapter.requests()[0].context.image.is_some(), attached);
        assert_eq!(probe.queries(), vec!["fix this bug".to_string()]);

        // A discarded image is not carried forward.
        collect(session.submit_turn("still there?")).await;
        assert!(adapter.requests()[1].context.image.is_none());
        assert!(adapter.requests()[1].history.iter().all(|m| m.image.is_none()));

        // Later turns attach an explicitly supplied image without asking.
        let input = TurnInput::new("and now?").with_image(screenshot());
        collect(session.submit_turn(input)).await;
        assert!(adapter.requests()[2].context.image.is_some());
        assert!(adapter.requests()[2].history.iter().all(|m| m.image.is_none()));
        assert_eq!(probe.queries().len(), 1);

        // The transcript records what was actually sent with each turn.
        let history = session.history();
        assert_eq!(history[0].image.is_some(), attached);
        assert!(history[2].image.is_none());
        assert!(history[4].image.is_some());
        assert!(history.iter().filter(|m| m.role != Role::User).all(|m| m.image.is_none()));
    }
}

#[tokio::test]
async fn probe_failure_sends_no_image() {
    let adapter = ScriptedAdapter::new();
    adapter.reply(&["ok"]);
    let mut session = new_session(&adapter).with_probe(Arc::new(FixedProbe::broken()));

    let input = TurnInput::new("explain").with_image(screenshot());
    let (_, summary) = collect(session.submit_turn(input)).await;
    assert!(summary.unwrap().is_complete());
    assert!(adapter.requests()[0].context.image.is_none());
}

#[tokio::test]
async fn first_turn_flag_flips_without_an_image() {
    let adapter = ScriptedAdapter::new();
    adapter.reply(&["a"]).reply(&["b"]);
    let probe = FixedProbe::no();
    let mut session = new_session(&adapter).with_probe(Arc::new(probe.clone()));

    collect(session.submit_turn("plain question")).await;
    let input = TurnInput::new("look at this").with_image(screenshot());
    collect(session.submit_turn(input)).await;

    assert!(probe.queries().is_empty());
    assert!(adapter.requests()[1].context.image.is_some());
}

#[tokio::test]
async fn never_mode_and_blind_models_drop_the_image() {
    let adapter = ScriptedAdapter::new();
    adapter.reply(&["a"]);
    let never = EngineSettings {
        screenshot_mode: ScreenshotMode::Never,
        ..settings()
    };
    let mut session = Session::with_adapter("s1", adapter.boxed(), never, ToolRegistry::new());
    collect(session.submit_turn(TurnInput::new("q").with_image(screenshot()))).await;
    assert!(adapter.requests()[0].context.image.is_none());

    let blind = ScriptedAdapter::new().without_vision();
    blind.reply(&["a"]).reply(&["b"]);
    let mut session = new_session(&blind).with_probe(Arc::new(FixedProbe::yes()));
    collect(session.submit_turn("first")).await;
    collect(session.submit_turn(TurnInput::new("q").with_image(screenshot()))).await;
    assert!(blind.requests()[1].context.image.is_none());
}

#[tokio::test]
async fn selection_and_search_results_reach_the_adapter() {
    let adapter = ScriptedAdapter::new();
    adapter.reply(&["ok"]);
    let mut session = new_session(&adapter);

    let input = TurnInput::new("summarize")
        .with_selection("fn main() {}")
        .with_search_results(vec![glimpse::types::SearchSnippet {
            title: "Rust".into(),
            content: "A language empowering everyone".into(),
            url: "https://www.rust-lang.org".into(),
            relevance: 0.9,
        }]);
    collect(session.submit_turn(input)).await;

    let context = &adapter.requests()[0].context;
    assert_eq!(context.selection.as_deref(), Some("fn main() {}"));
    assert_eq!(context.search_results.len(), 1);
    assert_eq!(session.history()[0].text(), "summarize");
}

#[tokio::test]
async fn provider_error_is_committed_but_never_replayed() {
    let adapter = ScriptedAdapter::new();
    adapter
        .push(Script::Fail(GlimpseError::Authentication("invalid x-api-key".into())))
        .reply(&["fine"]);
    let mut session = new_session(&adapter);

    let (text, summary) = collect(session.submit_turn("first")).await;
    let summary = summary.unwrap();
    assert!(text.is_empty());
    assert_eq!(summary.status, MessageStatus::Error);
    assert!(summary.message.text().contains("Authentication failed"));
    assert_eq!(session.history().len(), 2);
    assert_eq!(session.history()[1].status, MessageStatus::Error);

    collect(session.submit_turn("second")).await;
    let replayed = &adapter.requests()[1].history;
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].text(), "first");
}

#[tokio::test]
async fn mid_stream_failure_keeps_history_consistent() {
    let adapter = ScriptedAdapter::new();
    adapter.push(Script::Events(vec![
        Ok(glimpse::types::DeltaEvent::Usage(Usage { prompt_tokens: 12, ..Default::default() })),
        Ok(glimpse::types::DeltaEvent::text("partial")),
        Err(GlimpseError::Stream("connection reset".into())),
    ]));
    let mut session = new_session(&adapter);

    let (text, summary) = collect(session.submit_turn("hi")).await;
    assert_eq!(text, vec!["partial".to_string()]);
    let summary = summary.unwrap();
    assert_eq!(summary.status, MessageStatus::Error);
    assert_eq!(summary.usage, Usage::new(12, 0));

    let history = session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].status, MessageStatus::Error);
    assert_eq!(history[1].usage, Some(Usage::new(12, 0)));
}

#[tokio::test]
async fn stream_without_finish_is_an_error() {
    let adapter = ScriptedAdapter::new();
    adapter.push(Script::Events(vec![Ok(glimpse::types::DeltaEvent::text("cut"))]));
    let mut session = new_session(&adapter);

    let (_, summary) = collect(session.submit_turn("hi")).await;
    assert_eq!(summary.unwrap().status, MessageStatus::Error);
}

#[tokio::test]
async fn dropping_the_stream_leaves_history_untouched() {
    let adapter = ScriptedAdapter::new();
    adapter.push(Script::Hang(vec![glimpse::types::DeltaEvent::text("Hel")]));
    adapter.reply(&["Hello"]);
    let probe = FixedProbe::no();
    let mut session = new_session(&adapter).with_probe(Arc::new(probe.clone()));

    {
        let mut events = session.submit_turn(TurnInput::new("hi").with_image(screenshot()));
        match events.next().await {
            Some(TurnEvent::Text(t)) => assert_eq!(t, "Hel"),
            other => panic!("expected text, got {other:?}"),
        }
    }
    assert!(session.history().is_empty());

    // The first turn never completed, so the next one is still "first".
    collect(session.submit_turn(TurnInput::new("hi").with_image(screenshot()))).await;
    assert_eq!(probe.queries().len(), 2);
    assert_eq!(session.history().len(), 2);
}

#[tokio::test]
async fn oversized_turn_fails_without_a_request() {
    let adapter = ScriptedAdapter::new();
    let tight = EngineSettings {
        token_ceiling: Some(20),
        ..settings()
    };
    let mut session = Session::with_adapter("s1", adapter.boxed(), tight, ToolRegistry::new());

    let (_, summary) = collect(session.submit_turn("word ".repeat(100))).await;
    let summary = summary.unwrap();
    assert_eq!(summary.status, MessageStatus::Error);
    assert!(summary.message.text().contains("too long"));
    assert!(adapter.requests().is_empty());
}

#[tokio::test]
async fn old_turns_are_dropped_to_fit_the_ceiling() {
    let adapter = ScriptedAdapter::new();
    adapter.reply(&["ok"]).reply(&["ok"]).reply(&["ok"]);
    let tight = EngineSettings {
        token_ceiling: Some(60),
        ..settings()
    };
    let mut session = Session::with_adapter("s1", adapter.boxed(), tight, ToolRegistry::new());

    let turns = ["a".repeat(80), "b".repeat(80), "c".repeat(80)];
    for turn in &turns {
        let (_, summary) = collect(session.submit_turn(turn.as_str())).await;
        assert!(summary.unwrap().is_complete());
    }

    let third = &adapter.requests()[2];
    assert!(third.history.iter().all(|m| m.text() != turns[0]));
    assert!(third.history.iter().any(|m| m.text() == turns[1]));
    // Full transcript is kept locally.
    assert_eq!(session.history().len(), 6);
}

#[tokio::test]
async fn tools_are_frozen_after_the_first_turn() {
    let adapter = ScriptedAdapter::new();
    adapter.reply(&["ok"]);
    let mut session = new_session(&adapter);
    session.register_tool(Arc::new(calc_tool())).unwrap();

    let duplicate = session.register_tool(Arc::new(calc_tool()));
    assert!(matches!(duplicate, Err(GlimpseError::InvalidArgument(_))));

    collect(session.submit_turn("hi")).await;
    let late = session.register_tool(Arc::new(calc_tool()));
    assert!(matches!(late, Err(GlimpseError::InvalidState(_))));
}

#[tokio::test]
async fn switching_models_keeps_the_transcript() {
    let first = ScriptedAdapter::new();
    first.reply(&["from first"]);
    let mut session = new_session(&first);
    collect(session.submit_turn("one")).await;

    let second = ScriptedAdapter::new();
    second.reply(&["from second"]);
    session.replace_adapter(second.boxed());
    collect(session.submit_turn("two")).await;

    assert_eq!(first.requests().len(), 1);
    let second_requests = second.requests();
    let replayed: Vec<&str> = second_requests[0].history.iter().map(|m| m.text()).collect();
    assert_eq!(replayed, vec!["one", "from first"]);
}

#[tokio::test]
async fn manager_rejects_a_second_turn_while_busy() {
    let adapter = ScriptedAdapter::new();
    adapter.push(Script::Hang(vec![glimpse::types::DeltaEvent::text("...")]));
    adapter.reply(&["done"]);

    let manager = SessionManager::new(GlimpseConfig::new());
    manager.insert(new_session(&adapter));

    let mut busy = manager.submit_turn("s1", "first").unwrap();
    assert!(matches!(busy.next().await, Some(TurnEvent::Text(_))));

    let err = manager.submit_turn("s1", "second").err().unwrap();
    assert!(matches!(err, GlimpseError::SessionBusy(id) if id == "s1"));

    drop(busy);
    let (text, summary) = collect(manager.submit_turn("s1", "second").unwrap()).await;
    assert_eq!(text.concat(), "done");
    assert!(summary.unwrap().is_complete());
}

#[tokio::test]
async fn model_probe_asks_a_text_only_question() {
    use glimpse::context::{ModelProbe, ScreenshotProbe};

    let adapter = ScriptedAdapter::new();
    adapter.reply(&["Yes", "."]).reply(&["No, the text is enough."]);
    let probe = ModelProbe::default();

    assert!(probe.image_needed("what is on my screen?", &adapter).await.unwrap());
    assert!(!probe.image_needed("what is 2+2?", &adapter).await.unwrap());

    let requests = adapter.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.context.image.is_none() && r.tools.is_empty()));
    assert!(requests[0].current.text().contains("what is on my screen?"));
    assert!(requests[0].system_prompt.is_some());
}

#[tokio::test]
async fn default_probe_runs_through_the_session_adapter() {
    let adapter = ScriptedAdapter::new();
    adapter.reply(&["Yes."]).reply(&["I see a stack trace."]);
    let mut session = new_session(&adapter);

    let input = TurnInput::new("explain this error").with_image(screenshot());
    let (text, summary) = collect(session.submit_turn(input)).await;
    assert!(summary.unwrap().is_complete());
    assert_eq!(text.concat(), "I see a stack trace.");

    let requests = adapter.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].context.image.is_none());
    assert!(requests[1].context.image.is_some());
    assert_eq!(requests[1].current.text(), "explain this error");
}
