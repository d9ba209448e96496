//! Worker Protocol Integration Tests
//!
//! Drives chat workers through their channels against mock provider servers
//! and checks the event sequence a chat window sees.

use std::time::Duration;

use httpmock::prelude::*;
use mailprompt::services::windows::ChatWindows;
use mailprompt::services::worker::{
    ChatWorker, ErrorStrings, PromptInvocation, WorkerCommand, WorkerEvent,
};
use mailprompt_core::PromptAction;
use mailprompt_llm::{ProviderConfig, ProviderFactory};
use serde_json::json;
use tokio::sync::mpsc;

fn compat(host: &str, stream: bool) -> ProviderConfig {
    ProviderConfig::OpenaiCompatibleApi {
        host: host.to_string(),
        model: "local-model".to_string(),
        api_key: String::new(),
        use_v1: true,
        stream,
        chat_name: "Local".to_string(),
    }
}

async fn until_terminal(events: &mut mpsc::Receiver<WorkerEvent>) -> Vec<WorkerEvent> {
    let mut out = Vec::new();
    while let Some(event) = events.recv().await {
        let terminal = event.is_terminal();
        out.push(event);
        if terminal {
            break;
        }
    }
    out
}

/// messageSent, then tokens, then exactly one terminal event.
fn assert_well_formed(events: &[WorkerEvent]) {
    assert!(matches!(events.first(), Some(WorkerEvent::MessageSent { .. })));
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1);
    assert!(events.last().map(WorkerEvent::is_terminal).unwrap_or(false));
    for event in &events[1..events.len() - 1] {
        assert!(matches!(event, WorkerEvent::NewToken { .. }));
    }
}

#[tokio::test]
async fn test_streaming_sequence_from_sse() {
    let server = MockServer::start();
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n"
    );
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(sse);
    });

    let mut handle = ChatWorker::spawn(ProviderFactory::new());
    handle
        .commands
        .send(WorkerCommand::Init {
            config: compat(&server.base_url(), true),
            i18n_strings: ErrorStrings::default(),
            max_tokens: 0,
        })
        .await
        .unwrap();
    handle
        .commands
        .send(WorkerCommand::Prompt(PromptInvocation::new(
            "Hello",
            PromptAction::Close,
            1,
        )))
        .await
        .unwrap();

    let events = until_terminal(&mut handle.events).await;
    assert_well_formed(&events);

    let tokens: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            WorkerEvent::NewToken { token, .. } => Some(token.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(tokens, vec!["Hi", " there"]);
    assert!(matches!(events.last(), Some(WorkerEvent::TokensDone(d)) if d.text == "Hi there"));
}

#[tokio::test]
async fn test_error_sequence_and_localized_message() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(401).body("invalid key");
    });

    let mut handle = ChatWorker::spawn(ProviderFactory::new());
    handle
        .commands
        .send(WorkerCommand::Init {
            config: compat(&server.base_url(), false),
            i18n_strings: ErrorStrings {
                request_failed: "Richiesta fallita".to_string(),
                connection_interrupted: "Connessione interrotta".to_string(),
            },
            max_tokens: 0,
        })
        .await
        .unwrap();
    handle
        .commands
        .send(WorkerCommand::Prompt(PromptInvocation::new(
            "Hello",
            PromptAction::Close,
            1,
        )))
        .await
        .unwrap();

    let events = until_terminal(&mut handle.events).await;
    assert_well_formed(&events);
    match events.last() {
        Some(WorkerEvent::Error(payload)) => {
            assert_eq!(payload.message, "Richiesta fallita: HTTP 401: invalid key");
            assert_eq!(payload.category, "api");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_events_serialize_as_type_and_payload() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200)
            .json_body(json!({"choices": [{"message": {"content": "Done"}}]}));
    });

    let mut handle = ChatWorker::spawn(ProviderFactory::new());
    let init = json!({
        "type": "init",
        "payload": {
            "config": {
                "kind": "openai_compatible_api",
                "host": server.base_url(),
                "model": "local-model",
                "use_v1": true
            },
            "i18nStrings": {
                "requestFailed": "failed",
                "connectionInterrupted": "interrupted"
            },
            "maxTokens": 0
        }
    });
    let init: WorkerCommand = serde_json::from_value(init).unwrap();
    handle.commands.send(init).await.unwrap();
    handle
        .commands
        .send(WorkerCommand::Prompt(
            PromptInvocation::new("Hello", PromptAction::Reply, 4).with_message_id(Some(11)),
        ))
        .await
        .unwrap();

    let events = until_terminal(&mut handle.events).await;
    let json: Vec<serde_json::Value> = events
        .iter()
        .map(|e| serde_json::to_value(e).unwrap())
        .collect();

    assert_eq!(json[0]["type"], "messageSent");
    assert_eq!(json[1]["type"], "tokensDone");
    assert_eq!(json[1]["payload"]["text"], "Done");
    assert_eq!(json[1]["payload"]["action"], 1);
    assert_eq!(json[1]["payload"]["tabId"], 4);
    assert_eq!(json[1]["payload"]["messageId"], 11);
}

#[tokio::test]
async fn test_windows_do_not_block_each_other() {
    let slow = MockServer::start();
    slow.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200)
            .delay(Duration::from_millis(1000))
            .json_body(json!({"choices": [{"message": {"content": "slow"}}]}));
    });
    let fast = MockServer::start();
    fast.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200)
            .json_body(json!({"choices": [{"message": {"content": "fast"}}]}));
    });

    let windows = ChatWindows::new(ProviderFactory::new());
    let strings = ErrorStrings::default();
    let slow_window = windows
        .open(&compat(&slow.base_url(), false), &strings, 0)
        .await
        .unwrap();
    let fast_window = windows
        .open(
            &ProviderConfig::ChatgptApi {
                api_key: "sk-test".to_string(),
                model: "gpt-4o-mini".to_string(),
                stream: false,
                base_url: Some(fast.base_url()),
            },
            &strings,
            0,
        )
        .await
        .unwrap();

    let slow_run = slow_window.run_prompt(
        PromptInvocation::new("A", PromptAction::Close, 1),
        |_| {},
    );
    let fast_run = async {
        let data = fast_window
            .run_prompt(PromptInvocation::new("B", PromptAction::Close, 2), |_| {})
            .await
            .unwrap();
        (data, std::time::Instant::now())
    };

    let started = std::time::Instant::now();
    let (slow_result, (fast_data, fast_done)) = tokio::join!(slow_run, fast_run);

    assert_eq!(slow_result.unwrap().text, "slow");
    assert_eq!(fast_data.text, "fast");
    assert!(fast_done.duration_since(started) < Duration::from_millis(1000));
}
