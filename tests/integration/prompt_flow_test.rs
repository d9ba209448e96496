//! Prompt Flow Integration Tests
//!
//! A prompt invoked from a tab, resolved, answered by a mock
//! OpenAI-compatible server and delivered to the compose window.

use httpmock::prelude::*;
use mailprompt::{AppError, PromptCommand, PromptOutcome, ReplyType, MAX_PROMPT_CHARS};
use mailprompt_core::{PromptAction, PromptTemplate, PromptType, TabKind, UiError};
use serde_json::json;

use crate::support::{compat_settings, orchestrator, FakeMail};

fn reply_to_selection() -> PromptTemplate {
    PromptTemplate {
        id: "prompt_reply_selection".to_string(),
        name: "Reply to selection".to_string(),
        text: "Reply to: {%selected_text%}".to_string(),
        prompt_type: PromptType::ReadingOnly,
        action: PromptAction::Reply,
        need_selected: true,
        need_signature: false,
        need_custom_text: false,
    }
}

fn command(prompt_id: &str, tab_id: u64) -> PromptCommand {
    PromptCommand {
        prompt_id: prompt_id.to_string(),
        tab_id,
    }
}

// ============================================================================
// End-to-end
// ============================================================================

#[tokio::test]
async fn test_reply_to_selection_end_to_end() {
    let server = MockServer::start();
    let chat = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .json_body(json!({
                "model": "local-model",
                "messages": [{"role": "user", "content": "Reply to: Hello"}],
                "stream": false
            }));
        then.status(200)
            .json_body(json!({"choices": [{"message": {"content": "Hi there"}}]}));
    });

    let mut settings = compat_settings(&server.base_url(), false);
    settings.custom_prompts = vec![reply_to_selection()];
    settings.reply_type = ReplyType::ReplySender;
    let mail = FakeMail {
        selected: "Hello".to_string(),
        body: "Hello, how are you?".to_string(),
        message_id: Some(42),
        ..Default::default()
    };
    let (orch, compose) = orchestrator(settings, mail);

    let outcome = orch
        .run(command("prompt_reply_selection", 3))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        PromptOutcome::Replied {
            text: "Hi there".to_string()
        }
    );
    chat.assert();
    assert_eq!(
        compose.replies.lock().unwrap().as_slice(),
        &[(42, ReplyType::ReplySender, "Hi there".to_string())]
    );
}

#[tokio::test]
async fn test_streamed_tokens_reach_the_caller_in_order() {
    let server = MockServer::start();
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"- one\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"\\n- two\"}}]}\n\n",
        "data: [DONE]\n\n"
    );
    server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .body_contains("\"stream\":true");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(sse);
    });

    let mail = FakeMail {
        body: "A long mail".to_string(),
        ..Default::default()
    };
    let (orch, compose) = orchestrator(compat_settings(&server.base_url(), true), mail);

    let mut tokens = Vec::new();
    let outcome = orch
        .run_streaming(command("prompt_summarize_this", 1), |token| {
            tokens.push(token.to_string())
        })
        .await
        .unwrap();

    assert_eq!(tokens, vec!["- one".to_string(), "\n- two".to_string()]);
    assert_eq!(
        outcome,
        PromptOutcome::Shown {
            text: "- one\n- two".to_string()
        }
    );
    assert!(compose.replies.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_window_is_reused_across_prompts() {
    let server = MockServer::start();
    let chat = server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200)
            .json_body(json!({"choices": [{"message": {"content": "ok"}}]}));
    });

    let mail = FakeMail {
        kind: Some(TabKind::Composing),
        selected: "hey".to_string(),
        body: "hey you".to_string(),
        ..Default::default()
    };
    let (orch, compose) = orchestrator(compat_settings(&server.base_url(), false), mail);

    orch.run(command("prompt_rewrite_polite", 9)).await.unwrap();
    orch.run(command("prompt_rewrite_formal", 9)).await.unwrap();

    chat.assert_hits(2);
    assert_eq!(compose.replaced.lock().unwrap().len(), 2);
}

// ============================================================================
// Rejected before dispatch
// ============================================================================

#[tokio::test]
async fn test_too_long_prompt_makes_no_call() {
    let server = MockServer::start();
    let chat = server.mock(|when, then| {
        when.method(POST);
        then.status(200);
    });

    let mail = FakeMail {
        body: "x".repeat(MAX_PROMPT_CHARS),
        ..Default::default()
    };
    let (orch, _) = orchestrator(compat_settings(&server.base_url(), false), mail);

    let err = orch
        .run(command("prompt_summarize_this", 1))
        .await
        .unwrap_err();

    match err {
        AppError::Ui(UiError::PromptTooLong { length, max }) => {
            assert!(length > MAX_PROMPT_CHARS);
            assert_eq!(max, MAX_PROMPT_CHARS);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    chat.assert_hits(0);
}

#[tokio::test]
async fn test_prompt_at_the_limit_is_sent() {
    let server = MockServer::start();
    let chat = server.mock(|when, then| {
        when.method(POST);
        then.status(200)
            .json_body(json!({"choices": [{"message": {"content": "fine"}}]}));
    });

    let mut template = reply_to_selection();
    template.text = "{%selected_text%}".to_string();
    template.action = PromptAction::Close;
    let mut settings = compat_settings(&server.base_url(), false);
    settings.custom_prompts = vec![template];

    // Multi-byte characters count once each
    let mail = FakeMail {
        selected: "é".repeat(MAX_PROMPT_CHARS),
        ..Default::default()
    };
    let (orch, _) = orchestrator(settings, mail);

    let outcome = orch
        .run(command("prompt_reply_selection", 1))
        .await
        .unwrap();
    assert!(matches!(outcome, PromptOutcome::Shown { .. }));
    chat.assert_hits(1);
}

#[tokio::test]
async fn test_missing_selection_makes_no_call() {
    let server = MockServer::start();
    let chat = server.mock(|when, then| {
        when.method(POST);
        then.status(200);
    });

    let mut settings = compat_settings(&server.base_url(), false);
    settings.custom_prompts = vec![reply_to_selection()];
    let mail = FakeMail {
        body: "Hello".to_string(),
        message_id: Some(1),
        ..Default::default()
    };
    let (orch, compose) = orchestrator(settings, mail);

    let err = orch
        .run(command("prompt_reply_selection", 1))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Ui(UiError::NoSelection)));
    chat.assert_hits(0);
    assert!(compose.replies.lock().unwrap().is_empty());
}

// ============================================================================
// Provider failures
// ============================================================================

#[tokio::test]
async fn test_api_error_is_surfaced_with_body() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(503).body("model is loading");
    });

    let mail = FakeMail {
        body: "Hi".to_string(),
        ..Default::default()
    };
    let (orch, _) = orchestrator(compat_settings(&server.base_url(), false), mail);

    let err = orch.run(command("prompt_classify", 1)).await.unwrap_err();
    match err {
        AppError::Prompt {
            message,
            category,
            retryable,
        } => {
            assert_eq!(category, "api");
            assert!(!retryable);
            assert!(message.contains("HTTP 503: model is loading"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_server_is_retryable() {
    // Nothing listens on the discard port
    let mail = FakeMail {
        body: "Hi".to_string(),
        ..Default::default()
    };
    let (orch, _) = orchestrator(compat_settings("http://127.0.0.1:9", false), mail);

    let err = orch.run(command("prompt_classify", 1)).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Prompt {
            retryable: true,
            ..
        }
    ));
}
