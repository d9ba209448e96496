//! Settings Integration Tests
//!
//! A settings file on disk driving the orchestrator.

use httpmock::prelude::*;
use mailprompt::{ConfigService, PromptCommand, PromptOutcome, SettingsUpdate};
use serde_json::json;

use crate::support::{orchestrator, FakeMail};

fn no_authorization(req: &HttpMockRequest) -> bool {
    req.headers
        .as_ref()
        .map_or(true, |headers| {
            !headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("authorization"))
        })
}

#[tokio::test]
async fn test_settings_file_selects_provider_and_max_tokens() {
    let server = MockServer::start();
    let unlimited = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .matches(no_authorization)
            .json_body(json!({
                "model": "qwen",
                "messages": [{"role": "user", "content": "Summarize the following email into a bullet point list. \"Lunch?\""}],
                "stream": false
            }));
        then.status(200)
            .json_body(json!({"choices": [{"message": {"content": "- lunch"}}]}));
    });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        json!({
            "connection_type": "openai_comp_api",
            "openai_comp_host": server.base_url(),
            "openai_comp_model": "qwen",
            "openai_comp_use_v1": false,
            "streaming": false
        })
        .to_string(),
    )
    .unwrap();

    let mut config = ConfigService::open(&path).unwrap();
    let mail = FakeMail {
        body: "Lunch?".to_string(),
        ..Default::default()
    };
    let (mut orch, _) = orchestrator(config.get_config_clone(), mail);

    let command = PromptCommand {
        prompt_id: "prompt_summarize_this".to_string(),
        tab_id: 1,
    };
    let outcome = orch.run(command.clone()).await.unwrap();
    assert_eq!(
        outcome,
        PromptOutcome::Shown {
            text: "- lunch".to_string()
        }
    );
    unlimited.assert();

    let limited = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .json_body_partial(r#"{"max_tokens": 500}"#);
        then.status(200)
            .json_body(json!({"choices": [{"message": {"content": "- short"}}]}));
    });

    let updated = config
        .update_config(SettingsUpdate {
            max_tokens: Some(500),
            ..Default::default()
        })
        .unwrap();
    orch.set_settings(updated);

    let outcome = orch.run(command).await.unwrap();
    assert_eq!(
        outcome,
        PromptOutcome::Shown {
            text: "- short".to_string()
        }
    );
    limited.assert();
}

#[tokio::test]
async fn test_blank_model_never_reaches_the_network() {
    let server = MockServer::start();
    let chat = server.mock(|when, then| {
        when.method(POST);
        then.status(200);
    });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let mut config = ConfigService::open(&path).unwrap();
    let settings = config
        .update_config(SettingsUpdate {
            connection_type: Some("openai_comp_api".to_string()),
            openai_comp_host: Some(server.base_url()),
            openai_comp_model: Some("   ".to_string()),
            ..Default::default()
        })
        .unwrap();

    let mail = FakeMail {
        body: "Hi".to_string(),
        ..Default::default()
    };
    let (orch, _) = orchestrator(settings, mail);
    let err = orch
        .run(PromptCommand {
            prompt_id: "prompt_classify".to_string(),
            tab_id: 1,
        })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Invalid configuration: Model is empty");
    chat.assert_hits(0);
}
