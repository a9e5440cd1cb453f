use std::time::Duration;

use paraphrase_harness::gateway::chat::{ChatCompletionProvider, ChatConfig, ChatDialect};
use paraphrase_harness::gateway::{
    GenerationOptions, ParaphraseProvider, ParaphraseRequest, ProviderErrorKind, StyleHints,
};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(
    server: &MockServer,
    dialect: ChatDialect,
    key: Option<&str>,
) -> ChatCompletionProvider {
    ChatCompletionProvider::new(
        ChatConfig::new("chat", dialect, key.map(str::to_string))
            .base_url(server.uri())
            .timeout(Duration::from_secs(5)),
    )
    .unwrap()
}

fn request(opts: GenerationOptions) -> ParaphraseRequest {
    ParaphraseRequest::new("The results were good.", opts).unwrap()
}

#[tokio::test]
async fn openai_returns_one_candidate_per_choice() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [
                { "message": { "content": "Honestly, the results were great." }, "finish_reason": "stop" },
                { "message": { "content": "  " }, "finish_reason": "stop" },
                { "message": { "content": "It turned out well." }, "finish_reason": "length" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let opts = GenerationOptions::default()
        .candidates(3)
        .temperature(0.4)
        .max_length(64)
        .styles(StyleHints::new(["casual"]));
    let out = provider(&server, ChatDialect::OpenAi, Some("sk-test"))
        .generate(&request(opts))
        .await
        .unwrap();

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].text, "Honestly, the results were great.");
    assert!(out[0].partial_error.is_none());
    assert_eq!(out[1].text, "It turned out well.");
    assert!(out[1].partial_error.is_some());

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "gpt-3.5-turbo");
    assert_eq!(body["n"], 3);
    assert_eq!(body["max_tokens"], 64);
    assert_eq!(body["messages"][0]["role"], "system");
    assert!(body["messages"][0]["content"]
        .as_str()
        .unwrap()
        .contains("casual"));
    assert!(body["messages"][1]["content"]
        .as_str()
        .unwrap()
        .contains("The results were good."));
}

#[tokio::test]
async fn openai_single_candidate_omits_n() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "Fine." }, "finish_reason": "stop" }]
        })))
        .mount(&server)
        .await;

    provider(&server, ChatDialect::OpenAi, Some("sk-test"))
        .generate(&request(GenerationOptions::default()))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("n").is_none());
}

#[tokio::test]
async fn anthropic_uses_messages_endpoint_and_headers() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "ak-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                { "type": "thinking", "text": "ignored" },
                { "type": "text", "text": "The results? Pretty good, in fact." }
            ],
            "stop_reason": "end_turn"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let out = provider(&server, ChatDialect::Anthropic, Some("ak-test"))
        .generate(&request(GenerationOptions::default().candidates(4)))
        .await
        .unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].text, "The results? Pretty good, in fact.");
    assert_eq!(out[0].provider, "chat");

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body["system"].as_str().is_some());
    assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn anthropic_max_tokens_marks_partial() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "The results were" }],
            "stop_reason": "max_tokens"
        })))
        .mount(&server)
        .await;

    let out = provider(&server, ChatDialect::Anthropic, Some("ak-test"))
        .generate(&request(GenerationOptions::default()))
        .await
        .unwrap();
    assert!(out[0]
        .partial_error
        .as_deref()
        .unwrap()
        .contains("truncated"));
}

#[tokio::test]
async fn refusal_is_a_generation_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "I can't help with that." }, "finish_reason": "stop" }]
        })))
        .mount(&server)
        .await;

    let err = provider(&server, ChatDialect::OpenAi, Some("sk-test"))
        .generate(&request(GenerationOptions::default()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::GenerationFailed);
    assert!(err.message.contains("refused"));
}

#[tokio::test]
async fn api_error_in_success_body_is_generation_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": { "message": "model overloaded", "type": "server_error" }
        })))
        .mount(&server)
        .await;

    let err = provider(&server, ChatDialect::OpenAi, Some("sk-test"))
        .generate(&request(GenerationOptions::default()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::GenerationFailed);
    assert!(err.message.contains("model overloaded"));
}

#[tokio::test]
async fn rate_limit_is_transport_and_unauthorized_is_authentication() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header("authorization", "Bearer sk-limited"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "slow down", "type": "rate_limit_error" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer sk-revoked"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = provider(&server, ChatDialect::OpenAi, Some("sk-limited"))
        .generate(&request(GenerationOptions::default()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::TransportFailed);
    assert_eq!(err.context.as_ref().and_then(|c| c.http_status), Some(429));

    let err = provider(&server, ChatDialect::OpenAi, Some("sk-revoked"))
        .generate(&request(GenerationOptions::default()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::AuthenticationFailed);
}

#[tokio::test]
async fn missing_credential_fails_without_a_request() {
    let server = MockServer::start().await;

    for dialect in [ChatDialect::OpenAi, ChatDialect::Anthropic] {
        let err = provider(&server, dialect, None)
            .generate(&request(GenerationOptions::default()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::AuthenticationFailed);
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_body_is_unexpected_shape() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = provider(&server, ChatDialect::OpenAi, Some("sk-test"))
        .generate(&request(GenerationOptions::default()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::UnexpectedResponseShape);
}
