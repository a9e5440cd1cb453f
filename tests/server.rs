use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use paraphrase_harness::gateway::{
    GenerationOptions, ParaphraseCandidate, ParaphraseProvider, ParaphraseRequest, ProviderError,
};
use paraphrase_harness::selector::Ensemble;
use paraphrase_harness::server::{self, AppState, BANNER};
use serde_json::{json, Value};

/// Echoes the request's options back as candidate text.
struct EchoProvider;

#[async_trait]
impl ParaphraseProvider for EchoProvider {
    fn id(&self) -> &str {
        "echo"
    }

    fn backend(&self) -> &'static str {
        "fake"
    }

    async fn generate(
        &self,
        req: &ParaphraseRequest,
    ) -> Result<Vec<ParaphraseCandidate>, ProviderError> {
        let opts = req.options();
        let styles: Vec<&str> = opts.styles.iter().collect();
        Ok((0..opts.candidates)
            .map(|i| {
                ParaphraseCandidate::new(
                    "echo",
                    format!(
                        "Rewritten {i}: {}. Styles {}.",
                        req.text().trim(),
                        styles.join(" ")
                    ),
                )
            })
            .collect())
    }
}

struct BrokenProvider;

#[async_trait]
impl ParaphraseProvider for BrokenProvider {
    fn id(&self) -> &str {
        "broken"
    }

    fn backend(&self) -> &'static str {
        "fake"
    }

    async fn generate(
        &self,
        _req: &ParaphraseRequest,
    ) -> Result<Vec<ParaphraseCandidate>, ProviderError> {
        Err(ProviderError::authentication("broken", "API key not set"))
    }
}

async fn spawn(provider: Arc<dyn ParaphraseProvider>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState {
        ensemble: Ensemble::new(vec![provider]),
        defaults: GenerationOptions::default(),
    };
    tokio::spawn(async move {
        server::serve(listener, state).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn index_reports_liveness() {
    let addr = spawn(Arc::new(EchoProvider)).await;

    let body = reqwest::get(format!("http://{addr}/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, BANNER);
}

#[tokio::test]
async fn paraphrase_returns_selection_and_breakdown() {
    let addr = spawn(Arc::new(EchoProvider)).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/paraphrase"))
        .json(&json!({ "text": "hello there", "candidates": 2, "styles": ["Casual"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["original"], "hello there");
    assert_eq!(body["provider_used"], "echo");
    let paraphrased = body["paraphrased"].as_str().unwrap();
    assert!(paraphrased.starts_with("Rewritten 0: hello there."));
    assert!(paraphrased.contains("casual"));
    assert_eq!(body["score"], body["breakdown"]["total"]);
    assert!(body["breakdown"]["vocabulary_diversity"].is_u64());
}

#[tokio::test]
async fn blank_or_missing_text_is_bad_request() {
    let addr = spawn(Arc::new(EchoProvider)).await;
    let client = reqwest::Client::new();

    for payload in [json!({ "text": "   " }), json!({}), json!({ "text": "" })] {
        let resp = client
            .post(format!("http://{addr}/paraphrase"))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "payload {payload}");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "No text provided");
    }
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let addr = spawn(Arc::new(EchoProvider)).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/paraphrase"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "No text provided");
}

#[tokio::test]
async fn invalid_options_report_validation_message() {
    let addr = spawn(Arc::new(EchoProvider)).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/paraphrase"))
        .json(&json!({ "text": "hello", "temperature": 3.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("temperature"));
}

#[tokio::test]
async fn all_providers_failing_is_bad_gateway() {
    let addr = spawn(Arc::new(BrokenProvider)).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/paraphrase"))
        .json(&json!({ "text": "hello there" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["failures"][0]["provider"], "broken");
    assert_eq!(body["failures"][0]["kind"], "authentication_failed");
}

#[tokio::test]
async fn cross_origin_requests_are_allowed() {
    let addr = spawn(Arc::new(EchoProvider)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/paraphrase"))
        .header("origin", "http://localhost:3000")
        .json(&json!({ "text": "hello there" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");

    let preflight = client
        .request(reqwest::Method::OPTIONS, format!("http://{addr}/paraphrase"))
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();
    assert!(preflight.status().is_success());
    assert_eq!(preflight.headers()["access-control-allow-origin"], "*");
    assert!(preflight
        .headers()
        .contains_key("access-control-allow-methods"));
}
