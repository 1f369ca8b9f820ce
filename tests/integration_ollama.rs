#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Ollama client tests against a mock server standing in for /api/*

use code_doc_helper::RagError;
use code_doc_helper::config::OllamaConfig;
use code_doc_helper::embeddings::{EMPTY_DOCUMENT_SENTINEL, EmbeddingGateway};
use code_doc_helper::generation::LanguageModel;
use code_doc_helper::ollama::OllamaClient;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const TEST_MODEL: &str = "nomic-embed-text:latest";
const DIM: usize = 4;

/// Answers /api/embed with one vector per input, derived from the text length
struct EmbedResponder;

impl Respond for EmbedResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let embeddings: Vec<Vec<f32>> = body["input"]
            .as_array()
            .map(|inputs| {
                inputs
                    .iter()
                    .map(|text| {
                        let len = text.as_str().map_or(0, str::len) as f32;
                        vec![len, 1.0, 0.0, 0.0]
                    })
                    .collect()
            })
            .unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
    }
}

fn create_test_client(server: &MockServer) -> OllamaClient {
    let config = OllamaConfig {
        host: "127.0.0.1".to_string(),
        port: server.address().port(),
        model: TEST_MODEL.to_string(),
        batch_size: 3,
        embedding_dimension: DIM as u32,
        ..OllamaConfig::default()
    };

    OllamaClient::new(&config)
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(5))
        .with_retry_attempts(2)
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

#[tokio::test]
async fn health_check_against_mock_server() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                { "name": TEST_MODEL, "size": 274302450 },
                { "name": "llama3.2:latest" }
            ]
        })))
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let (health, models) = tokio::task::spawn_blocking(move || {
        (client.health_check(), client.list_models())
    })
    .await
    .expect("task should not panic");

    assert!(health.is_ok(), "health check should pass: {:?}", health);
    let models = models.expect("should list models");
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].size, Some(274302450));
}

#[tokio::test]
async fn health_check_reports_missing_model() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "models": [{ "name": "other" }] })),
        )
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task should not panic");

    match result {
        Err(RagError::ModelInvocation(message)) => assert!(message.contains(TEST_MODEL)),
        other => panic!("expected a model error, got {other:?}"),
    }
}

#[tokio::test]
async fn gateway_batches_and_substitutes_blank_input() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(EmbedResponder)
        .expect(2)
        .mount(&server)
        .await;

    let gateway = EmbeddingGateway::new(Arc::new(create_test_client(&server))).with_dimension(DIM);
    let texts: Vec<String> = ["fn main() {}", "", "struct Config;", "   "]
        .iter()
        .map(ToString::to_string)
        .collect();

    let embeddings = tokio::task::spawn_blocking(move || gateway.embed_batch(&texts))
        .await
        .expect("task should not panic")
        .expect("should embed");

    assert_eq!(embeddings.len(), 4);
    assert_eq!(embeddings[0][0], "fn main() {}".len() as f32);
    assert_eq!(embeddings[1][0], EMPTY_DOCUMENT_SENTINEL.len() as f32);
    assert_eq!(embeddings[3], embeddings[1]);
}

#[tokio::test]
async fn gateway_rejects_wrong_dimension() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[0.1, 0.2]] })),
        )
        .mount(&server)
        .await;

    let gateway = EmbeddingGateway::new(Arc::new(create_test_client(&server))).with_dimension(DIM);
    let result = tokio::task::spawn_blocking(move || gateway.embed("query"))
        .await
        .expect("task should not panic");

    assert!(matches!(result, Err(RagError::ModelInvocation(_))));
}

#[tokio::test]
async fn generation_through_ollama() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({ "model": "llama3.2:latest", "stream": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.2:latest",
            "response": "  The entry point is main.  ",
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let model = create_test_client(&server).with_generation_model("llama3.2:latest");
    let answer = tokio::task::spawn_blocking(move || model.generate("Where is the entry point?"))
        .await
        .expect("task should not panic")
        .expect("should generate");

    assert_eq!(answer, "  The entry point is main.  ");
}
