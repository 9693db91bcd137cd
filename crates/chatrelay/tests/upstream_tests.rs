//! Integration tests for the OpenAI-compatible upstream client
//!
//! A wiremock server stands in for the provider and serves canned
//! server-sent event bodies.

use futures::StreamExt;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chatrelay_server::config::UpstreamConfig;
use chatrelay_server::message::Message;
use chatrelay_server::upstream::{
    CompletionClient, FragmentStream, OpenAiCompatibleClient, UpstreamError,
};

// =============================================================================
// Test Fixtures
// =============================================================================

fn streaming_client(server: &MockServer) -> OpenAiCompatibleClient {
    let config = UpstreamConfig {
        base_url: server.uri(),
        api_key_env: "CHATRELAY_TEST_UNUSED".to_string(),
        model: "test-model".to_string(),
        stream: true,
        connect_timeout_secs: 5,
    };
    OpenAiCompatibleClient::with_api_key(&config, "test-key").unwrap()
}

fn sse_body(events: &[&str]) -> String {
    events
        .iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect()
}

fn delta(content: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "delta": {"content": content}}]
    })
    .to_string()
}

async fn mount_sse(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

async fn collect(stream: FragmentStream) -> Vec<Result<String, UpstreamError>> {
    stream
        .map(|item| item.map(|fragment| fragment.into_string()))
        .collect()
        .await
}

// =============================================================================
// Streaming Tests
// =============================================================================

#[tokio::test]
async fn test_streams_fragments_in_order() {
    let server = MockServer::start().await;
    let role = r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
    let (a, b, c) = (delta("Open "), delta("Steam "), delta("settings."));
    mount_sse(
        &server,
        sse_body(&[role, a.as_str(), b.as_str(), c.as_str(), "[DONE]"]),
    )
    .await;

    let client = streaming_client(&server);
    let fragments = collect(client.complete(vec![Message::user("Hi")]).await.unwrap()).await;

    assert_eq!(
        fragments,
        vec![
            Ok("Open ".to_string()),
            Ok("Steam ".to_string()),
            Ok("settings.".to_string())
        ]
    );
}

#[tokio::test]
async fn test_events_after_done_are_ignored() {
    let server = MockServer::start().await;
    let (a, late) = (delta("Done."), delta("ignored"));
    mount_sse(&server, sse_body(&[a.as_str(), "[DONE]", late.as_str()])).await;

    let client = streaming_client(&server);
    let fragments = collect(client.complete(vec![Message::user("Hi")]).await.unwrap()).await;

    assert_eq!(fragments, vec![Ok("Done.".to_string())]);
}

#[tokio::test]
async fn test_stream_without_done_ends_at_body_end() {
    let server = MockServer::start().await;
    let a = delta("No marker");
    mount_sse(&server, format!("data: {a}")).await;

    let client = streaming_client(&server);
    let fragments = collect(client.complete(vec![Message::user("Hi")]).await.unwrap()).await;

    assert_eq!(fragments, vec![Ok("No marker".to_string())]);
}

#[tokio::test]
async fn test_request_carries_model_stream_flag_and_messages() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "test-model",
            "stream": true,
            "messages": [
                {"role": "system", "content": "Be helpful."},
                {"role": "user", "content": "Hi"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse_body(&["[DONE]"])))
        .expect(1)
        .mount(&server)
        .await;

    let client = streaming_client(&server);
    let fragments = collect(
        client
            .complete(vec![Message::system("Be helpful."), Message::user("Hi")])
            .await
            .unwrap(),
    )
    .await;

    assert!(fragments.is_empty());
}

// =============================================================================
// Error Tests
// =============================================================================

#[tokio::test]
async fn test_http_429_is_rate_limited_with_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "20")
                .set_body_string("Rate limit exceeded"),
        )
        .mount(&server)
        .await;

    let client = streaming_client(&server);
    let err = client
        .complete(vec![Message::user("Hi")])
        .await
        .err()
        .unwrap();

    assert!(err.is_rate_limited());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(20)));
}

#[tokio::test]
async fn test_in_band_rate_limit_ends_stream() {
    let server = MockServer::start().await;
    let a = delta("Partial");
    let error = r#"{"error":{"code":429,"message":"Rate limit exceeded: free-models-per-day"}}"#;
    let b = delta("never");
    mount_sse(&server, sse_body(&[a.as_str(), error, b.as_str()])).await;

    let client = streaming_client(&server);
    let fragments = collect(client.complete(vec![Message::user("Hi")]).await.unwrap()).await;

    assert_eq!(fragments.len(), 2);
    assert_eq!(fragments[0], Ok("Partial".to_string()));
    assert!(matches!(
        fragments[1],
        Err(UpstreamError::RateLimited { .. })
    ));
}

#[tokio::test]
async fn test_in_band_other_error_is_status() {
    let server = MockServer::start().await;
    let error = r#"{"error":{"code":503,"message":"Provider overloaded"}}"#;
    mount_sse(&server, sse_body(&[error])).await;

    let client = streaming_client(&server);
    let fragments = collect(client.complete(vec![Message::user("Hi")]).await.unwrap()).await;

    assert_eq!(
        fragments,
        vec![Err(UpstreamError::Status {
            status: 503,
            body: "Provider overloaded".to_string()
        })]
    );
}

#[tokio::test]
async fn test_unreachable_upstream_is_network_error() {
    let config = UpstreamConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        api_key_env: "CHATRELAY_TEST_UNUSED".to_string(),
        model: "test-model".to_string(),
        stream: true,
        connect_timeout_secs: 2,
    };
    let client = OpenAiCompatibleClient::with_api_key(&config, "k").unwrap();

    let err = client
        .complete(vec![Message::user("Hi")])
        .await
        .err()
        .unwrap();
    assert!(matches!(err, UpstreamError::Network(_)));
}
