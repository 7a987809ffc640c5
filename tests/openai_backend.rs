mod common;

use common::{client, config_for, CapturedLogs, CountingSleeper, MockServer};
use std::sync::Arc;
use video_processor::llm::{Backend, BackendErrorKind, ChatRequest, TruncationCause};

const COMPLETE: &str = r##"{"choices":[{"message":{"content":"# Summary"},"finish_reason":"stop"}]}"##;

fn request(model: &str, temperature: f32) -> ChatRequest {
    ChatRequest::new("Summarize this", model, temperature, 500, Backend::OpenAi).unwrap()
}

#[tokio::test]
async fn test_retries_transient_failures_then_succeeds() {
    let mock = MockServer::default()
        .json(503, r#"{"error":{"message":"busy"}}"#)
        .json(503, r#"{"error":{"message":"busy"}}"#)
        .json(200, COMPLETE);
    let base = mock.start().await;
    let sleeper = Arc::new(CountingSleeper::default());
    let client = client(config_for(&base), sleeper.clone());

    let result = client.send(&request("gpt-4o", 0.0)).await.unwrap();

    assert_eq!(result.text(), "# Summary");
    assert!(!result.truncated());
    assert!(result.truncation_signal());
    assert_eq!(mock.hits(), 3);
    assert_eq!(sleeper.waits(), 2);
    let delays = sleeper.delays();
    assert!(delays[1] > delays[0]);
}

#[tokio::test]
async fn test_authentication_failure_is_not_retried() {
    let mock = MockServer::default().json(
        401,
        r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#,
    );
    let base = mock.start().await;
    let sleeper = Arc::new(CountingSleeper::default());
    let client = client(config_for(&base), sleeper.clone());

    let err = client.send(&request("gpt-4o", 0.0)).await.unwrap_err();

    assert_eq!(err.kind, BackendErrorKind::Unauthenticated);
    assert_eq!(err.raw_status, Some(401));
    assert!(err.message.contains("Incorrect API key"));
    assert_eq!(mock.hits(), 1);
    assert_eq!(sleeper.waits(), 0);
}

#[tokio::test]
async fn test_missing_key_fails_before_any_request() {
    let mock = MockServer::default().json(200, COMPLETE);
    let base = mock.start().await;
    let mut config = config_for(&base);
    config.openai_api_key = None;
    let client = client(config, Arc::new(CountingSleeper::default()));

    let err = client.send(&request("gpt-4o", 0.0)).await.unwrap_err();

    assert_eq!(err.kind, BackendErrorKind::CredentialMissing);
    assert!(err.message.contains("OPENAI_API_KEY"));
    assert_eq!(mock.hits(), 0);
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let mock = MockServer::default()
        .json(500, r#"{"error":{"message":"boom"}}"#)
        .json(500, r#"{"error":{"message":"boom"}}"#)
        .json(500, r#"{"error":{"message":"boom"}}"#);
    let base = mock.start().await;
    let sleeper = Arc::new(CountingSleeper::default());
    let client = client(config_for(&base), sleeper.clone());

    let err = client.send(&request("gpt-4o", 0.0)).await.unwrap_err();

    assert_eq!(err.kind, BackendErrorKind::ServerError);
    assert!(err.message.contains("3 attempts"), "{}", err.message);
    assert_eq!(mock.hits(), 3);
    assert_eq!(sleeper.waits(), 2);
}

#[tokio::test]
async fn test_length_stop_is_reported_as_truncation() {
    let mock = MockServer::default().json(
        200,
        r##"{"choices":[{"message":{"content":"# Partial"},"finish_reason":"length"}],
            "usage":{"completion_tokens_details":{"reasoning_tokens":0}}}"##,
    );
    let base = mock.start().await;
    let client = client(config_for(&base), Arc::new(CountingSleeper::default()));

    let result = client.send(&request("gpt-4o", 0.2)).await.unwrap();

    assert!(result.truncated());
    assert_eq!(result.cause(), Some(TruncationCause::OutputTokens));
    assert_eq!(result.text(), "# Partial");
}

#[tokio::test]
async fn test_reasoning_model_request_shape_and_cause() {
    let mock = MockServer::default().json(
        200,
        r#"{"choices":[{"message":{"content":null},"finish_reason":"length"}],
            "usage":{"completion_tokens_details":{"reasoning_tokens":500}}}"#,
    );
    let base = mock.start().await;
    let client = client(config_for(&base), Arc::new(CountingSleeper::default()));

    let result = client.send(&request("o3-mini", 0.7)).await.unwrap();

    assert_eq!(result.text(), "");
    assert_eq!(result.cause(), Some(TruncationCause::ReasoningTokens));

    let sent = &mock.requests()[0];
    assert_eq!(sent.path, "/v1/chat/completions");
    assert_eq!(
        sent.headers.get("authorization").unwrap(),
        "Bearer sk-test"
    );
    assert_eq!(sent.body["max_completion_tokens"], 500);
    assert!(sent.body.get("max_tokens").is_none());
    assert!(sent.body.get("temperature").is_none());
    assert_eq!(sent.body["messages"][0]["role"], "user");
}

#[tokio::test]
async fn test_regular_model_sends_temperature_and_max_tokens() {
    let mock = MockServer::default().json(200, COMPLETE);
    let base = mock.start().await;
    let client = client(config_for(&base), Arc::new(CountingSleeper::default()));

    client.send(&request("gpt-4o", 0.5)).await.unwrap();

    let sent = &mock.requests()[0];
    assert_eq!(sent.body["max_tokens"], 500);
    assert_eq!(sent.body["temperature"], 0.5);
    assert!(sent.body.get("max_completion_tokens").is_none());
}

#[tokio::test]
async fn test_responses_api_incomplete_reply() {
    let mock = MockServer::default().json(
        200,
        r##"{"status":"incomplete","incomplete_details":{"reason":"max_output_tokens"},
            "output":[{"type":"reasoning"},
                      {"type":"message","content":[{"type":"output_text","text":"# Half"}]}],
            "usage":{"output_tokens_details":{"reasoning_tokens":0}}}"##,
    );
    let base = mock.start().await;
    let client = client(config_for(&base), Arc::new(CountingSleeper::default()));

    let result = client.send(&request("gpt-5", 0.0)).await.unwrap();

    assert_eq!(mock.paths(), vec!["/v1/responses".to_string()]);
    assert_eq!(result.text(), "# Half");
    assert!(result.truncated());
    let sent = &mock.requests()[0];
    assert_eq!(sent.body["input"], "Summarize this");
    assert_eq!(sent.body["max_output_tokens"], 500);
}

#[tokio::test]
async fn test_unknown_model_maps_to_model_not_found() {
    let mock = MockServer::default().json(
        404,
        r#"{"error":{"message":"The model `gpt-9` does not exist","code":"model_not_found"}}"#,
    );
    let base = mock.start().await;
    let sleeper = Arc::new(CountingSleeper::default());
    let client = client(config_for(&base), sleeper.clone());

    let err = client.send(&request("gpt-9", 0.0)).await.unwrap_err();

    assert_eq!(err.kind, BackendErrorKind::ModelNotFound);
    assert!(err.message.contains("gpt-9"));
    assert_eq!(sleeper.waits(), 0);
}

#[tokio::test]
async fn test_malformed_body_is_reported() {
    let mock = MockServer::default().json(200, r#"{"choices":[]}"#);
    let base = mock.start().await;
    let client = client(config_for(&base), Arc::new(CountingSleeper::default()));

    let err = client.send(&request("gpt-4o", 0.0)).await.unwrap_err();

    assert_eq!(err.kind, BackendErrorKind::MalformedResponse);
    assert_eq!(mock.hits(), 1);
}

#[tokio::test]
async fn test_truncation_cause_is_logged_by_the_client() {
    let mock = MockServer::default()
        .json(
            200,
            r#"{"choices":[{"message":{"content":"x"},"finish_reason":"length"}],
                "usage":{"completion_tokens_details":{"reasoning_tokens":0}}}"#,
        )
        .json(
            200,
            r#"{"choices":[{"message":{"content":""},"finish_reason":"length"}],
                "usage":{"completion_tokens_details":{"reasoning_tokens":900}}}"#,
        );
    let base = mock.start().await;
    let client = client(config_for(&base), Arc::new(CountingSleeper::default()));

    let logs = CapturedLogs::default();
    let _guard = logs.install();
    client.send(&request("gpt-4o", 0.0)).await.unwrap();
    client.send(&request("o4-mini", 0.0)).await.unwrap();

    let output = logs.contents();
    assert!(
        output.contains("Response truncated: output token limit reached"),
        "{}",
        output
    );
    assert!(
        output.contains("Response truncated: token budget exhausted by reasoning tokens"),
        "{}",
        output
    );
}
