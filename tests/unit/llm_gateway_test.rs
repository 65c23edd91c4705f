use chatsummary_backend::models::internal::{Confidence, IndicatorKind};
use chatsummary_backend::services::llm_gateway::{
    GeminiClient, GenerationOverrides, LlmError, LlmGateway, MockGateway,
};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL_PATH: &str = "/models/gemini-test:generateContent";

fn client_for(server: &MockServer) -> GeminiClient {
    GeminiClient::new(server.uri(), "gemini-test".to_string(), "test-key".to_string())
}

fn gemini_body(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

#[tokio::test]
async fn test_complete_parses_fenced_summary() {
    let mock_server = MockServer::start().await;
    let text = "```json\n{\"summary\": \"Patient reports full adherence.\", \"flags\": [{\"indicator\": \"GamingTheSystem\", \"excerpt\": \"never missed\", \"explanation\": \"too perfect\"}]}\n```";

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(text)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let summary = client_for(&mock_server)
        .complete("prompt", GenerationOverrides::default())
        .await
        .unwrap();

    assert_eq!(summary.text(), Some("Patient reports full adherence."));
    let flags = summary.flags();
    assert_eq!(flags.len(), 1);
    assert_eq!(
        flags[0].indicator.as_ref().map(|i| i.kind()),
        Some(IndicatorKind::GamingTheSystem)
    );
    assert_eq!(flags[0].confidence, None);
}

#[tokio::test]
async fn test_complete_accepts_bare_json_prefix() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(
            "json\n{\"summary\": \"s\", \"flags\": [{\"indicator\": \"VagueLanguage\", \"excerpt\": \"maybe\", \"explanation\": \"hedge\", \"confidence\": \"low\"}]}",
        )))
        .mount(&mock_server)
        .await;

    let summary = client_for(&mock_server)
        .complete("prompt", GenerationOverrides::default())
        .await
        .unwrap();

    assert_eq!(summary.flags()[0].confidence, Some(Confidence::Low));
}

#[tokio::test]
async fn test_request_carries_prompt_config_and_safety() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(body_partial_json(json!({
            "contents": [{"role": "user", "parts": [{"text": "synthesize please"}]}],
            "generationConfig": {
                "temperature": 1.0,
                "topK": 1,
                "topP": 1.0,
                "maxOutputTokens": 8192,
                "responseMimeType": "application/json"
            }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(gemini_body("{\"summary\": \"ok\", \"flags\": []}")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = client_for(&mock_server)
        .complete("synthesize please", GenerationOverrides::json_response())
        .await;
    assert!(result.is_ok());

    let requests = mock_server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let safety = body["safetySettings"].as_array().unwrap();
    assert_eq!(safety.len(), 4);
    assert!(safety
        .iter()
        .all(|s| s["threshold"] == "BLOCK_MEDIUM_AND_ABOVE"));
}

#[tokio::test]
async fn test_http_error_is_transport_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal error"))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server)
        .complete("prompt", GenerationOverrides::default())
        .await
        .unwrap_err();

    assert_eq!(err.tag(), "Error calling Gemini API");
    assert!(err.to_json()["details"].as_str().unwrap().contains("500"));
}

#[tokio::test]
async fn test_unreachable_provider_is_transport_failure() {
    let client = GeminiClient::with_timeout(
        "http://127.0.0.1:1".to_string(),
        "gemini-test".to_string(),
        "k".to_string(),
        Duration::from_secs(2),
    );

    let err = client
        .complete("prompt", GenerationOverrides::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::Transport { .. }));
}

#[tokio::test]
async fn test_missing_candidate_text() {
    let mock_server = MockServer::start().await;
    let blocked = json!({"promptFeedback": {"blockReason": "SAFETY"}});

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(blocked.clone()))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server)
        .complete("prompt", GenerationOverrides::default())
        .await
        .unwrap_err();

    assert_eq!(err.tag(), "Could not extract text from Gemini response");
    assert_eq!(
        err.to_json(),
        json!({
            "error": "Could not extract text from Gemini response",
            "raw_response": blocked
        })
    );
}

#[tokio::test]
async fn test_non_json_model_output_is_unexpected_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(gemini_body("Sorry, I cannot help with that.")),
        )
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server)
        .complete("prompt", GenerationOverrides::default())
        .await
        .unwrap_err();
    assert_eq!(err.tag(), "An unexpected error occurred");
}

#[tokio::test]
async fn test_varied_model_output_is_kept_verbatim() {
    let mock_server = MockServer::start().await;
    let model_json = json!({
        "summary": "Patient is mostly adherent.",
        "overall_adherence": "fair",
        "flags": [
            {
                "indicator": "Engagement Level",
                "excerpt": "ok",
                "explanation": "short replies",
                "severity": "high"
            },
            {"excerpt": "I think so", "explanation": "no indicator given"},
            {
                "indicator": "Vague / Evasive Language",
                "excerpt": "maybe",
                "explanation": "hedge",
                "severity": "medium",
                "confidence": "medium"
            }
        ]
    });
    let text = format!("```json\n{}\n```", model_json);

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(&text)))
        .mount(&mock_server)
        .await;

    let summary = client_for(&mock_server)
        .complete("prompt", GenerationOverrides::default())
        .await
        .unwrap();

    assert_eq!(serde_json::to_value(&summary).unwrap(), model_json);

    let flags = summary.flags();
    assert_eq!(flags.len(), 3);
    assert_eq!(flags[0].indicator.as_ref().unwrap().label(), "Engagement Level");
    assert!(flags[1].indicator.is_none());
    assert_eq!(
        flags[2].confidence,
        Some(Confidence::Other("medium".to_string()))
    );
}

#[tokio::test]
async fn test_any_well_formed_json_is_accepted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(gemini_body("{\"summary\": 42}")),
        )
        .mount(&mock_server)
        .await;

    let summary = client_for(&mock_server)
        .complete("prompt", GenerationOverrides::default())
        .await
        .unwrap();
    assert_eq!(summary.as_value(), &json!({"summary": 42}));
    assert_eq!(summary.text(), None);
    assert!(summary.flags().is_empty());
}

#[tokio::test]
async fn test_slow_provider_hits_configured_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(gemini_body("{\"summary\": \"late\"}"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let client = GeminiClient::with_timeout(
        mock_server.uri(),
        "gemini-test".to_string(),
        "test-key".to_string(),
        Duration::from_millis(200),
    );

    let err = client
        .complete("prompt", GenerationOverrides::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::Transport { .. }));
}

#[tokio::test]
async fn test_mock_gateway_replays_in_order() {
    let gateway = MockGateway::new(vec![
        Ok(Default::default()),
        Err(LlmError::Transport {
            details: "boom".to_string(),
        }),
    ]);

    assert!(gateway
        .complete("a", GenerationOverrides::default())
        .await
        .is_ok());
    assert!(gateway
        .complete("b", GenerationOverrides::json_response())
        .await
        .is_err());
    // exhausted queue fails instead of panicking
    assert!(gateway
        .complete("c", GenerationOverrides::default())
        .await
        .is_err());

    let calls = gateway.calls();
    assert_eq!(gateway.call_count(), 3);
    assert_eq!(calls[1].0, "b");
    assert_eq!(calls[1].1, GenerationOverrides::json_response());
}
