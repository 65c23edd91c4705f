use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    api::{dto::*, events},
    config::Config,
    orchestrator::{ChatSubmission, PromptBuilder, SummarizationOrchestrator},
    services::{llm_gateway::LlmGateway, notifier::ProgressNotifier, sibling_client::SiblingClient},
    storage::chat_store::ChatStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub notifier: ProgressNotifier,
    pub siblings: Arc<SiblingClient>,
    pub orchestrator: Arc<SummarizationOrchestrator>,
}

impl AppState {
    /// Wire every component from configuration around the given LLM gateway.
    pub fn build(config: Config, gateway: Arc<dyn LlmGateway>) -> Self {
        let notifier = ProgressNotifier::new(config.event_capacity);
        let siblings = Arc::new(SiblingClient::new(
            config.reasoner_address.clone(),
            config.triple_extractor_address.clone(),
        ));
        let store = Arc::new(
            ChatStore::new(config.chats_path())
                .with_same_patient_history(config.history_same_patient_only),
        );
        let prompts = PromptBuilder::new(config.summary_sentences, config.summary_excerpts);

        let orchestrator = Arc::new(SummarizationOrchestrator::new(
            store,
            gateway,
            notifier.clone(),
            siblings.clone(),
            prompts,
        ));

        Self {
            config: Arc::new(config),
            notifier,
            siblings,
            orchestrator,
        }
    }
}

pub async fn index() -> &'static str {
    "Hello, I am the website backend module!"
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn process_response(
    State(state): State<AppState>,
    Json(req): Json<ProcessRequest>,
) -> &'static str {
    state.notifier.publish_response(&req.message);
    "Message sent!"
}

pub async fn submit_sentence(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> String {
    match serde_json::to_value(&req) {
        Ok(payload) => state.siblings.forward_submission(&payload).await,
        Err(e) => warn!("Could not re-encode submission: {}", e),
    }

    format!(
        "Submitted sentence '{}' from {} to t2t!",
        req.sentence, req.patient_name
    )
}

pub async fn save_chat(
    State(state): State<AppState>,
    Json(req): Json<SaveChatRequest>,
) -> (StatusCode, &'static str) {
    let patient_name = req.patient_name().to_string();
    let messages = req.messages.unwrap_or_default();
    if messages.is_empty() {
        warn!("No messages received, nothing to save.");
        return (StatusCode::BAD_REQUEST, "No messages to save");
    }

    info!(
        "Received {} messages for patient {}",
        messages.len(),
        patient_name
    );

    // Detached: the run reports through progress events, not this response.
    let _ = state.orchestrator.spawn(ChatSubmission {
        patient_name,
        messages,
    });

    (StatusCode::ACCEPTED, "Save process initiated")
}

pub fn create_router(state: AppState) -> Router {
    let cors_enabled = state.config.cors_enabled;

    let router = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/stream", get(events::event_stream))
        .route("/process", post(process_response))
        .route("/submit", post(submit_sentence))
        .route("/save-chat", post(save_chat))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_enabled {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
