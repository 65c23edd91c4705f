//! Chat summary backend - transcript storage and LLM adherence summaries

pub mod api;
pub mod config;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod storage;

// Re-export main types for convenience
pub use crate::api::routes::{create_router, AppState};
pub use crate::config::Config;
pub use crate::models::internal::{ChatMessage, ChatRecord, Flag, ProgressEvent, RunKey, Summary};
pub use crate::orchestrator::{ChatSubmission, RunReport, RunState, SummarizationOrchestrator};
pub use crate::services::llm_gateway::{GeminiClient, LlmGateway};
pub use crate::storage::chat_store::ChatStore;
