pub mod llm_gateway;
pub mod notifier;
pub mod sibling_client;

// Re-export for convenience
pub use llm_gateway::{GeminiClient, GenerationOverrides, LlmError, LlmGateway, MockGateway};
pub use notifier::ProgressNotifier;
pub use sibling_client::SiblingClient;
