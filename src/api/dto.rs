use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::internal::ChatMessage;

// ==================== REQUEST DTOs ====================

/// Transcript to save. Missing and `null` fields are treated alike.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SaveChatRequest {
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
}

impl SaveChatRequest {
    pub fn patient_name(&self) -> &str {
        self.patient_name.as_deref().unwrap_or("unknown")
    }
}

/// Bot response relayed to the frontend over the event stream.
#[derive(Debug, Deserialize, Serialize)]
pub struct ProcessRequest {
    pub message: String,
}

/// Sentence submitted for triple extraction. Forwarded as-is.
#[derive(Debug, Deserialize, Serialize)]
pub struct SubmitRequest {
    pub sentence: String,
    pub patient_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
