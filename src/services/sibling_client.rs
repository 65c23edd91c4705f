//! Best-effort HTTP calls to the sibling modules (reasoner, triple extractor).

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum SiblingError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
}

#[derive(Debug, Serialize)]
struct ChatSavedNotification<'a> {
    patient_name: &'a str,
    chat_file: &'a str,
}

#[derive(Clone, Default)]
pub struct SiblingClient {
    client: reqwest::Client,
    reasoner_address: Option<String>,
    triple_extractor_address: Option<String>,
}

impl SiblingClient {
    pub fn new(reasoner_address: Option<String>, triple_extractor_address: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            reasoner_address: reasoner_address.filter(|a| !a.is_empty()),
            triple_extractor_address: triple_extractor_address.filter(|a| !a.is_empty()),
        }
    }

    /// Tell the reasoner a new chat file exists. Failures are logged only.
    pub async fn notify_chat_saved(&self, patient_name: &str, chat_file: &str) {
        let Some(address) = self.reasoner_address.as_deref() else {
            return;
        };

        let body = ChatSavedNotification {
            patient_name,
            chat_file,
        };

        match self.post(address, "/chat-saved", &body).await {
            Ok(()) => info!("Successfully notified reasoner about saved chat: {}", chat_file),
            Err(e) => error!("Failed to notify reasoner about saved chat: {}", e),
        }
    }

    /// Forward a submitted sentence payload to the triple extractor. Failures are logged only.
    pub async fn forward_submission(&self, payload: &Value) {
        let Some(address) = self.triple_extractor_address.as_deref() else {
            return;
        };

        if let Err(e) = self.post(address, "/process", payload).await {
            error!("Failed to forward submission to triple extractor: {}", e);
        }
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        address: &str,
        path: &str,
        body: &T,
    ) -> Result<(), SiblingError> {
        let response = self
            .client
            .post(format!("http://{}{}", address, path))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SiblingError::ApiError {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(())
    }
}
