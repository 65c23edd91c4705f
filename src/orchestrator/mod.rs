pub mod prompt_builder;

use chrono::Local;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::models::internal::{ChatMessage, ChatRecord, ProgressEvent, RunKey, TIMESTAMP_FORMAT};
use crate::services::llm_gateway::{GenerationOverrides, LlmError, LlmGateway};
use crate::services::notifier::ProgressNotifier;
use crate::services::sibling_client::SiblingClient;
use crate::storage::chat_store::{ChatStore, StorageError};

pub use prompt_builder::{format_transcript, PromptBuilder};

/// Steps of a single summarization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Saving,
    GeneratingCandidate1,
    GeneratingCandidate2,
    CheckingCandidates,
    Synthesizing,
    Finalizing,
    Done,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Candidate summary {index} failed: {source}")]
    Candidate {
        index: u8,
        #[source]
        source: LlmError,
    },
    #[error("Synthesis failed: {0}")]
    Synthesis(#[source] LlmError),
    #[error("Worker panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    /// Message sent to live clients when a run aborts.
    pub fn progress_message(&self) -> &'static str {
        match self {
            PipelineError::Candidate { .. } => "Failed to generate summaries.",
            PipelineError::Synthesis(_) => "Failed to synthesize summary.",
            PipelineError::Storage(_) | PipelineError::Panicked(_) => {
                "An unexpected error occurred."
            }
        }
    }
}

/// A transcript submitted for saving and summarization.
#[derive(Debug, Clone)]
pub struct ChatSubmission {
    pub patient_name: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    /// Set once the transcript was written.
    pub key: Option<RunKey>,
    pub state: RunState,
    /// The step that was running when the run aborted.
    pub failed_at: Option<RunState>,
}

pub struct SummarizationOrchestrator {
    store: Arc<ChatStore>,
    gateway: Arc<dyn LlmGateway>,
    notifier: ProgressNotifier,
    siblings: Arc<SiblingClient>,
    prompts: PromptBuilder,
}

struct RunTracker {
    state: RunState,
    key: Option<RunKey>,
}

impl RunTracker {
    fn enter(&mut self, next: RunState) {
        debug!("Summarization run: {} -> {}", self.state, next);
        self.state = next;
    }
}

impl SummarizationOrchestrator {
    pub fn new(
        store: Arc<ChatStore>,
        gateway: Arc<dyn LlmGateway>,
        notifier: ProgressNotifier,
        siblings: Arc<SiblingClient>,
        prompts: PromptBuilder,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            siblings,
            prompts,
        }
    }

    pub fn notifier(&self) -> &ProgressNotifier {
        &self.notifier
    }

    /// Start a run on its own task and return without waiting for it.
    pub fn spawn(self: &Arc<Self>, submission: ChatSubmission) -> JoinHandle<RunReport> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.run(submission).await })
    }

    /// Run the whole pipeline. Failures are reported through progress events
    /// and logs, never returned.
    pub async fn run(&self, submission: ChatSubmission) -> RunReport {
        let patient = submission.patient_name.clone();
        info!("Starting background task to save chat for patient: {}", patient);

        let mut tracker = RunTracker {
            state: RunState::Saving,
            key: None,
        };

        let outcome = AssertUnwindSafe(self.execute(submission, &mut tracker))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(PipelineError::Panicked(panic_message(panic))));

        match outcome {
            Ok(()) => {
                tracker.enter(RunState::Done);
                self.notifier
                    .publish_progress(ProgressEvent::done("Done! Summary saved."));
                RunReport {
                    key: tracker.key,
                    state: RunState::Done,
                    failed_at: None,
                }
            }
            Err(e) => {
                let failed_at = tracker.state;
                error!(
                    "Summarization for patient {} aborted during {}: {}",
                    patient, failed_at, e
                );
                if let PipelineError::Candidate { source, .. } | PipelineError::Synthesis(source) = &e {
                    debug!("Gateway failure detail: {}", source.to_json());
                }
                self.notifier
                    .publish_progress(ProgressEvent::error(e.progress_message()));
                tracker.enter(RunState::Aborted);
                RunReport {
                    key: tracker.key,
                    state: RunState::Aborted,
                    failed_at: Some(failed_at),
                }
            }
        }
    }

    async fn execute(
        &self,
        submission: ChatSubmission,
        tracker: &mut RunTracker,
    ) -> Result<(), PipelineError> {
        self.notifier
            .publish_progress(ProgressEvent::step("Saving chat conversation..."));

        let record = ChatRecord {
            patient_name: submission.patient_name,
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            messages: submission.messages,
        };
        let key = self.store.save(&record).await?;
        tracker.key = Some(key.clone());

        self.siblings
            .notify_chat_saved(&record.patient_name, &key.chat_file())
            .await;

        let history = self.store.list_previous(&key).await?;
        let prompt = self.prompts.build_analysis_prompt(&record, &history);

        tracker.enter(RunState::GeneratingCandidate1);
        self.notifier
            .publish_progress(ProgressEvent::step("Generating summary 1/2..."));
        let first = self
            .gateway
            .complete(&prompt, GenerationOverrides::default())
            .await;

        tracker.enter(RunState::GeneratingCandidate2);
        self.notifier
            .publish_progress(ProgressEvent::step("Generating summary 2/2..."));
        let second = self
            .gateway
            .complete(&prompt, GenerationOverrides::default())
            .await;

        tracker.enter(RunState::CheckingCandidates);
        let first = first.map_err(|source| PipelineError::Candidate { index: 1, source })?;
        let second = second.map_err(|source| PipelineError::Candidate { index: 2, source })?;
        debug!(
            "Candidate summaries carry {} and {} flags",
            first.flags().len(),
            second.flags().len()
        );

        self.store.save_intermediate(&key, 1, &first).await?;
        self.store.save_intermediate(&key, 2, &second).await?;

        tracker.enter(RunState::Synthesizing);
        self.notifier
            .publish_progress(ProgressEvent::step("Synthesizing final summary..."));
        let synthesis_prompt = self.prompts.build_synthesis_prompt(&first, &second);
        let synthesized = self
            .gateway
            .complete(&synthesis_prompt, GenerationOverrides::json_response())
            .await;

        tracker.enter(RunState::Finalizing);
        let synthesized = synthesized.map_err(PipelineError::Synthesis)?;
        self.store.save_final(&key, &synthesized).await?;

        Ok(())
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
