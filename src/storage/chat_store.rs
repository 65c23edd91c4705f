//! Flat-file storage for chat transcripts and summary artifacts.
//!
//! Layout under the chats directory:
//! - `chat_<stem>.json`
//! - `intermediate_summaries/summary_<stem>_{1,2}.json`
//! - `summary_<stem>.txt`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::internal::{ChatRecord, RunKey, Summary};

const INTERMEDIATE_DIR: &str = "intermediate_summaries";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatStore {
    root: PathBuf,
    same_patient_only: bool,
}

impl ChatStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            same_patient_only: false,
        }
    }

    /// Only return the same patient's chats from [`ChatStore::list_previous`].
    pub fn with_same_patient_history(mut self, enabled: bool) -> Self {
        self.same_patient_only = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn intermediate_dir(&self) -> PathBuf {
        self.root.join(INTERMEDIATE_DIR)
    }

    /// Write a new transcript. Never overwrites: if another run already
    /// claimed this patient and second, the key gets a random suffix.
    pub async fn save(&self, record: &ChatRecord) -> Result<RunKey, StorageError> {
        ensure_dir(&self.root).await?;

        let body = serde_json::to_vec_pretty(record)?;
        let mut key = RunKey::new(&record.patient_name, &record.timestamp);

        loop {
            let path = self.root.join(key.chat_file());
            match write_new(&path, &body).await {
                Ok(()) => {
                    info!("Chat saved successfully to {}", path.display());
                    return Ok(key);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let suffix = Uuid::new_v4().simple().to_string()[..8].to_string();
                    warn!(
                        "{} already exists, retrying with suffix {}",
                        path.display(),
                        suffix
                    );
                    key.suffix = Some(suffix);
                }
                Err(e) => return Err(StorageError::io(&path, e)),
            }
        }
    }

    /// Every saved transcript except `excluding`, in filename order.
    pub async fn list_previous(
        &self,
        excluding: &RunKey,
    ) -> Result<Vec<ChatRecord>, StorageError> {
        let excluded = excluding.chat_file();

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.root, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.root, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(true);
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_dir && name.ends_with(".json") && name != excluded {
                names.push(name);
            }
        }
        names.sort();

        let mut records = Vec::with_capacity(names.len());
        for name in names {
            let path = self.root.join(&name);
            let raw = match fs::read(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping chat file {} that could not be read: {}", path.display(), e);
                    continue;
                }
            };

            match serde_json::from_slice::<ChatRecord>(&raw) {
                Ok(record) => {
                    if self.same_patient_only && record.patient_name != excluding.patient_name {
                        continue;
                    }
                    records.push(record);
                }
                Err(e) => warn!("Skipping unreadable chat file {}: {}", path.display(), e),
            }
        }

        debug!("Loaded {} previous chats", records.len());
        Ok(records)
    }

    /// Persist candidate summary `index` (1 or 2) of a run.
    pub async fn save_intermediate(
        &self,
        key: &RunKey,
        index: u8,
        summary: &Summary,
    ) -> Result<PathBuf, StorageError> {
        let dir = self.intermediate_dir();
        ensure_dir(&dir).await?;

        let path = dir.join(key.intermediate_file(index));
        let body = serde_json::to_vec_pretty(summary)?;
        fs::write(&path, body)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        debug!("Intermediate summary {} saved to {}", index, path.display());
        Ok(path)
    }

    /// Persist the synthesized summary as a human-readable report.
    pub async fn save_final(
        &self,
        key: &RunKey,
        summary: &Summary,
    ) -> Result<PathBuf, StorageError> {
        ensure_dir(&self.root).await?;

        let path = self.root.join(key.final_file());
        let body = render_final_report(key, summary)?;
        fs::write(&path, body)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        info!("Synthesized summary saved to {}", path.display());
        Ok(path)
    }
}

pub fn render_final_report(key: &RunKey, summary: &Summary) -> Result<String, StorageError> {
    let mut report = String::new();
    report.push_str("Synthesized Summary from Gemini API:\n");
    report.push_str(&"=".repeat(37));
    report.push_str("\n\n");
    report.push_str(&format!(
        "Patient Name: {}\nTimestamp: {}\n\n",
        key.patient_name, key.timestamp
    ));
    report.push_str(&"-".repeat(20));
    report.push('\n');
    report.push_str(&serde_json::to_string_pretty(summary)?);
    Ok(report)
}

async fn ensure_dir(dir: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| StorageError::io(dir, e))
}

async fn write_new(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(body).await?;
    file.flush().await
}
