use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Timestamp layout used in record bodies and artifact filenames.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A saved chat transcript. Written once and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub patient_name: String,
    pub timestamp: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// One message as posted by the chat frontend.
///
/// Fields the backend does not interpret are carried in `extra` so the
/// stored transcript matches what the bot sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ChatUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(sender: &str, human: bool, text: &str) -> Self {
        Self {
            user: Some(ChatUser {
                name: Some(sender.to_string()),
                human: Some(human),
                extra: Map::new(),
            }),
            message: Some(text.to_string()),
            extra: Map::new(),
        }
    }

    pub fn sender_name(&self) -> &str {
        self.user
            .as_ref()
            .and_then(|u| u.name.as_deref())
            .unwrap_or("Unknown")
    }

    pub fn is_human(&self) -> bool {
        self.user.as_ref().and_then(|u| u.human).unwrap_or(false)
    }

    pub fn text(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }
}

/// Model output for one summary, kept exactly as the model returned it.
///
/// Nothing about its shape is enforced. The accessors below give a lenient
/// typed view for prompt building and logging; persistence always writes
/// the raw document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Summary(Value);

impl Summary {
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// The narrative, when the model returned it as a string.
    pub fn text(&self) -> Option<&str> {
        self.0.get("summary").and_then(Value::as_str)
    }

    /// `summary` as sent, `null` when absent.
    pub fn summary_value(&self) -> Value {
        self.0.get("summary").cloned().unwrap_or(Value::Null)
    }

    /// `flags` as sent, `[]` when absent.
    pub fn flags_value(&self) -> Value {
        self.0
            .get("flags")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()))
    }

    /// Flags that fit the typed view. Entries that do not are skipped here
    /// but stay in the raw document.
    pub fn flags(&self) -> Vec<Flag> {
        self.0
            .get("flags")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for Summary {
    fn default() -> Self {
        Self(serde_json::json!({ "summary": "", "flags": [] }))
    }
}

impl From<Value> for Summary {
    fn from(raw: Value) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicator: Option<Indicator>,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    // severity and anything else the model adds
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Clinical-risk indicator label, kept as the model wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Indicator(String);

/// Known indicator families. Labels are matched loosely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorKind {
    Inconsistency,
    VagueLanguage,
    EngagementAnomaly,
    GamingTheSystem,
    Other,
}

impl Indicator {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> IndicatorKind {
        let normalized: String = self
            .0
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "inconsistency" => IndicatorKind::Inconsistency,
            "vaguelanguage" | "vagueevasivelanguage" | "evasivelanguage" => {
                IndicatorKind::VagueLanguage
            }
            "engagementanomaly" | "engagementlevel" | "engagement" => {
                IndicatorKind::EngagementAnomaly
            }
            "gamingthesystem" | "gaming" => IndicatorKind::GamingTheSystem,
            _ => IndicatorKind::Other,
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Confidence marker on a synthesized flag. Only `low` is requested, other
/// values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Confidence {
    Low,
    Other(String),
}

impl From<String> for Confidence {
    fn from(raw: String) -> Self {
        if raw.eq_ignore_ascii_case("low") {
            Confidence::Low
        } else {
            Confidence::Other(raw)
        }
    }
}

impl From<Confidence> for String {
    fn from(confidence: Confidence) -> Self {
        match confidence {
            Confidence::Low => "low".to_string(),
            Confidence::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Error,
    Done,
}

/// Status update for live clients. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProgressStatus>,
}

impl ProgressEvent {
    pub fn step(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(ProgressStatus::Error),
        }
    }

    pub fn done(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(ProgressStatus::Done),
        }
    }
}

/// Event name on the broadcast channel, sent as the SSE `event:` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Progress,
    Response,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Progress => "progress",
            EventKind::Response => "response",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerEvent {
    pub kind: EventKind,
    pub payload: Value,
}

/// Identifies the artifacts of a single summarization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunKey {
    pub patient_name: String,
    pub timestamp: String,
    /// Set only when another run for the same patient already claimed this second.
    pub suffix: Option<String>,
}

impl RunKey {
    pub fn new(patient_name: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            patient_name: patient_name.into(),
            timestamp: timestamp.into(),
            suffix: None,
        }
    }

    /// `<patient>_<timestamp>[_<suffix>]`, with the patient made filename-safe.
    pub fn stem(&self) -> String {
        let patient = sanitize_component(&self.patient_name);
        match &self.suffix {
            Some(suffix) => format!("{}_{}_{}", patient, self.timestamp, suffix),
            None => format!("{}_{}", patient, self.timestamp),
        }
    }

    pub fn chat_file(&self) -> String {
        format!("chat_{}.json", self.stem())
    }

    pub fn intermediate_file(&self, index: u8) -> String {
        format!("summary_{}_{}.json", self.stem(), index)
    }

    pub fn final_file(&self) -> String {
        format!("summary_{}.txt", self.stem())
    }
}

fn sanitize_component(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect();
    let replaced = replaced.replace("..", "_");
    if replaced.is_empty() {
        "unknown".to_string()
    } else {
        replaced
    }
}
