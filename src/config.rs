use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Main configuration for the chat summary backend
#[derive(Debug, Deserialize, Validate, Clone)]
pub struct Config {
    /// Interface the HTTP server binds to
    pub server_host: String,

    /// HTTP server port
    #[validate(range(min = 1024, max = 65535))]
    pub server_port: u16,

    /// Directory holding saved chats and summaries
    #[validate(length(min = 1))]
    pub chats_dir: String,

    /// Gemini API key, sent as the `key` query parameter
    #[validate(length(min = 1))]
    pub gemini_api_key: String,

    /// Gemini model name (e.g. gemini-2.5-flash)
    #[validate(length(min = 1))]
    pub gemini_model: String,

    /// Gemini REST base URL, without trailing slash
    pub gemini_base_url: String,

    /// Per-request timeout for LLM calls
    #[validate(range(min = 1, max = 600))]
    pub llm_timeout_secs: u64,

    /// Reasoner service (`host:port`) notified after every saved chat
    pub reasoner_address: Option<String>,

    /// Triple extractor service (`host:port`) that receives `/submit` payloads
    pub triple_extractor_address: Option<String>,

    /// Upper bound on summary length, in sentences
    #[validate(range(min = 1, max = 100))]
    pub summary_sentences: u32,

    /// Number of transcript excerpts the model may pull out
    #[validate(range(min = 1, max = 100))]
    pub summary_excerpts: u32,

    /// Restrict history given to the model to the same patient's chats
    pub history_same_patient_only: bool,

    /// Buffered events per SSE subscriber before it starts lagging
    #[validate(range(min = 1, max = 10000))]
    pub event_capacity: usize,

    /// Allow cross-origin requests from the chat frontend
    pub cors_enabled: bool,

    /// Log level (e.g., info, debug, trace)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 5000,
            chats_dir: "chats".to_string(),
            gemini_api_key: String::new(),
            gemini_model: "gemini-2.5-flash".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            llm_timeout_secs: 120,
            reasoner_address: None,
            triple_extractor_address: None,
            summary_sentences: 12,
            summary_excerpts: 12,
            history_same_patient_only: false,
            event_capacity: 128,
            cors_enabled: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load from `./chatsummary.toml` (if present) and `CHATSUMMARY__*` env vars.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Like [`Config::load`], reading `path` instead of the default file when given.
    pub fn load_from(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let defaults = Config::default();

        let file_source = match path {
            Some(p) => config::File::with_name(p).required(true),
            None => config::File::with_name("chatsummary").required(false),
        };

        let settings = config::Config::builder()
            .set_default("server_host", defaults.server_host)?
            .set_default("server_port", i64::from(defaults.server_port))?
            .set_default("chats_dir", defaults.chats_dir)?
            .set_default("gemini_api_key", defaults.gemini_api_key)?
            .set_default("gemini_model", defaults.gemini_model)?
            .set_default("gemini_base_url", defaults.gemini_base_url)?
            .set_default("llm_timeout_secs", defaults.llm_timeout_secs as i64)?
            .set_default("summary_sentences", i64::from(defaults.summary_sentences))?
            .set_default("summary_excerpts", i64::from(defaults.summary_excerpts))?
            .set_default(
                "history_same_patient_only",
                defaults.history_same_patient_only,
            )?
            .set_default("event_capacity", defaults.event_capacity as i64)?
            .set_default("cors_enabled", defaults.cors_enabled)?
            .set_default("log_level", defaults.log_level)?
            .add_source(file_source)
            // Environment overrides: CHATSUMMARY__SERVER_PORT, CHATSUMMARY__GEMINI_API_KEY, etc.
            .add_source(config::Environment::with_prefix("CHATSUMMARY").separator("__"))
            .build()?;

        let cfg: Config = settings.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    pub fn chats_path(&self) -> PathBuf {
        PathBuf::from(&self.chats_dir)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    /// Returns the bind address as `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
