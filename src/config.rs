use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // LLM configuration (OpenAI-compatible: Ollama, LM Studio, vLLM, OpenAI, etc.)
    #[serde(default = "default_llm_api_url")]
    pub llm_api_url: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub llm_api_key: Option<String>,

    // Content-addressed blob store
    #[serde(default = "default_content_store_url")]
    pub content_store_url: String,
    #[serde(default)]
    pub content_store_api_key: Option<String>,

    // Vector index (Chroma-compatible REST)
    #[serde(default = "default_vector_index_url")]
    pub vector_index_url: String,

    // Note index document
    #[serde(default = "default_index_path")]
    pub index_path: String,

    // Conversation shape
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    // Note cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_cache_max_age_secs")]
    pub cache_max_age_secs: u64,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    // Outbound HTTP
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_llm_api_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_llm_model() -> String {
    "llama3.2".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_content_store_url() -> String {
    "http://localhost:8787".to_string()
}

fn default_vector_index_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_index_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("archivist")
        .join("notes_index.json")
        .to_string_lossy()
        .into_owned()
}

fn default_max_history() -> usize {
    10
}

fn default_max_turns() -> usize {
    8
}

fn default_cache_capacity() -> usize {
    100
}

fn default_cache_max_age_secs() -> u64 {
    3600
}

fn default_fetch_concurrency() -> usize {
    4
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_url: default_llm_api_url(),
            llm_model: default_llm_model(),
            embedding_model: default_embedding_model(),
            llm_api_key: None,
            content_store_url: default_content_store_url(),
            content_store_api_key: None,
            vector_index_url: default_vector_index_url(),
            index_path: default_index_path(),
            max_history: default_max_history(),
            max_turns: default_max_turns(),
            cache_capacity: default_cache_capacity(),
            cache_max_age_secs: default_cache_max_age_secs(),
            fetch_concurrency: default_fetch_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    /// Path to the config file, next to the executable.
    pub fn config_path() -> PathBuf {
        let base = match env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        };
        base.join("archivist.toml")
    }

    /// Load config from archivist.toml, then apply env-var overrides.
    /// A missing file is not an error; defaults apply.
    pub fn load() -> Self {
        let path = Self::config_path();

        let mut config = if let Ok(contents) = fs::read_to_string(&path) {
            match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to parse {:?}: {}", path, e);
                    Config::default()
                }
            }
        } else {
            tracing::info!("No config file at {:?}, using defaults + env vars", path);
            Config::default()
        };

        config.apply_env();
        config
    }

    // Secrets and endpoints can always come from the environment, taking
    // precedence over the file.
    fn apply_env(&mut self) {
        if let Some(v) = env_nonempty("LLM_API_URL") {
            self.llm_api_url = v;
        }
        if let Some(v) = env_nonempty("LLM_MODEL") {
            self.llm_model = v;
        }
        if let Some(v) = env_nonempty("LLM_API_KEY") {
            self.llm_api_key = Some(v);
        }
        if let Some(v) = env_nonempty("CONTENT_STORE_URL") {
            self.content_store_url = v;
        }
        if let Some(v) = env_nonempty("CONTENT_STORE_API_KEY") {
            self.content_store_api_key = Some(v);
        }
        if let Some(v) = env_nonempty("VECTOR_INDEX_URL") {
            self.vector_index_url = v;
        }
        if let Some(v) = env_nonempty("ARCHIVIST_INDEX_PATH") {
            self.index_path = v;
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
