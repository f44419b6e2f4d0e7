//! Process configuration.
//!
//! Everything is resolved once at startup from environment variables with
//! sensible local defaults. Request-level overrides (the `x-api-key` header)
//! take precedence over the process-wide LLM credential at call time, never
//! by mutating this struct.

use std::env;
use std::fs;
use std::path::PathBuf;

/// Filesystem locations used by the backend.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub db_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = discover_data_dir();
        let log_dir = data_dir.join("logs");
        let db_path = data_dir.join("corpora.db");

        for dir in [&data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            log_dir,
            db_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("CORPORA_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("data");
    }

    let xdg = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        home_dir().join(".local/share").to_string_lossy().to_string()
    });
    PathBuf::from(xdg).join("corpora")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Runtime settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the OpenAI-compatible model service.
    pub llm_base_url: String,
    /// Process-wide default API key for the model service, if any.
    pub llm_api_key: Option<String>,
    /// Model used for chat completions.
    pub chat_model: String,
    /// Model used for embeddings.
    pub embedding_model: String,
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters.
    pub chunk_overlap: usize,
}

impl Settings {
    pub fn from_env() -> Self {
        let chunk_size = env_usize("CORPORA_CHUNK_SIZE", 1000);
        let chunk_overlap = env_usize("CORPORA_CHUNK_OVERLAP", 100).min(chunk_size.saturating_sub(1));

        Settings {
            llm_base_url: env::var("CORPORA_LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            llm_api_key: env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            chat_model: env::var("CORPORA_CHAT_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            embedding_model: env::var("CORPORA_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            chunk_size,
            chunk_overlap,
        }
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|val| val.parse::<usize>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_never_reaches_chunk_size() {
        let settings = Settings {
            llm_base_url: String::new(),
            llm_api_key: None,
            chat_model: String::new(),
            embedding_model: String::new(),
            chunk_size: 100,
            chunk_overlap: 100_usize.min(99),
        };
        assert!(settings.chunk_overlap < settings.chunk_size);
    }
}
