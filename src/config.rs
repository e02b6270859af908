//! Application Configuration
//!
//! Loads runtime settings from environment variables with the same
//! defaults the service has always shipped with.

use std::env;
use std::time::Duration;

/// Runtime configuration for the assistant
#[derive(Debug, Clone)]
pub struct Settings {
    // OpenAI
    pub openai_api_key: String,
    pub openai_model: String,
    pub temperature: f32,
    pub max_tokens: u32,

    // RapidAPI (JSearch)
    pub rapidapi_key: String,

    // RAG
    pub retriever_k: usize,

    // Orchestration
    pub upstream_timeout: Duration,
    pub context_window_turns: usize,
    pub max_sessions: usize,
    pub default_language: String,

    // Server
    pub host: String,
    pub port: u16,
}

impl Settings {
    /// Build settings from the process environment. Missing variables
    /// fall back to defaults; API keys default to empty strings and the
    /// owning clients report the misconfiguration per call.
    pub fn from_env() -> Self {
        Self {
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_model: env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-3.5-turbo".to_string()),
            temperature: parse_env("TEMPERATURE", 0.7),
            max_tokens: parse_env("MAX_TOKENS", 1000),
            rapidapi_key: env::var("RAPIDAPI_KEY").unwrap_or_default(),
            retriever_k: parse_env("RETRIEVER_K", 4),
            upstream_timeout: Duration::from_secs(parse_env("UPSTREAM_TIMEOUT_SECS", 15)),
            context_window_turns: parse_env("CONTEXT_WINDOW_TURNS", 6),
            max_sessions: parse_env("MAX_SESSIONS", 1000),
            default_language: env::var("DEFAULT_LANGUAGE").unwrap_or_else(|_| "fr".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_env("PORT", 8000),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            rapidapi_key: String::new(),
            retriever_k: 4,
            upstream_timeout: Duration::from_secs(15),
            context_window_turns: 6,
            max_sessions: 1000,
            default_language: "fr".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
