use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for Supernote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub provider: ProviderConfig,
    pub assistant: AssistantConfig,
    pub poll: PollConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Display name used for idempotent find-or-create of the assistant.
    pub name: String,
    pub model: String,
    pub instructions: String,
    /// Display name used for idempotent find-or-create of the vector store.
    pub store_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Fixed interval between run/indexing status checks.
    pub interval_ms: u64,
    /// Upper bound on any single poll loop before the remote operation is
    /// cancelled and reported as timed out.
    pub timeout_secs: u64,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

const PLACEHOLDER_API_KEY: &str = "PLACEHOLDER_API_KEY";

impl Config {
    /// Load configuration from file with environment variable overrides.
    /// ALWAYS returns a valid config - never fails.
    pub fn load() -> Self {
        // Load environment variables from .env files
        let env_paths = [".env", "../.env"];

        let mut env_loaded = false;
        for path in &env_paths {
            if dotenvy::from_path(path).is_ok() {
                tracing::info!("Loaded .env from: {}", path);
                env_loaded = true;
                break;
            }
        }

        if !env_loaded {
            tracing::debug!("No .env file found - continuing with process env vars only");
        }

        let config_path =
            env::var("SUPERNOTE_CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match serde_yaml::from_str::<Config>(&contents) {
                    Ok(config) => {
                        tracing::info!("Loaded configuration from {}", config_path);
                        config
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to parse config file {}: {} - using defaults",
                            config_path,
                            e
                        );
                        Self::default()
                    }
                },
                Err(e) => {
                    tracing::error!(
                        "Failed to read config file {}: {} - using defaults",
                        config_path,
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::debug!("Config file not found at {} - using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides();

        // Validate configuration - log warnings but don't fail
        if let Err(e) = config.validate() {
            tracing::warn!("Config validation warnings: {} - continuing anyway", e);
        }

        config
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Provider overrides; SUPERNOTE_API_KEY wins over the
        // provider-conventional OPENAI_API_KEY
        if let Ok(api_key) = env::var("SUPERNOTE_API_KEY") {
            self.provider.api_key = api_key;
        } else if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            self.provider.api_key = api_key;
        }
        if let Ok(base_url) = env::var("SUPERNOTE_BASE_URL") {
            self.provider.base_url = base_url;
        }

        // Assistant overrides
        if let Ok(name) = env::var("SUPERNOTE_ASSISTANT_NAME") {
            self.assistant.name = name;
        }
        if let Ok(model) = env::var("SUPERNOTE_MODEL") {
            self.assistant.model = model;
        }
        if let Ok(instructions) = env::var("SUPERNOTE_INSTRUCTIONS") {
            self.assistant.instructions = instructions;
        }
        if let Ok(store_name) = env::var("SUPERNOTE_STORE_NAME") {
            self.assistant.store_name = store_name;
        }

        // Poll overrides
        if let Ok(interval) = env::var("SUPERNOTE_POLL_INTERVAL_MS") {
            if let Ok(interval_ms) = interval.parse() {
                self.poll.interval_ms = interval_ms;
            }
        }
        if let Ok(timeout) = env::var("SUPERNOTE_POLL_TIMEOUT_SECS") {
            if let Ok(timeout_secs) = timeout.parse() {
                self.poll.timeout_secs = timeout_secs;
            }
        }

        // Retry overrides
        if let Ok(attempts) = env::var("SUPERNOTE_RETRY_MAX_ATTEMPTS") {
            if let Ok(max) = attempts.parse() {
                self.retry.max_attempts = max;
            }
        }
        if let Ok(jitter) = env::var("SUPERNOTE_RETRY_JITTER_FACTOR") {
            if let Ok(jitter_val) = jitter.parse() {
                self.retry.jitter_factor = jitter_val;
            }
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.provider.api_key == PLACEHOLDER_API_KEY || self.provider.api_key.is_empty() {
            return Err("SUPERNOTE_API_KEY (or OPENAI_API_KEY) must be set".into());
        }

        if self.provider.base_url.is_empty() {
            return Err("Provider base_url cannot be empty".into());
        }

        if self.poll.interval_ms == 0 {
            return Err("Poll interval cannot be 0".into());
        }
        if self.poll.timeout_secs == 0 {
            return Err("Poll timeout cannot be 0".into());
        }

        if self.retry.max_attempts == 0 {
            return Err("Retry max_attempts cannot be 0".into());
        }
        if self.retry.jitter_factor < 0.0 || self.retry.jitter_factor > 1.0 {
            return Err("Retry jitter factor must be between 0.0 and 1.0".into());
        }

        if self.assistant.name.is_empty() {
            return Err("Assistant name cannot be empty".into());
        }
        if self.assistant.store_name.is_empty() {
            return Err("Vector store name cannot be empty".into());
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig {
                api_key: env::var("SUPERNOTE_API_KEY")
                    .or_else(|_| env::var("OPENAI_API_KEY"))
                    .unwrap_or_else(|_| {
                        tracing::warn!("No API key set, using placeholder");
                        PLACEHOLDER_API_KEY.to_string()
                    }),
                base_url: "https://api.openai.com/v1".to_string(),
            },
            assistant: AssistantConfig {
                name: "SuperNote".to_string(),
                model: "gpt-4o-mini".to_string(),
                instructions: "You are a study assistant answering from a shared pool of \
                               classroom notes. Ground every answer in the attached notes. \
                               You can summarize, explain topics, produce flashcards and \
                               quizzes, or translate the notes on request."
                    .to_string(),
                store_name: "SuperNote Store".to_string(),
            },
            poll: PollConfig {
                interval_ms: 1000,
                timeout_secs: 120,
            },
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 200,
                max_delay_ms: 5000,
                jitter_factor: 0.2,
            },
        }
    }
}
