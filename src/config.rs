//! Configuration - built once at startup and passed by reference
//!
//! Values come from a `.env` file and the process environment; the CLI may
//! override individual fields afterwards. Nothing inside the pipeline reads
//! the environment on its own.

use crate::error::{AgentError, Result};
use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_DB_PATH: &str = "data/ventas.db";
pub const DEFAULT_OUTPUT_DIR: &str = "outputs";

/// Sampling parameters sent with every completion request
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 2048,
            temperature: 0.0,
            top_p: 0.9,
        }
    }
}

impl SamplingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_output_tokens == 0 {
            return Err(AgentError::Config("max_output_tokens must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(AgentError::Config(format!(
                "temperature must be within [0, 1], got {}",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(AgentError::Config(format!(
                "top_p must be within [0, 1], got {}",
                self.top_p
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: Option<String>,
    pub model_id: String,
    pub base_url: String,
    pub sampling: SamplingConfig,
}

/// How to launch the stdio tool server used by the agent command
#[derive(Debug, Clone)]
pub struct ToolServerConfig {
    pub command: PathBuf,
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub db_path: PathBuf,
    pub output_dir: PathBuf,
    /// Rows printed before the preview is cut off
    pub preview_rows: usize,
    pub tool_server: ToolServerConfig,
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut sampling = SamplingConfig::default();
        if let Some(raw) = non_empty("LLM_MAX_TOKENS") {
            sampling.max_output_tokens = parse_number("LLM_MAX_TOKENS", &raw)?;
        }
        if let Some(raw) = non_empty("LLM_TEMPERATURE") {
            sampling.temperature = parse_number("LLM_TEMPERATURE", &raw)?;
        }
        if let Some(raw) = non_empty("LLM_TOP_P") {
            sampling.top_p = parse_number("LLM_TOP_P", &raw)?;
        }
        sampling.validate()?;

        let model = ModelConfig {
            api_key: non_empty("LLM_API_KEY").or_else(|| non_empty("OPENAI_API_KEY")),
            model_id: non_empty("MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: non_empty("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            sampling,
        };

        let tool_server = ToolServerConfig {
            command: non_empty("VENTAS_TOOL_SERVER")
                .map(PathBuf::from)
                .or_else(|| std::env::current_exe().ok())
                .unwrap_or_else(|| PathBuf::from("ventas-agent")),
            args: vec!["serve-tools".to_string()],
        };

        Ok(Self {
            model,
            db_path: non_empty("VENTAS_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            output_dir: non_empty("VENTAS_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            preview_rows: 20,
            tool_server,
        })
    }

    /// The API key, or a startup error when it is missing
    pub fn require_api_key(&self) -> Result<&str> {
        self.model.api_key.as_deref().ok_or_else(|| {
            AgentError::Config(
                "no model API key configured (set LLM_API_KEY or OPENAI_API_KEY in .env)".to_string(),
            )
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| AgentError::Config(format!("{} is not a valid number: {}", key, raw)))
}
