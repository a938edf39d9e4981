use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inference::normalize::DEFAULT_NOISE_MARKERS;
use crate::inference::SamplingPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Top-level service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub inference: InferenceConfig,
    pub prompts: PromptConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding `log.jsonl`
    pub log_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 80,
            log_path: PathBuf::from("./log/"),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which backend implementation serves generations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI-compatible completions server (vLLM etc.)
    OpenAi,
    /// Canned replies, for dry runs
    Scripted,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::OpenAi => f.write_str("openai"),
            BackendKind::Scripted => f.write_str("scripted"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" | "vllm" => Ok(BackendKind::OpenAi),
            "scripted" | "stub" => Ok(BackendKind::Scripted),
            other => Err(format!(
                "invalid backend '{}'. Use: openai (alias vllm) or scripted (alias stub)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Base URL of the completions server
    pub url: Option<String>,
    pub model_name: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    /// Replies served by the scripted backend, in order
    pub scripted_replies: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::OpenAi,
            url: None,
            model_name: "K-intelligence/Midm-2.0-Base-Instruct".to_string(),
            api_key: None,
            request_timeout_secs: 600,
            scripted_replies: Vec::new(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub temperature: f64,
    pub top_p: f64,
    pub generation_max_token: u32,
    pub stop_sequences: Vec<String>,
    /// Attempts per request, first attempt included
    pub max_retries: u32,
    /// Backend calls allowed in flight at once
    pub max_concurrency: usize,
    pub noise_markers: Vec<String>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        let sampling = SamplingPolicy::default();
        Self {
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            generation_max_token: sampling.max_tokens,
            stop_sequences: sampling.stop_sequences,
            max_retries: 3,
            max_concurrency: 2,
            noise_markers: DEFAULT_NOISE_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl InferenceConfig {
    /// Base sampling policy for every request
    pub fn sampling_policy(&self) -> SamplingPolicy {
        SamplingPolicy {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.generation_max_token,
            stop_sequences: self.stop_sequences.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Directory with `<name>.txt` template overrides
    pub dir: Option<PathBuf>,
}

impl ServiceConfig {
    /// Load a configuration from a TOML file. Missing sections and fields
    /// take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Validate the configuration, collecting every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.inference.max_retries == 0 {
            errors.push("max_retries must be at least 1".to_string());
        }
        if self.inference.max_concurrency == 0 {
            errors.push("max_concurrency must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.inference.top_p) {
            errors.push(format!(
                "top_p must be within [0, 1], got {}",
                self.inference.top_p
            ));
        }
        if self.inference.temperature < 0.0 || self.inference.temperature.is_nan() {
            errors.push(format!(
                "temperature must be non-negative, got {}",
                self.inference.temperature
            ));
        }
        if self.inference.generation_max_token == 0 {
            errors.push("generation_max_token must be greater than 0".to_string());
        }
        match self.backend.kind {
            BackendKind::OpenAi => {
                if self.backend.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                    errors.push("openai backend requires a url".to_string());
                }
            }
            BackendKind::Scripted => {
                if self.backend.scripted_replies.is_empty() {
                    errors.push("scripted backend requires at least one reply".to_string());
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}
