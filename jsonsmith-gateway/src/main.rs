//! jsonsmith gateway
//!
//! Serves the structured-inference task endpoints over HTTP.
//!
//! Usage:
//!   jsonsmith-gateway --backend-url http://localhost:8000 --port 8080
//!   jsonsmith-gateway --config jsonsmith.toml
//!   jsonsmith-gateway --backend scripted --scripted-reply '{"sentence": "hi"}'

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use jsonsmith::audit::AuditLog;
use jsonsmith::config::{BackendKind, ServiceConfig};
use jsonsmith::inference::{
    ModelBackend, OpenAiCompatBackend, OpenAiCompatConfig, ResponseNormalizer,
    RetryOrchestrator, ScriptedBackend, ScriptedReply,
};
use jsonsmith::prompt::builtin::BuiltinPromptStore;
use jsonsmith::prompt::{DirPromptStore, PromptStore};
use jsonsmith::server::{self, AppState};
use tokio::net::TcpListener;
use tracing::{error, info};

/// Gateway CLI arguments. Unset options fall back to the config file, then
/// to built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "jsonsmith-gateway")]
#[command(about = "Structured JSON inference gateway")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long, env = "JSONSMITH_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "JSONSMITH_HOST")]
    host: Option<String>,

    /// Port to bind to
    #[arg(long, env = "JSONSMITH_PORT")]
    port: Option<u16>,

    /// Directory for the request audit log
    #[arg(long, env = "JSONSMITH_LOG_PATH")]
    log_path: Option<PathBuf>,

    /// Backend kind (openai, scripted)
    #[arg(long, env = "JSONSMITH_BACKEND")]
    backend: Option<BackendKind>,

    /// Base URL of the OpenAI-compatible completions server
    #[arg(long, env = "JSONSMITH_BACKEND_URL")]
    backend_url: Option<String>,

    /// Model name sent with each completion request
    #[arg(long, env = "JSONSMITH_MODEL_NAME")]
    model_name: Option<String>,

    /// API key for the completions server
    #[arg(long, env = "JSONSMITH_API_KEY")]
    api_key: Option<String>,

    /// Backend request timeout in seconds
    #[arg(long, env = "JSONSMITH_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    #[arg(long, env = "JSONSMITH_GENERATION_MAX_TOKEN")]
    generation_max_token: Option<u32>,

    #[arg(long, env = "JSONSMITH_TOP_P")]
    top_p: Option<f64>,

    #[arg(long, env = "JSONSMITH_TEMPERATURE")]
    temperature: Option<f64>,

    /// Attempts per request, first attempt included
    #[arg(long, env = "JSONSMITH_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Backend calls allowed in flight at once
    #[arg(long, env = "JSONSMITH_MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,

    /// Directory with `<task>.txt` prompt overrides
    #[arg(long, env = "JSONSMITH_PROMPT_DIR")]
    prompt_dir: Option<PathBuf>,

    /// Reply for the scripted backend (repeatable, served in order)
    #[arg(long = "scripted-reply")]
    scripted_replies: Vec<String>,
}

impl Args {
    /// Build the effective configuration.
    /// CLI arguments take precedence over config file values.
    fn merge_with_config(self) -> anyhow::Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let config = ServiceConfig::from_file(path)?;
                info!("Loaded configuration from: {}", path.display());
                config
            }
            None => ServiceConfig::default(),
        };

        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(log_path) = self.log_path {
            config.server.log_path = log_path;
        }
        if let Some(kind) = self.backend {
            config.backend.kind = kind;
        }
        if self.backend_url.is_some() {
            config.backend.url = self.backend_url;
        }
        if let Some(model_name) = self.model_name {
            config.backend.model_name = model_name;
        }
        if self.api_key.is_some() {
            config.backend.api_key = self.api_key;
        }
        if let Some(secs) = self.request_timeout_secs {
            config.backend.request_timeout_secs = secs;
        }
        if !self.scripted_replies.is_empty() {
            config.backend.scripted_replies = self.scripted_replies;
        }
        if let Some(max_token) = self.generation_max_token {
            config.inference.generation_max_token = max_token;
        }
        if let Some(top_p) = self.top_p {
            config.inference.top_p = top_p;
        }
        if let Some(temperature) = self.temperature {
            config.inference.temperature = temperature;
        }
        if let Some(max_retries) = self.max_retries {
            config.inference.max_retries = max_retries;
        }
        if let Some(max_concurrency) = self.max_concurrency {
            config.inference.max_concurrency = max_concurrency;
        }
        if self.prompt_dir.is_some() {
            config.prompts.dir = self.prompt_dir;
        }

        config.validate()?;
        Ok(config)
    }
}

fn build_backend(config: &ServiceConfig) -> anyhow::Result<Arc<dyn ModelBackend>> {
    let backend: Arc<dyn ModelBackend> = match config.backend.kind {
        BackendKind::OpenAi => {
            let base_url = config
                .backend
                .url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("openai backend requires --backend-url"))?;
            Arc::new(OpenAiCompatBackend::new(OpenAiCompatConfig {
                base_url,
                model: config.backend.model_name.clone(),
                api_key: config.backend.api_key.clone(),
                timeout: config.backend.request_timeout(),
            })?)
        }
        BackendKind::Scripted => Arc::new(ScriptedBackend::new(
            config
                .backend
                .scripted_replies
                .iter()
                .cloned()
                .map(ScriptedReply::Text)
                .collect(),
        )),
    };
    Ok(backend)
}

fn build_prompt_store(config: &ServiceConfig) -> anyhow::Result<Arc<dyn PromptStore>> {
    let store: Arc<dyn PromptStore> = match &config.prompts.dir {
        Some(dir) => {
            let store = DirPromptStore::load(dir)?;
            info!(
                "Prompt overrides from {}: {:?}",
                store.base_dir().display(),
                store.overridden().collect::<Vec<_>>()
            );
            Arc::new(store)
        }
        None => Arc::new(BuiltinPromptStore),
    };
    Ok(store)
}

async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    let backend = build_backend(&config)?;
    let orchestrator = RetryOrchestrator::new(backend, config.inference.max_concurrency)
        .with_normalizer(ResponseNormalizer::with_markers(
            config.inference.noise_markers.iter().cloned(),
        ));
    let audit = AuditLog::open(&config.server.log_path).await?;
    info!("Audit log: {}", audit.path().display());

    let state = AppState::new(
        Arc::new(orchestrator),
        build_prompt_store(&config)?,
        Arc::new(audit),
    )
    .with_sampling(config.inference.sampling_policy())
    .with_max_attempts(config.inference.max_retries);

    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    server::serve(listener, Arc::new(state)).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("jsonsmith=info,jsonsmith_gateway=info")
            }),
        )
        .with_ansi(false)
        .init();

    let config = match Args::parse().merge_with_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("jsonsmith gateway starting...");
    info!("Backend: {}", config.backend.kind);
    if let Some(url) = &config.backend.url {
        info!("Backend URL: {}", url);
    }
    info!("Model: {}", config.backend.model_name);
    info!(
        "Max retries: {}, max concurrency: {}",
        config.inference.max_retries, config.inference.max_concurrency
    );

    if let Err(e) = run(config).await {
        error!("Gateway error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
