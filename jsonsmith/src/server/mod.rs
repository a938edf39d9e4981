//! HTTP gateway
//!
//! Thin axum layer over the inference pipeline: one POST route per task,
//! plus root, health and stats probes. All task responses share the
//! `{status, msg, data, elapsed_time}` envelope.

pub mod envelope;
pub mod handlers;
pub mod tasks;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::audit::AuditLog;
use crate::inference::{InferenceRequest, RetryOrchestrator, SamplingPolicy};
use crate::prompt::PromptStore;

pub use envelope::ApiResponse;

/// Shared, read-only after startup.
pub struct AppState {
    pub orchestrator: Arc<RetryOrchestrator>,
    pub prompts: Arc<dyn PromptStore>,
    pub audit: Arc<AuditLog>,
    pub sampling: SamplingPolicy,
    pub max_attempts: u32,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<RetryOrchestrator>,
        prompts: Arc<dyn PromptStore>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            orchestrator,
            prompts,
            audit,
            sampling: SamplingPolicy::default(),
            max_attempts: InferenceRequest::DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingPolicy) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health/faq_answer_model", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route(tasks::FAQ_ANSWER.route, post(handlers::faq_answer))
        .route(tasks::INTENT.route, post(handlers::intent))
        .route(tasks::EASY.route, post(handlers::easy))
        .route(tasks::KEYWORD.route, post(handlers::keyword))
        .route(tasks::SUMMARIZATION.route, post(handlers::summarization))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until the listener fails or the process is stopped.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "jsonsmith gateway listening");
    }
    axum::serve(listener, router(state).into_make_service()).await
}
