//! Retry orchestration
//!
//! `run` drives attempts 1..=max_attempts. Each attempt is a self-contained
//! step that returns an [`AttemptResult`]: gate permit -> backend call on the
//! blocking pool -> normalization -> JSON parse -> exact key-set check. The
//! first attempt that passes every stage ends the run with `Success`; if none
//! does, the last failure becomes the terminal `Failure`.
//!
//! All four failure kinds are retryable. Nothing here returns `Err` or panics
//! past `run`: backend errors, non-text output, bad JSON and key mismatches are
//! all folded into an [`InferenceOutcome`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::backend::{ModelBackend, RawGeneration};
use super::gate::ConcurrencyGate;
use super::metrics::RetryMetrics;
use super::normalize::ResponseNormalizer;
use super::sampling::SamplingPolicy;
use super::schema::{ParsedPayload, SchemaValidator, ValidationError};

/// One structured-inference request. Immutable once built.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    prompt: String,
    validator: SchemaValidator,
    max_attempts: u32,
    sampling: SamplingPolicy,
}

impl InferenceRequest {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    pub fn new<I, T>(prompt: impl Into<String>, expected_keys: I, sampling: SamplingPolicy) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            prompt: prompt.into(),
            validator: SchemaValidator::new(expected_keys),
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            sampling,
        }
    }

    /// At least one attempt is always made.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn expected_keys(&self) -> &BTreeSet<String> {
        self.validator.expected_keys()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn sampling(&self) -> &SamplingPolicy {
        &self.sampling
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The backend call failed, panicked or could not be dispatched.
    BackendError,
    /// The backend returned something other than text.
    TypeError,
    /// The normalized text is not valid JSON.
    ParseError,
    /// The JSON is not an object with exactly the expected keys.
    SchemaError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::BackendError => "BackendError",
            FailureKind::TypeError => "TypeError",
            FailureKind::ParseError => "ParseError",
            FailureKind::SchemaError => "SchemaError",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl AttemptFailure {
    fn new(kind: FailureKind, attempt: u32, detail: impl fmt::Display) -> Self {
        Self {
            kind,
            message: format!("{} on attempt {}: {}", kind, attempt, detail),
        }
    }
}

pub type AttemptResult = Result<ParsedPayload, AttemptFailure>;

/// Terminal result of one request. There are no partial outcomes.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutcome {
    Success {
        data: ParsedPayload,
    },
    Failure {
        kind: FailureKind,
        message: String,
        /// Always `None`: an unvalidated payload is never handed back.
        last_payload: Option<ParsedPayload>,
    },
}

impl InferenceOutcome {
    pub const EXHAUSTED_PREFIX: &'static str = "max retries exceeded: ";

    pub fn is_success(&self) -> bool {
        matches!(self, InferenceOutcome::Success { .. })
    }

    pub fn data(&self) -> Option<&ParsedPayload> {
        match self {
            InferenceOutcome::Success { data } => Some(data),
            InferenceOutcome::Failure { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            InferenceOutcome::Success { .. } => None,
            InferenceOutcome::Failure { kind, .. } => Some(*kind),
        }
    }

    fn exhausted(last: AttemptFailure) -> Self {
        InferenceOutcome::Failure {
            kind: last.kind,
            message: format!("{}{}", Self::EXHAUSTED_PREFIX, last.message),
            last_payload: None,
        }
    }
}

/// Owns the gate and the backend handle. Build once at startup and share
/// behind an `Arc`.
pub struct RetryOrchestrator {
    gate: ConcurrencyGate,
    backend: Arc<dyn ModelBackend>,
    normalizer: ResponseNormalizer,
    metrics: RetryMetrics,
}

impl RetryOrchestrator {
    pub fn new(backend: Arc<dyn ModelBackend>, gate_capacity: usize) -> Self {
        Self {
            gate: ConcurrencyGate::new(gate_capacity),
            backend,
            normalizer: ResponseNormalizer::default(),
            metrics: RetryMetrics::new(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: ResponseNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn metrics(&self) -> &RetryMetrics {
        &self.metrics
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub async fn run(&self, request: &InferenceRequest) -> InferenceOutcome {
        let max_attempts = request.max_attempts();
        let mut last_failure = None;

        for attempt in 1..=max_attempts {
            info!(
                attempt,
                max_attempts,
                backend = self.backend.name(),
                "model inference attempt"
            );
            match self.attempt(request, attempt).await {
                Ok(data) => {
                    self.metrics.record_success(attempt);
                    if attempt > 1 {
                        info!(attempt, "inference succeeded after retry");
                    }
                    return InferenceOutcome::Success { data };
                }
                Err(failure) => {
                    self.metrics.record_failure(attempt);
                    warn!(
                        attempt,
                        kind = %failure.kind,
                        message = %failure.message,
                        "inference attempt failed"
                    );
                    last_failure = Some(failure);
                }
            }
        }

        self.metrics.record_exhausted();
        warn!(max_attempts, "model inference max retries exceeded");
        InferenceOutcome::exhausted(last_failure.unwrap_or_else(|| {
            AttemptFailure::new(FailureKind::BackendError, 0, "no attempt was made")
        }))
    }

    /// One pass through gate, backend, normalizer and validator.
    async fn attempt(&self, request: &InferenceRequest, attempt: u32) -> AttemptResult {
        let sampling = request.sampling().for_attempt(attempt);
        let backend = Arc::clone(&self.backend);
        let prompt = request.prompt().to_string();

        let generation = self
            .gate
            .run_blocking(move || backend.generate(&prompt, &sampling))
            .await
            .map_err(|e| AttemptFailure::new(FailureKind::BackendError, attempt, e))?
            .map_err(|e| AttemptFailure::new(FailureKind::BackendError, attempt, e))?;

        let text = match generation {
            RawGeneration::Text(text) => text,
            other => {
                return Err(AttemptFailure::new(
                    FailureKind::TypeError,
                    attempt,
                    format!("expected text from backend, got {}", other.type_name()),
                ))
            }
        };

        let normalized = self.normalizer.normalize(&text);
        request
            .validator
            .validate(&normalized)
            .map_err(|e| classify_validation(attempt, e))
    }
}

fn classify_validation(attempt: u32, error: ValidationError) -> AttemptFailure {
    let kind = match error {
        ValidationError::Parse(_) => FailureKind::ParseError,
        ValidationError::NotAnObject(_) | ValidationError::KeyMismatch { .. } => {
            FailureKind::SchemaError
        }
    };
    AttemptFailure::new(kind, attempt, error)
}
