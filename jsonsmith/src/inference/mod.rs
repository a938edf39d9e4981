//! Structured inference pipeline
//!
//! Each request flows through the same chain on every attempt:
//! ConcurrencyGate -> ModelBackend -> ResponseNormalizer -> SchemaValidator.
//! The RetryOrchestrator drives that chain until one attempt passes every
//! check or the attempt budget is spent.

pub mod backend;
pub mod gate;
pub mod metrics;
pub mod normalize;
pub mod orchestrator;
pub mod sampling;
pub mod schema;

pub use backend::{
    BackendError, ModelBackend, OpenAiCompatBackend, OpenAiCompatConfig, RawGeneration,
    RecordedCall, ScriptedBackend, ScriptedReply,
};
pub use gate::{ConcurrencyGate, GateError};
pub use metrics::{RetryMetrics, RetryMetricsSummary};
pub use normalize::ResponseNormalizer;
pub use orchestrator::{
    AttemptFailure, AttemptResult, FailureKind, InferenceOutcome, InferenceRequest,
    RetryOrchestrator,
};
pub use sampling::SamplingPolicy;
pub use schema::{ParsedPayload, SchemaValidator, ValidationError};
