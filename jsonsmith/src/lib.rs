// jsonsmith Library
// Structured (JSON) answers from a large-language-model backend, with bounded
// concurrency, per-attempt sampling decay and exact key-set validation.

pub mod audit;
pub mod config;
pub mod inference;
pub mod prompt;
#[cfg(feature = "server")]
pub mod server;

pub use inference::{
    ConcurrencyGate, FailureKind, InferenceOutcome, InferenceRequest, ModelBackend,
    RawGeneration, ResponseNormalizer, RetryOrchestrator, SamplingPolicy, SchemaValidator,
};
pub use prompt::{render_template, PromptStore, PromptTemplate};
