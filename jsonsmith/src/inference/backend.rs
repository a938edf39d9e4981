//! Model backend abstraction
//!
//! The backend is an opaque capability: given a prompt and sampling
//! parameters it produces text. Calls are synchronous and may block for a long
//! time (CPU/accelerator bound or a slow remote server); the orchestrator
//! always runs them on the blocking thread pool behind the concurrency gate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use super::sampling::SamplingPolicy;
use super::schema::json_type_name;

/// Failure reported by a backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed backend response: {0}")]
    Malformed(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Other(String),
}

/// What one backend call produced.
///
/// Backends are expected to return text; anything else is carried through as
/// `Other` so the orchestrator can classify it instead of the backend guessing.
#[derive(Debug, Clone, PartialEq)]
pub enum RawGeneration {
    Text(String),
    Other(Value),
}

impl RawGeneration {
    /// Short name of the payload type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            RawGeneration::Text(_) => "string",
            RawGeneration::Other(value) => json_type_name(value),
        }
    }
}

/// The only boundary the inference core crosses.
///
/// Implementations must be `Send + Sync`: one handle is shared by every
/// in-flight request for the lifetime of the process.
pub trait ModelBackend: Send + Sync {
    fn generate(&self, prompt: &str, sampling: &SamplingPolicy)
        -> Result<RawGeneration, BackendError>;

    fn name(&self) -> &str {
        "backend"
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible completions backend (vLLM, llama.cpp server, ...)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// Calls `POST {base_url}/v1/completions`.
///
/// The HTTP client is async; `generate` blocks the calling (blocking-pool)
/// thread on the runtime handle captured at construction.
pub struct OpenAiCompatBackend {
    config: OpenAiCompatConfig,
    client: reqwest::Client,
    runtime: tokio::runtime::Handle,
}

impl OpenAiCompatBackend {
    /// Must be called from within a tokio runtime.
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, BackendError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BackendError::Unavailable(format!("no tokio runtime: {}", e)))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                BackendError::Unavailable(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            config,
            client,
            runtime,
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/v1/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn request_body(&self, prompt: &str, sampling: &SamplingPolicy) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "prompt": prompt,
            "temperature": sampling.temperature,
            "top_p": sampling.top_p,
            "max_tokens": sampling.max_tokens,
        });
        if !sampling.stop_sequences.is_empty() {
            body["stop"] = json!(sampling.stop_sequences);
        }
        body
    }

    async fn complete(
        &self,
        prompt: &str,
        sampling: &SamplingPolicy,
    ) -> Result<RawGeneration, BackendError> {
        let mut request = self
            .client
            .post(self.completions_url())
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, sampling));
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        parse_completion(&response_json)
    }
}

/// Pull `choices[0].text` out of a completions response.
pub(crate) fn parse_completion(response: &Value) -> Result<RawGeneration, BackendError> {
    let choice = response
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| BackendError::Malformed("response has no choices".to_string()))?;
    match choice.get("text") {
        Some(Value::String(text)) => Ok(RawGeneration::Text(text.trim().to_string())),
        Some(other) => Ok(RawGeneration::Other(other.clone())),
        None => Err(BackendError::Malformed(
            "first choice has no text field".to_string(),
        )),
    }
}

impl ModelBackend for OpenAiCompatBackend {
    fn generate(
        &self,
        prompt: &str,
        sampling: &SamplingPolicy,
    ) -> Result<RawGeneration, BackendError> {
        debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            top_p = sampling.top_p,
            "sending completion request"
        );
        self.runtime.block_on(self.complete(prompt, sampling))
    }

    fn name(&self) -> &str {
        "openai-compat"
    }
}

// ---------------------------------------------------------------------------
// Scripted backend (deterministic replies for tests and dry runs)
// ---------------------------------------------------------------------------

/// One canned reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Other(Value),
    Fail(String),
    /// Panics inside the backend call.
    Panic(String),
}

/// A single call observed by [`ScriptedBackend`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub sampling: SamplingPolicy,
    pub started_at: Instant,
    pub finished_at: Instant,
}

/// Replays a fixed list of replies in order, repeating the last one once
/// the list is exhausted. Records every call it serves.
pub struct ScriptedBackend {
    replies: Vec<ScriptedReply>,
    cursor: AtomicUsize,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies,
            cursor: AtomicUsize::new(0),
            delay: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same text.
    pub fn always(text: impl Into<String>) -> Self {
        Self::new(vec![ScriptedReply::Text(text.into())])
    }

    /// Always fail with the same message.
    pub fn always_failing(message: impl Into<String>) -> Self {
        Self::new(vec![ScriptedReply::Fail(message.into())])
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }

    /// Highest number of calls that were running at the same moment.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Option<ScriptedReply> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        self.replies
            .get(index)
            .or_else(|| self.replies.last())
            .cloned()
    }

    fn record(&self, call: RecordedCall) {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }
    }
}

impl ModelBackend for ScriptedBackend {
    fn generate(
        &self,
        prompt: &str,
        sampling: &SamplingPolicy,
    ) -> Result<RawGeneration, BackendError> {
        let started_at = Instant::now();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let reply = self.next_reply();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.record(RecordedCall {
            prompt: prompt.to_string(),
            sampling: sampling.clone(),
            started_at,
            finished_at: Instant::now(),
        });

        match reply {
            Some(ScriptedReply::Text(text)) => Ok(RawGeneration::Text(text)),
            Some(ScriptedReply::Other(value)) => Ok(RawGeneration::Other(value)),
            Some(ScriptedReply::Fail(message)) => Err(BackendError::Other(message)),
            Some(ScriptedReply::Panic(message)) => panic!("{}", message),
            None => Err(BackendError::Unavailable(
                "scripted backend has no replies".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scripted_backend_replays_in_order_then_repeats_last() {
        let backend = ScriptedBackend::new(vec![
            ScriptedReply::Fail("boom".to_string()),
            ScriptedReply::Text("{}".to_string()),
        ]);
        let sampling = SamplingPolicy::default();

        assert!(backend.generate("p", &sampling).is_err());
        assert_eq!(
            backend.generate("p", &sampling).unwrap(),
            RawGeneration::Text("{}".to_string())
        );
        assert_eq!(
            backend.generate("p", &sampling).unwrap(),
            RawGeneration::Text("{}".to_string())
        );
        assert_eq!(backend.call_count(), 3);
    }

    #[test]
    fn scripted_backend_records_sampling() {
        let backend = ScriptedBackend::always("x");
        let sampling = SamplingPolicy {
            top_p: 0.5,
            ..SamplingPolicy::default()
        };
        backend.generate("hello", &sampling).unwrap();

        let calls = backend.calls();
        assert_eq!(calls[0].prompt, "hello");
        assert_eq!(calls[0].sampling, sampling);
        assert!(calls[0].finished_at >= calls[0].started_at);
    }

    #[test]
    fn empty_script_is_unavailable() {
        let backend = ScriptedBackend::new(Vec::new());
        let err = backend
            .generate("p", &SamplingPolicy::default())
            .unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
    }

    #[test]
    fn parse_completion_reads_first_choice_text() {
        let response = json!({"choices": [{"text": "  {\"a\": 1}\n"}]});
        assert_eq!(
            parse_completion(&response).unwrap(),
            RawGeneration::Text("{\"a\": 1}".to_string())
        );
    }

    #[test]
    fn parse_completion_keeps_non_text_payloads() {
        let response = json!({"choices": [{"text": [1, 2, 3]}]});
        let generation = parse_completion(&response).unwrap();
        assert_eq!(generation.type_name(), "array");
    }

    #[test]
    fn parse_completion_rejects_missing_choices() {
        assert!(matches!(
            parse_completion(&json!({"choices": []})),
            Err(BackendError::Malformed(_))
        ));
        assert!(matches!(
            parse_completion(&json!({"choices": [{"index": 0}]})),
            Err(BackendError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn request_body_carries_sampling_and_stop() {
        let backend = OpenAiCompatBackend::new(OpenAiCompatConfig {
            base_url: "http://localhost:8000/".to_string(),
            model: "m".to_string(),
            api_key: None,
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        let sampling = SamplingPolicy {
            temperature: 0.0,
            top_p: 0.7,
            max_tokens: 64,
            stop_sequences: vec!["<|end_of_text|>".to_string()],
        };

        assert_eq!(
            backend.completions_url(),
            "http://localhost:8000/v1/completions"
        );
        let body = backend.request_body("hi", &sampling);
        assert_eq!(body["top_p"], json!(0.7));
        assert_eq!(body["max_tokens"], json!(64));
        assert_eq!(body["stop"], json!(["<|end_of_text|>"]));
    }
}
