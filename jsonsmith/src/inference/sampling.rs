//! Sampling parameters for one backend call.

use serde::{Deserialize, Serialize};

/// Amount subtracted from `top_p` for every attempt after the first.
pub const TOP_P_DECAY_PER_ATTEMPT: f64 = 0.1;

/// Generation-control parameters passed to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingPolicy {
    /// Sampling temperature (0.0 = greedy).
    pub temperature: f64,
    /// Nucleus sampling threshold, in [0, 1].
    pub top_p: f64,
    /// Maximum number of tokens to generate.
    pub max_tokens: u32,
    /// Sequences that halt generation, in order.
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_p: 0.8,
            max_tokens: 10240,
            stop_sequences: vec!["<|end_of_text|>".to_string()],
        }
    }
}

impl SamplingPolicy {
    /// Derive the policy used on `attempt` (1-based).
    ///
    /// Only `top_p` changes: `top_p - (attempt - 1) * 0.1`, floored at 0.
    /// The base policy is left untouched.
    pub fn for_attempt(&self, attempt: u32) -> SamplingPolicy {
        let decay = f64::from(attempt.saturating_sub(1)) * TOP_P_DECAY_PER_ATTEMPT;
        SamplingPolicy {
            top_p: (self.top_p - decay).max(0.0),
            ..self.clone()
        }
    }
}
