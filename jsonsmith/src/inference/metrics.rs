//! Counters describing how often requests needed retries.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct RetryMetrics {
    /// Every attempt, first or not
    pub total_attempts: AtomicU64,
    /// Attempts after the first that succeeded
    pub successful_retries: AtomicU64,
    /// Attempts after the first that failed
    pub failed_retries: AtomicU64,
    pub first_attempt_successes: AtomicU64,
    pub first_attempt_failures: AtomicU64,
    /// Requests that ran out of attempts
    pub exhausted_requests: AtomicU64,
}

impl RetryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, attempt_number: u32) {
        self.total_attempts.fetch_add(1, Ordering::Relaxed);
        if attempt_number <= 1 {
            self.first_attempt_successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.successful_retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self, attempt_number: u32) {
        self.total_attempts.fetch_add(1, Ordering::Relaxed);
        if attempt_number <= 1 {
            self.first_attempt_failures.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_exhausted(&self) {
        self.exhausted_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> RetryMetricsSummary {
        RetryMetricsSummary {
            total_attempts: self.total_attempts.load(Ordering::Relaxed),
            successful_retries: self.successful_retries.load(Ordering::Relaxed),
            failed_retries: self.failed_retries.load(Ordering::Relaxed),
            first_attempt_successes: self.first_attempt_successes.load(Ordering::Relaxed),
            first_attempt_failures: self.first_attempt_failures.load(Ordering::Relaxed),
            exhausted_requests: self.exhausted_requests.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RetryMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryMetricsSummary {
    pub total_attempts: u64,
    pub successful_retries: u64,
    pub failed_retries: u64,
    pub first_attempt_successes: u64,
    pub first_attempt_failures: u64,
    pub exhausted_requests: u64,
}

impl RetryMetricsSummary {
    /// Successful retries / all retries
    pub fn retry_success_rate(&self) -> f64 {
        let total_retries = self.successful_retries + self.failed_retries;
        if total_retries == 0 {
            0.0
        } else {
            self.successful_retries as f64 / total_retries as f64
        }
    }

    /// All successes / all attempts
    pub fn overall_success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            (self.first_attempt_successes + self.successful_retries) as f64
                / self.total_attempts as f64
        }
    }

    pub fn first_attempt_success_rate(&self) -> f64 {
        let first_attempts = self.first_attempt_successes + self.first_attempt_failures;
        if first_attempts == 0 {
            0.0
        } else {
            self.first_attempt_successes as f64 / first_attempts as f64
        }
    }
}
