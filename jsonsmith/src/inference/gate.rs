//! Admission control for backend calls.
//!
//! A fixed number of permits bounds how many backend calls run at once. Callers
//! beyond that suspend until a permit frees up; there is no queue limit and no
//! rejection. Waiters are served roughly in arrival order, but that ordering is
//! not part of the contract.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("concurrency gate is closed")]
    Closed,
    #[error("backend task panicked: {0}")]
    Panicked(String),
}

/// Bounded-concurrency gate in front of the model backend.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl ConcurrencyGate {
    pub const DEFAULT_CAPACITY: usize = 2;

    /// Create a gate with `capacity` permits. A capacity of zero would stall
    /// every caller forever, so it is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a permit. The permit is returned to the pool when dropped.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, GateError> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| GateError::Closed)
    }

    /// Run a blocking call on the blocking thread pool while holding one permit.
    ///
    /// The permit moves into the blocking task, so it is released when the
    /// call itself finishes (normally or by panicking), not when the awaiting
    /// caller goes away. Dropping this future does not cancel the call.
    pub async fn run_blocking<F, T>(&self, call: F) -> Result<T, GateError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.acquire().await?;
        debug!(
            available = self.available(),
            capacity = self.capacity,
            "gate permit acquired"
        );

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            call()
        })
        .await
        .map_err(|e| GateError::Panicked(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let gate = ConcurrencyGate::new(0);
        assert_eq!(gate.capacity(), 1);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn permit_is_released_on_drop() {
        let gate = ConcurrencyGate::new(2);
        let permit = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 1);
        drop(permit);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn run_blocking_returns_value_and_releases() {
        let gate = ConcurrencyGate::new(1);
        let value = gate.run_blocking(|| 40 + 2).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn panicking_call_still_releases_permit() {
        let gate = ConcurrencyGate::new(1);
        let result = gate
            .run_blocking(|| -> u32 { panic!("backend exploded") })
            .await;
        assert!(matches!(result, Err(GateError::Panicked(_))));
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_capacity() {
        let gate = ConcurrencyGate::new(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let gate = gate.clone();
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                gate.run_blocking(move || {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(30));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(gate.available(), 2);
    }
}
