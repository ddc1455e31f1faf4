//! Readiness gating by periodic polling.

use std::future::Future;
use std::time::Duration;

use tracing::trace;

use crate::engine::EngineHandle;
use crate::shutdown::ShutdownSignal;

/// How a wait on the readiness gate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessOutcome {
    /// The predicate returned true.
    Ready,
    /// Shutdown was triggered before the predicate returned true.
    Cancelled,
}

/// Blocks a task until an external condition holds, sleeping between checks.
///
/// Any number of tasks may wait on the same engine at once; the predicate is
/// read-only and queried live on every poll.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessGate {
    poll_interval: Duration,
}

impl ReadinessGate {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Waits until the engine reports it is ready for playback.
    pub async fn wait_until_ready(
        &self,
        engine: &EngineHandle,
        shutdown: &mut ShutdownSignal,
    ) -> ReadinessOutcome {
        self.poll_until(|| engine.is_ready(), shutdown).await
    }

    /// Polls `predicate` every interval until it yields true or shutdown fires.
    ///
    /// There is no upper bound on the wait.
    pub async fn poll_until<F, Fut>(
        &self,
        mut predicate: F,
        shutdown: &mut ShutdownSignal,
    ) -> ReadinessOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let mut polls: u64 = 0;

        loop {
            if shutdown.is_shutdown() {
                return ReadinessOutcome::Cancelled;
            }

            polls += 1;
            if predicate().await {
                trace!(polls, "Readiness predicate satisfied");
                return ReadinessOutcome::Ready;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.recv() => return ReadinessOutcome::Cancelled,
            }
        }
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use tokio::time::Instant;

    use super::*;
    use crate::shutdown::shutdown_channel;
    use crate::test_mocks::MockEngine;

    #[tokio::test(start_paused = true)]
    async fn test_ready_engine_passes_immediately() {
        let engine = Arc::new(MockEngine::ready());
        let handle = EngineHandle::new(engine.clone());
        let (_trigger, mut shutdown) = shutdown_channel();

        let started = Instant::now();
        let outcome = ReadinessGate::default()
            .wait_until_ready(&handle, &mut shutdown)
            .await;

        assert_eq!(outcome, ReadinessOutcome::Ready);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(engine.readiness_checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_engine_becomes_ready() {
        let engine = Arc::new(MockEngine::default());
        let handle = EngineHandle::new(engine.clone());
        let (_trigger, mut shutdown) = shutdown_channel();

        let flip = engine.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            flip.set_ready(true);
        });

        let started = Instant::now();
        let outcome = ReadinessGate::new(Duration::from_secs(1))
            .wait_until_ready(&handle, &mut shutdown)
            .await;

        assert_eq!(outcome, ReadinessOutcome::Ready);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(5), "waited {waited:?}");
        assert!(waited <= Duration::from_secs(6), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_at_interval_without_spinning() {
        let engine = Arc::new(MockEngine::default());
        let handle = EngineHandle::new(engine.clone());
        let (trigger, mut shutdown) = shutdown_channel();

        let gate = ReadinessGate::new(Duration::from_secs(1));
        let waiter =
            tokio::spawn(async move { gate.wait_until_ready(&handle, &mut shutdown).await });

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        let checks = engine.readiness_checks.load(Ordering::SeqCst);
        assert!((10..=12).contains(&checks), "checked {checks} times");

        trigger.fire();
        assert_eq!(waiter.await.unwrap(), ReadinessOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_wait() {
        let engine = Arc::new(MockEngine::default());
        let handle = EngineHandle::new(engine);
        let (trigger, mut shutdown) = shutdown_channel();
        trigger.fire();

        let outcome = ReadinessGate::default()
            .wait_until_ready(&handle, &mut shutdown)
            .await;
        assert_eq!(outcome, ReadinessOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_share_engine() {
        let engine = Arc::new(MockEngine::default());
        let handle = EngineHandle::new(engine.clone());
        let (_trigger, shutdown) = shutdown_channel();
        let gate = ReadinessGate::new(Duration::from_millis(100));

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let handle = handle.clone();
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move { gate.wait_until_ready(&handle, &mut shutdown).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(350)).await;
        engine.set_ready(true);

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), ReadinessOutcome::Ready);
        }
    }
}
