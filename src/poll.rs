//! Cancellable timed polling.
//!
//! One abstraction serves both the trigger-acknowledgment wait and the
//! per-reviewer poll in the reconciliation loop: attempt, tick, re-check
//! cancellation, until the deadline. Cancellation comes from the session's
//! sentinel file or an in-process channel and is observed between attempts,
//! so an operator cancel preempts a long wait within one poll interval.

use anyhow::Result;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a poll ended without a result.
#[derive(Debug, PartialEq, Eq)]
pub enum PollResult<T> {
    Found(T),
    TimedOut,
    Cancelled,
}

impl<T> PollResult<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(t) => Some(t),
            _ => None,
        }
    }
}

/// A repeated attempt with a deadline and two cancellation sources.
pub struct Poller {
    interval: Duration,
    sentinel: Option<PathBuf>,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            sentinel: None,
            cancel_rx: None,
        }
    }

    /// Watch a sentinel file; its mere presence means "abort the wait".
    pub fn with_sentinel(mut self, path: PathBuf) -> Self {
        self.sentinel = Some(path);
        self
    }

    /// Watch an in-process cancellation channel.
    pub fn with_channel(mut self, rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(rx);
        self
    }

    fn cancelled(&self) -> bool {
        if let Some(path) = &self.sentinel
            && path.exists()
        {
            return true;
        }
        if let Some(rx) = &self.cancel_rx
            && *rx.borrow()
        {
            return true;
        }
        false
    }

    /// Run `attempt` at the configured interval until it yields a value, the
    /// deadline passes, or a cancellation is observed. The first attempt runs
    /// immediately; cancellation is re-checked before every attempt.
    pub async fn run<T, F, Fut>(&self, deadline: Duration, mut attempt: F) -> Result<PollResult<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let started = Instant::now();
        loop {
            if self.cancelled() {
                return Ok(PollResult::Cancelled);
            }
            if let Some(value) = attempt().await? {
                return Ok(PollResult::Found(value));
            }
            if started.elapsed() + self.interval >= deadline {
                return Ok(PollResult::TimedOut);
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Count-bounded variant: at most `attempts` attempts with `delay`
    /// between them. Used for the trigger-acknowledgment retry budget.
    pub async fn run_attempts<T, F, Fut>(
        &self,
        attempts: u32,
        delay: Duration,
        mut attempt: F,
    ) -> Result<PollResult<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        for n in 0..attempts {
            if self.cancelled() {
                return Ok(PollResult::Cancelled);
            }
            if let Some(value) = attempt().await? {
                return Ok(PollResult::Found(value));
            }
            if n + 1 < attempts {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(PollResult::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;

    fn fast_poller() -> Poller {
        Poller::new(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_found_on_first_attempt() {
        let result = fast_poller()
            .run(Duration::from_millis(100), || async { Ok(Some(42u32)) })
            .await
            .unwrap();
        assert_eq!(result, PollResult::Found(42));
    }

    #[tokio::test]
    async fn test_found_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let result = fast_poller()
            .run(Duration::from_secs(2), move || {
                let calls = calls_clone.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) >= 2 {
                        Ok(Some("ready"))
                    } else {
                        Ok(None)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, PollResult::Found("ready"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_times_out() {
        let result = fast_poller()
            .run(Duration::from_millis(30), || async { Ok(None::<u32>) })
            .await
            .unwrap();
        assert_eq!(result, PollResult::TimedOut);
    }

    #[tokio::test]
    async fn test_sentinel_file_cancels_before_first_attempt() {
        let dir = tempdir().unwrap();
        let sentinel = dir.path().join("cancel.request");
        std::fs::write(&sentinel, "cancel").unwrap();

        let result = fast_poller()
            .with_sentinel(sentinel)
            .run(Duration::from_secs(10), || async { Ok(None::<u32>) })
            .await
            .unwrap();
        assert_eq!(result, PollResult::Cancelled);
    }

    #[tokio::test]
    async fn test_sentinel_appearing_mid_wait_cancels() {
        let dir = tempdir().unwrap();
        let sentinel = dir.path().join("cancel.request");
        let sentinel_clone = sentinel.clone();
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = fast_poller()
            .with_sentinel(sentinel)
            .run(Duration::from_secs(10), move || {
                let attempts = attempts_clone.clone();
                let sentinel = sentinel_clone.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 1 {
                        std::fs::write(&sentinel, "cancel").unwrap();
                    }
                    Ok(None::<u32>)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, PollResult::Cancelled);
    }

    #[tokio::test]
    async fn test_channel_cancel() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let result = fast_poller()
            .with_channel(rx)
            .run(Duration::from_secs(10), || async { Ok(None::<u32>) })
            .await
            .unwrap();
        assert_eq!(result, PollResult::Cancelled);
    }

    #[tokio::test]
    async fn test_run_attempts_honors_the_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let result = fast_poller()
            .run_attempts(4, Duration::ZERO, move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(None::<u32>)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, PollResult::TimedOut);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_run_attempts_stops_on_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let result = fast_poller()
            .run_attempts(5, Duration::ZERO, move || {
                let calls = calls_clone.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 1 {
                        Ok(Some(7u32))
                    } else {
                        Ok(None)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, PollResult::Found(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_attempts_sees_sentinel() {
        let dir = tempdir().unwrap();
        let sentinel = dir.path().join("cancel.request");
        std::fs::write(&sentinel, "cancel").unwrap();
        let result = fast_poller()
            .with_sentinel(sentinel)
            .run_attempts(5, Duration::ZERO, || async { Ok(None::<u32>) })
            .await
            .unwrap();
        assert_eq!(result, PollResult::Cancelled);
    }

    #[tokio::test]
    async fn test_attempt_error_propagates() {
        let result: Result<PollResult<u32>> = fast_poller()
            .run(Duration::from_secs(1), || async {
                anyhow::bail!("platform exploded")
            })
            .await;
        assert!(result.is_err());
    }
}
