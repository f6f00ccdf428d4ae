//! Sliding-window limiter for outbound provider calls.

use crate::core::error::ProviderError;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Allows at most `max_calls` calls within any `window`; callers beyond that wait until the
/// oldest recorded call ages out.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Time until another call may be made, recording the call when that is now.
    async fn try_acquire(&self) -> Option<Duration> {
        let mut calls = self.calls.lock().await;
        let now = Instant::now();
        while calls
            .front()
            .is_some_and(|oldest| now.duration_since(*oldest) >= self.window)
        {
            calls.pop_front();
        }

        if calls.len() < self.max_calls {
            calls.push_back(now);
            return None;
        }
        calls
            .front()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
    }

    /// Waits for a free slot. Fails with `ProviderError::Cancelled` if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), ProviderError> {
        while let Some(wait) = self.try_acquire().await {
            debug!(?wait, "Waiting to maintain rate limit");
            tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_calls_beyond_limit_wait_for_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        limiter.acquire(&cancel).await.unwrap();
        limiter.acquire(&cancel).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire(&cancel).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_calls_do_not_wait() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        limiter.acquire(&cancel).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        limiter.acquire(&cancel).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_is_cancellable() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        cancel.cancel();
        let result = limiter.acquire(&cancel).await;
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }
}
