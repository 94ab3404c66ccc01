use std::time::Duration;

use super::scheduler::StopSignal;

/// Fixed delay between consecutive pairs
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    delay: Option<Duration>,
}

impl RateLimiter {
    /// `0` disables the delay
    pub fn new(rate_limit_ms: u64) -> Self {
        let delay = (rate_limit_ms > 0).then(|| Duration::from_millis(rate_limit_ms));
        Self { delay }
    }

    pub fn is_enabled(&self) -> bool {
        self.delay.is_some()
    }

    pub async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Sleep unless a stop arrives first. Returns false when stopped.
    pub async fn wait_or_cancel(&self, stop: &mut StopSignal) -> bool {
        if stop.is_stopped() {
            return false;
        }

        let slept = tokio::select! {
            _ = self.wait() => true,
            _ = stop.stopped() => false,
        };
        slept && !stop.is_stopped()
    }
}
