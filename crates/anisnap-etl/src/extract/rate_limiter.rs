//! Request spacing for the upstream API

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Serializes callers and keeps at least `delay` between two releases.
///
/// Callers queue on a single lock, so concurrent tasks sharing a limiter are
/// spaced out just like sequential calls from one task.
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    last_release: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_release: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait until `delay` has passed since the previous caller was released
    pub async fn wait(&self) {
        let mut last_release = self.last_release.lock().await;

        if let Some(previous) = *last_release {
            tokio::time::sleep_until(previous + self.delay).await;
        }

        *last_release = Some(Instant::now());
    }
}
