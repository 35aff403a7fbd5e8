use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Time source driving the submission scheduler. Tests inject a manual
/// implementation instead of waiting on real timers.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
