//! Pauses between consecutive server requests.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Something that waits between two requests.
///
/// The download loop and the batch driver call [`Throttle::pause`] only
/// between requests, never before the first or after the last one.
#[async_trait]
pub trait Throttle: Send {
    async fn pause(&mut self);
}

/// Sleep for a fixed delay, blocking the (single) task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sleep {
    delay: Duration,
}

impl Sleep {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Throttle for Sleep {
    async fn pause(&mut self) {
        debug!("Throttling; sleep={}sec", self.delay.as_secs_f64());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}
