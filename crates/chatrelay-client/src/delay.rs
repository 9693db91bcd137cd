//! Wait primitive used between retry attempts

use std::time::Duration;

use async_trait::async_trait;

/// Suspends the caller for a duration
///
/// Injected into the stream consumer so retry timing can be observed in
/// tests without sleeping.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Delay backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
