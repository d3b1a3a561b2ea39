use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::endpoint::Endpoint;
use crate::error::OperationError;
use crate::listener::WorkloadEventListener;
use crate::operation::Operation;

/// Re-runs an inner operation back to back until `duration` has elapsed.
///
/// The deadline is fixed when execution starts; the inner operation in flight
/// at the deadline completes. The first inner failure stops the loop.
pub struct RepeatFor {
    duration: Duration,
    inner: Arc<dyn Operation>,
}

impl RepeatFor {
    pub fn new(duration: Duration, inner: Arc<dyn Operation>) -> Self {
        Self { duration, inner }
    }
}

#[async_trait]
impl Operation for RepeatFor {
    fn description(&self) -> String {
        format!("repeat for {:?}: {}", self.duration, self.inner.description())
    }

    async fn execute(
        &self,
        endpoint: &dyn Endpoint,
        listener: &dyn WorkloadEventListener,
    ) -> Result<(), OperationError> {
        let deadline = Instant::now() + self.duration;
        while Instant::now() < deadline {
            self.inner.execute(endpoint, listener).await?;
            // keep pure in-memory inner operations from starving the runtime
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}
