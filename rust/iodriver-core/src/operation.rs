use async_trait::async_trait;
use std::sync::Arc;

use crate::endpoint::Endpoint;
use crate::error::OperationError;
use crate::listener::WorkloadEventListener;

/// An atomic unit of work against an endpoint.
///
/// Operations carry no mutable execution state of their own; results leave
/// through the sinks captured at construction, which are only invoked on
/// success. The same instance may be shared across groups.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Human-readable description, used for logging and auditing.
    fn description(&self) -> String;

    async fn execute(
        &self,
        endpoint: &dyn Endpoint,
        listener: &dyn WorkloadEventListener,
    ) -> Result<(), OperationError>;
}

/// Operations that must run in declared order on one task.
pub type OperationGroup = Vec<Arc<dyn Operation>>;
