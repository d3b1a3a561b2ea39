use std::sync::Arc;

use crate::config::WorkloadConfig;
use crate::endpoint::{Capabilities, EndpointType};
use crate::error::ConfigError;
use crate::operation::OperationGroup;
use crate::validator::ValidatorKind;

/// A declarative bundle of operation groups targeting one endpoint type.
///
/// Workloads are immutable once constructed and every `create_*` call may be
/// repeated; side effects only happen when the returned operations execute.
pub trait Workload: Send + Sync {
    fn name(&self) -> &str;

    fn required_endpoint_type(&self) -> EndpointType;

    /// Every capability the endpoint must provide.
    fn required_capabilities(&self) -> Capabilities {
        self.required_endpoint_type().into()
    }

    /// Mirror each executed operation to the `iodriver::operations` log target.
    fn log_operations(&self) -> bool;

    /// Independent groups; operations inside a group run in order.
    fn create_operations(&self) -> Vec<OperationGroup>;

    /// Runs sequentially before any group starts.
    fn create_setup(&self) -> OperationGroup {
        Vec::new()
    }

    /// Runs sequentially after every group finished, even when groups failed.
    fn create_teardown(&self) -> OperationGroup {
        Vec::new()
    }

    /// The validator this workload is usually judged by.
    fn suggested_validator(&self) -> ValidatorKind {
        ValidatorKind::None
    }

    /// Results collected through the workload's own sinks, for the run summary.
    fn results(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Named constructor of a workload from configuration.
pub trait WorkloadFactory: Send + Sync {
    /// Name used for selection on the command line and in config files.
    fn name(&self) -> &'static str;

    fn describe(&self) -> &'static str;

    fn create(&self, config: &WorkloadConfig) -> Result<Box<dyn Workload>, ConfigError>;
}

/// Every workload factory shipped with the core crate.
pub fn builtin_factories() -> Vec<Arc<dyn WorkloadFactory>> {
    vec![
        Arc::new(crate::workloads::SystemConfigFactory),
        Arc::new(crate::workloads::RateLimitFactory),
        Arc::new(crate::workloads::AssuredRateFactory),
    ]
}

/// Looks a factory up by name.
pub fn find_factory(name: &str) -> Result<Arc<dyn WorkloadFactory>, ConfigError> {
    builtin_factories()
        .into_iter()
        .find(|f| f.name() == name)
        .ok_or_else(|| ConfigError::UnknownWorkload(name.to_string()))
}

