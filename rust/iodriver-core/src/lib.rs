pub mod config;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod export;
pub mod listener;
pub mod metrics;
pub mod operation;
pub mod operations;
pub mod qos;
pub mod result;
pub mod validator;
pub mod workload;
pub mod workloads;

pub use config::{DriverConfig, DriverConfigFile, EndpointConfig, ValidatorConfig, WorkloadConfig};
pub use driver::Driver;
pub use endpoint::{
    Capabilities, ConnectionParams, Endpoint, EndpointFactory, EndpointType, ObjectApi,
    OrchestrationApi, Tenant, User, VolumeDescriptor,
};
pub use error::{
    ConfigError, DriverError, ErrorKind, ListenerError, OperationError, ResolverError,
};
pub use export::{ExportId, ExportResolver, StubExportResolver, VolumeExportResolver, VolumeLimits};
pub use listener::{ListenerKind, NullEventListener, QosEventListener, WorkloadEventListener};
pub use metrics::{GroupOutcome, GroupStatus, LatencyStats, RunSummary};
pub use operation::{Operation, OperationGroup};
pub use qos::{MediaPolicy, VolumeQosSettings, VolumeQosStats, VolumeState};
pub use result::{FnSink, ResultLog, ResultSink, ResultSlot};
pub use validator::{Validation, Validator, ValidatorKind};
pub use workload::{builtin_factories, find_factory, Workload, WorkloadFactory};
