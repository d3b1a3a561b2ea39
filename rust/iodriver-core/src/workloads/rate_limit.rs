//! Verifies that a volume's IOPS throttle holds under unbounded load.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::WorkloadConfig;
use crate::endpoint::{Capabilities, EndpointType};
use crate::error::ConfigError;
use crate::operation::OperationGroup;
use crate::operations::DeleteBucket;
use crate::qos::VolumeQosSettings;
use crate::result::ResultLog;
use crate::validator::ValidatorKind;
use crate::workload::{Workload, WorkloadFactory};

use super::{bucket_load, bucket_setup};

/// Throttles one fresh bucket to `iops` and hammers it with object puts.
#[derive(Debug, Clone)]
pub struct RateLimitWorkload {
    bucket: String,
    iops: u32,
    test_duration: Duration,
    warmup_operations: u32,
    object_size: usize,
    log_operations: bool,
    applied_qos: ResultLog<VolumeQosSettings>,
}

impl RateLimitWorkload {
    pub fn new(iops: u32, config: &WorkloadConfig) -> Result<Self, ConfigError> {
        if iops == 0 {
            return Err(ConfigError::InvalidWorkload(
                "rate_limit: iops must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            bucket: Uuid::new_v4().to_string(),
            iops,
            test_duration: config.test_duration,
            warmup_operations: config.warmup_operations,
            object_size: config.object_size,
            log_operations: config.log_operations,
            applied_qos: ResultLog::new(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn iops(&self) -> u32 {
        self.iops
    }

    /// QoS settings read back after each setup, one entry per run.
    pub fn applied_qos(&self) -> Vec<VolumeQosSettings> {
        self.applied_qos.snapshot()
    }
}

impl Workload for RateLimitWorkload {
    fn name(&self) -> &str {
        "rate_limit"
    }

    fn required_endpoint_type(&self) -> EndpointType {
        EndpointType::ObjectStore
    }

    fn required_capabilities(&self) -> Capabilities {
        Capabilities::from(EndpointType::ObjectStore).with(EndpointType::OrchestrationManager)
    }

    fn log_operations(&self) -> bool {
        self.log_operations
    }

    fn create_operations(&self) -> Vec<OperationGroup> {
        vec![bucket_load(
            &self.bucket,
            self.object_size,
            self.warmup_operations,
            self.test_duration,
        )]
    }

    fn create_setup(&self) -> OperationGroup {
        let iops = self.iops;
        bucket_setup(
            &self.bucket,
            "throttle to target iops",
            move |current| current.with_iops_throttle(iops),
            &self.applied_qos,
        )
    }

    fn create_teardown(&self) -> OperationGroup {
        vec![Arc::new(DeleteBucket::new(self.bucket.clone()))]
    }

    fn suggested_validator(&self) -> ValidatorKind {
        ValidatorKind::RateLimit
    }

    fn results(&self) -> Option<serde_json::Value> {
        let applied = self.applied_qos.snapshot();
        let last = applied.last()?;
        Some(serde_json::json!({ "bucket": self.bucket, "applied_qos": last }))
    }
}

pub struct RateLimitFactory;

impl WorkloadFactory for RateLimitFactory {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn describe(&self) -> &'static str {
        "throttle one bucket and check measured iops stays under the throttle"
    }

    fn create(&self, config: &WorkloadConfig) -> Result<Box<dyn Workload>, ConfigError> {
        let iops = config.iops.ok_or_else(|| {
            ConfigError::InvalidWorkload("rate_limit: workload.iops is required".to_string())
        })?;
        Ok(Box::new(RateLimitWorkload::new(iops, config)?))
    }
}
