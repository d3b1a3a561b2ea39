//! Verifies that a volume's assured IOPS hold against competing load.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::WorkloadConfig;
use crate::endpoint::{Capabilities, EndpointType};
use crate::error::ConfigError;
use crate::operation::{Operation, OperationGroup};
use crate::operations::DeleteBucket;
use crate::qos::VolumeQosSettings;
use crate::result::ResultLog;
use crate::validator::ValidatorKind;
use crate::workload::{Workload, WorkloadFactory};

use super::{bucket_load, bucket_setup};

/// Assured IOPS every volume gets from the platform regardless of settings.
pub const VOLUME_HARD_MIN: u32 = 20;

/// Smallest headroom above the hard minimums that still yields a measurable
/// difference over the test duration.
pub const MEASURABLE_IO_THRESHOLD: u32 = 50;

/// One assured bucket competing with `competing_buckets` others for a
/// system-wide IOPS budget.
#[derive(Debug, Clone)]
pub struct AssuredRateWorkload {
    assured_bucket: String,
    competing: Vec<String>,
    system_throttle: u32,
    test_duration: Duration,
    warmup_operations: u32,
    object_size: usize,
    log_operations: bool,
    applied_qos: ResultLog<VolumeQosSettings>,
}

impl AssuredRateWorkload {
    pub fn new(
        competing_buckets: u32,
        system_throttle: u32,
        config: &WorkloadConfig,
    ) -> Result<Self, ConfigError> {
        if competing_buckets < 1 {
            return Err(ConfigError::InvalidWorkload(format!(
                "assured_rate: competing_buckets must be at least 1, got {competing_buckets}"
            )));
        }
        if system_throttle < 1 {
            return Err(ConfigError::InvalidWorkload(format!(
                "assured_rate: system_iops_max must be at least 1, got {system_throttle}"
            )));
        }
        let headroom = headroom(competing_buckets, system_throttle);
        if headroom < i64::from(MEASURABLE_IO_THRESHOLD) {
            return Err(ConfigError::InvalidWorkload(format!(
                "assured_rate: with a hard minimum of {VOLUME_HARD_MIN} iops and \
                 {competing_buckets} competing buckets, a system throttle of {system_throttle} \
                 leaves {headroom} iops of headroom, below {MEASURABLE_IO_THRESHOLD}"
            )));
        }

        Ok(Self {
            assured_bucket: Uuid::new_v4().to_string(),
            competing: (0..competing_buckets)
                .map(|_| Uuid::new_v4().to_string())
                .collect(),
            system_throttle,
            test_duration: config.test_duration,
            warmup_operations: config.warmup_operations,
            object_size: config.object_size,
            log_operations: config.log_operations,
            applied_qos: ResultLog::new(),
        })
    }

    pub fn assured_bucket(&self) -> &str {
        &self.assured_bucket
    }

    pub fn competing_buckets(&self) -> &[String] {
        &self.competing
    }

    /// QoS settings read back after setup, assured bucket first, then the
    /// competitors in order.
    pub fn applied_qos(&self) -> Vec<VolumeQosSettings> {
        self.applied_qos.snapshot()
    }

    /// Assured IOPS configured on the assured bucket.
    pub fn test_assured_iops(&self) -> u32 {
        let headroom = headroom(self.competing.len() as u32, self.system_throttle);
        // headroom was validated non-negative at construction
        VOLUME_HARD_MIN + (headroom / 100) as u32
    }

    fn buckets(&self) -> impl Iterator<Item = &String> {
        std::iter::once(&self.assured_bucket).chain(self.competing.iter())
    }
}

fn headroom(competing_buckets: u32, system_throttle: u32) -> i64 {
    i64::from(system_throttle) - (i64::from(competing_buckets) + 1) * i64::from(VOLUME_HARD_MIN)
}

fn assure(assured: u32) -> impl Fn(VolumeQosSettings) -> VolumeQosSettings + Send + Sync + 'static {
    move |current| current.with_iops_assured(assured).with_iops_throttle(0)
}

impl Workload for AssuredRateWorkload {
    fn name(&self) -> &str {
        "assured_rate"
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
        self.buckets()
            .map(|bucket| {
                bucket_load(
                    bucket,
                    self.object_size,
                    self.warmup_operations,
                    self.test_duration,
                )
            })
            .collect()
    }

    fn create_setup(&self) -> OperationGroup {
        let mut setup = bucket_setup(
            &self.assured_bucket,
            "assure test iops",
            assure(self.test_assured_iops()),
            &self.applied_qos,
        );
        for bucket in &self.competing {
            setup.extend(bucket_setup(
                bucket,
                "assure hard minimum",
                assure(VOLUME_HARD_MIN),
                &self.applied_qos,
            ));
        }
        setup
    }

    fn create_teardown(&self) -> OperationGroup {
        self.buckets()
            .map(|bucket| Arc::new(DeleteBucket::new(bucket.clone())) as Arc<dyn Operation>)
            .collect()
    }

    fn suggested_validator(&self) -> ValidatorKind {
        ValidatorKind::AssuredRate
    }

    fn results(&self) -> Option<serde_json::Value> {
        let applied = self.applied_qos.snapshot();
        if applied.is_empty() {
            return None;
        }
        // the log grows by one entry per bucket on every run; report the latest
        let latest = &applied[applied.len().saturating_sub(self.competing.len() + 1)..];
        let buckets: serde_json::Map<String, serde_json::Value> = self
            .buckets()
            .zip(latest)
            .filter_map(|(bucket, qos)| Some((bucket.clone(), serde_json::to_value(qos).ok()?)))
            .collect();
        Some(serde_json::json!({
            "assured_bucket": self.assured_bucket,
            "test_assured_iops": self.test_assured_iops(),
            "applied_qos": buckets,
        }))
    }
}

pub struct AssuredRateFactory;

impl WorkloadFactory for AssuredRateFactory {
    fn name(&self) -> &'static str {
        "assured_rate"
    }

    fn describe(&self) -> &'static str {
        "assure one bucket's iops against competing buckets under a system throttle"
    }

    fn create(&self, config: &WorkloadConfig) -> Result<Box<dyn Workload>, ConfigError> {
        let competing = config.competing_buckets.ok_or_else(|| {
            ConfigError::InvalidWorkload(
                "assured_rate: workload.competing_buckets is required".to_string(),
            )
        })?;
        let throttle = config.system_iops_max.ok_or_else(|| {
            ConfigError::InvalidWorkload(
                "assured_rate: workload.system_iops_max is required".to_string(),
            )
        })?;
        Ok(Box::new(AssuredRateWorkload::new(
            competing, throttle, config,
        )?))
    }
}
