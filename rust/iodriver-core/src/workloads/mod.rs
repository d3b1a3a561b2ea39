pub mod assured_rate;
pub mod rate_limit;
pub mod system_config;

pub use assured_rate::{AssuredRateFactory, AssuredRateWorkload};
pub use rate_limit::{RateLimitFactory, RateLimitWorkload};
pub use system_config::{SystemConfigFactory, SystemConfigWorkload, SystemContent};

use std::sync::Arc;
use std::time::Duration;

use crate::operation::{Operation, OperationGroup};
use crate::operations::{
    AddToReporter, CreateBucket, CreateObject, DeriveQos, RepeatFor, ReportStart, ReportStop,
    SetVolumeQos, StatVolume,
};
use crate::qos::VolumeQosSettings;
use crate::result::{ResultLog, ResultSlot};

/// Shape of one bucket's load: unreported warm-up puts, then a timed,
/// reported load between start and stop.
pub(crate) fn bucket_load(
    bucket: &str,
    object_size: usize,
    warmup_operations: u32,
    duration: Duration,
) -> OperationGroup {
    let warmup: Arc<dyn Operation> = Arc::new(CreateObject::new(bucket, object_size));
    let load: Arc<dyn Operation> = Arc::new(CreateObject::new(bucket, object_size).reporting());

    let mut group: OperationGroup = Vec::with_capacity(warmup_operations as usize + 3);
    group.extend((0..warmup_operations).map(|_| warmup.clone()));
    group.push(Arc::new(ReportStart::new(bucket)));
    group.push(Arc::new(RepeatFor::new(duration, load)));
    group.push(Arc::new(ReportStop::new(bucket)));
    group
}

/// Creates `bucket`, rewrites its volume QoS through `derive` and registers
/// it with the listener under the applied settings. The settings read back
/// from the platform after the update are appended to `applied`.
pub(crate) fn bucket_setup<F>(
    bucket: &str,
    label: &str,
    derive: F,
    applied: &ResultLog<VolumeQosSettings>,
) -> OperationGroup
where
    F: Fn(VolumeQosSettings) -> VolumeQosSettings + Send + Sync + 'static,
{
    let current = ResultSlot::new();
    let target = ResultSlot::new();
    vec![
        Arc::new(CreateBucket::new(bucket)),
        Arc::new(StatVolume::new(bucket, current.clone())),
        Arc::new(DeriveQos::new(label, current, target.clone(), derive)),
        Arc::new(SetVolumeQos::new(target.clone())),
        Arc::new(StatVolume::new(bucket, applied.clone())),
        Arc::new(AddToReporter::new(bucket, target)),
    ]
}
