//! Volume QoS policy operations.
//!
//! These chain through [`ResultSlot`]s: one operation stats a volume into a
//! slot, another derives new settings from it, a third applies them. Later
//! operations read their input when they execute, not when constructed.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::OperationError;
use crate::listener::WorkloadEventListener;
use crate::operation::Operation;
use crate::qos::VolumeQosSettings;
use crate::result::{ResultSink, ResultSlot};

/// Reads the current QoS settings of one volume.
pub struct StatVolume {
    volume: String,
    sink: Arc<dyn ResultSink<VolumeQosSettings>>,
}

impl StatVolume {
    pub fn new(volume: impl Into<String>, sink: impl ResultSink<VolumeQosSettings> + 'static) -> Self {
        Self {
            volume: volume.into(),
            sink: Arc::new(sink),
        }
    }
}

#[async_trait]
impl Operation for StatVolume {
    fn description(&self) -> String {
        format!("stat volume {}", self.volume)
    }

    async fn execute(
        &self,
        endpoint: &dyn Endpoint,
        _listener: &dyn WorkloadEventListener,
    ) -> Result<(), OperationError> {
        let volumes = endpoint.orchestration_api()?.list_volumes().await?;
        let descriptor = volumes
            .into_iter()
            .find(|v| v.name == self.volume)
            .ok_or_else(|| OperationError::VolumeNotFound(self.volume.clone()))?;
        self.sink.accept(descriptor.qos);
        Ok(())
    }
}

/// Applies settings produced by an earlier operation.
pub struct SetVolumeQos {
    settings: ResultSlot<VolumeQosSettings>,
}

impl SetVolumeQos {
    pub fn new(settings: ResultSlot<VolumeQosSettings>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Operation for SetVolumeQos {
    fn description(&self) -> String {
        "set volume qos".to_string()
    }

    async fn execute(
        &self,
        endpoint: &dyn Endpoint,
        _listener: &dyn WorkloadEventListener,
    ) -> Result<(), OperationError> {
        let settings = self
            .settings
            .get()
            .ok_or(OperationError::MissingInput("volume qos settings"))?;
        let api = endpoint.orchestration_api()?;
        api.set_volume_qos(&settings).await?;
        debug!(
            volume_id = settings.id,
            assured = settings.iops_assured,
            throttle = settings.iops_throttle,
            "volume qos applied"
        );
        Ok(())
    }
}

type Derivation = dyn Fn(VolumeQosSettings) -> VolumeQosSettings + Send + Sync;

/// Maps settings in one slot to new settings in another, without touching
/// the endpoint.
pub struct DeriveQos {
    label: String,
    source: ResultSlot<VolumeQosSettings>,
    target: ResultSlot<VolumeQosSettings>,
    derive: Box<Derivation>,
}

impl DeriveQos {
    pub fn new<F>(
        label: impl Into<String>,
        source: ResultSlot<VolumeQosSettings>,
        target: ResultSlot<VolumeQosSettings>,
        derive: F,
    ) -> Self
    where
        F: Fn(VolumeQosSettings) -> VolumeQosSettings + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            source,
            target,
            derive: Box::new(derive),
        }
    }
}

#[async_trait]
impl Operation for DeriveQos {
    fn description(&self) -> String {
        format!("derive qos: {}", self.label)
    }

    async fn execute(
        &self,
        _endpoint: &dyn Endpoint,
        _listener: &dyn WorkloadEventListener,
    ) -> Result<(), OperationError> {
        let current = self
            .source
            .get()
            .ok_or(OperationError::MissingInput("volume qos settings"))?;
        self.target.set((self.derive)(current));
        Ok(())
    }
}
