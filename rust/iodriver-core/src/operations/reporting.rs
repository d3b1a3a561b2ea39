//! Operations that drive the listener's volume lifecycle.

use async_trait::async_trait;

use crate::endpoint::Endpoint;
use crate::error::OperationError;
use crate::listener::WorkloadEventListener;
use crate::operation::Operation;
use crate::qos::VolumeQosSettings;
use crate::result::ResultSlot;

/// Registers a volume with the settings an earlier operation produced.
pub struct AddToReporter {
    volume: String,
    settings: ResultSlot<VolumeQosSettings>,
}

impl AddToReporter {
    pub fn new(volume: impl Into<String>, settings: ResultSlot<VolumeQosSettings>) -> Self {
        Self {
            volume: volume.into(),
            settings,
        }
    }
}

#[async_trait]
impl Operation for AddToReporter {
    fn description(&self) -> String {
        format!("add {} to reporter", self.volume)
    }

    async fn execute(
        &self,
        _endpoint: &dyn Endpoint,
        listener: &dyn WorkloadEventListener,
    ) -> Result<(), OperationError> {
        let settings = self
            .settings
            .get()
            .ok_or(OperationError::MissingInput("volume qos settings"))?;
        listener.add_volume(&self.volume, settings)?;
        Ok(())
    }
}

pub struct ReportStart {
    volume: String,
}

impl ReportStart {
    pub fn new(volume: impl Into<String>) -> Self {
        Self {
            volume: volume.into(),
        }
    }
}

#[async_trait]
impl Operation for ReportStart {
    fn description(&self) -> String {
        format!("report start of {}", self.volume)
    }

    async fn execute(
        &self,
        _endpoint: &dyn Endpoint,
        listener: &dyn WorkloadEventListener,
    ) -> Result<(), OperationError> {
        listener.report_start(&self.volume)?;
        Ok(())
    }
}

pub struct ReportStop {
    volume: String,
}

impl ReportStop {
    pub fn new(volume: impl Into<String>) -> Self {
        Self {
            volume: volume.into(),
        }
    }
}

#[async_trait]
impl Operation for ReportStop {
    fn description(&self) -> String {
        format!("report stop of {}", self.volume)
    }

    async fn execute(
        &self,
        _endpoint: &dyn Endpoint,
        listener: &dyn WorkloadEventListener,
    ) -> Result<(), OperationError> {
        listener.report_stop(&self.volume)?;
        Ok(())
    }
}
