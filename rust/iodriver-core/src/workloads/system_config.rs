//! Reads the platform's system configuration: tenants, volumes and users.

use serde::Serialize;
use std::sync::Arc;

use crate::config::WorkloadConfig;
use crate::endpoint::{EndpointType, Tenant, User, VolumeDescriptor};
use crate::error::ConfigError;
use crate::operation::{Operation, OperationGroup};
use crate::operations::{GetTenants, GetUsers, GetVolumes};
use crate::result::ResultSlot;
use crate::workload::{Workload, WorkloadFactory};

/// Result container filled by [`SystemConfigWorkload`].
///
/// Each listing lands in its own slot, so the three groups can finish in
/// any order without overwriting each other.
#[derive(Debug, Clone, Default)]
pub struct SystemContent {
    pub tenants: ResultSlot<Vec<Tenant>>,
    pub volumes: ResultSlot<Vec<VolumeDescriptor>>,
    pub users: ResultSlot<Vec<User>>,
}

#[derive(Debug, Clone, Serialize)]
struct SystemContentSnapshot {
    tenants: Option<Vec<Tenant>>,
    volumes: Option<Vec<VolumeDescriptor>>,
    users: Option<Vec<User>>,
}

impl SystemContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.tenants.is_filled() && self.volumes.is_filled() && self.users.is_filled()
    }

    fn snapshot(&self) -> SystemContentSnapshot {
        SystemContentSnapshot {
            tenants: self.tenants.get(),
            volumes: self.volumes.get(),
            users: self.users.get(),
        }
    }
}

pub struct SystemConfigWorkload {
    content: SystemContent,
    log_operations: bool,
}

impl SystemConfigWorkload {
    pub fn new(content: SystemContent, log_operations: bool) -> Self {
        Self {
            content,
            log_operations,
        }
    }

    pub fn content(&self) -> &SystemContent {
        &self.content
    }
}

impl Workload for SystemConfigWorkload {
    fn name(&self) -> &str {
        "system_config"
    }

    fn required_endpoint_type(&self) -> EndpointType {
        EndpointType::OrchestrationManager
    }

    fn log_operations(&self) -> bool {
        self.log_operations
    }

    fn create_operations(&self) -> Vec<OperationGroup> {
        let tenants: Arc<dyn Operation> = Arc::new(GetTenants::new(self.content.tenants.clone()));
        let volumes: Arc<dyn Operation> = Arc::new(GetVolumes::new(self.content.volumes.clone()));
        let users: Arc<dyn Operation> = Arc::new(GetUsers::new(self.content.users.clone()));
        vec![vec![tenants], vec![volumes], vec![users]]
    }

    fn results(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self.content.snapshot()).ok()
    }
}

pub struct SystemConfigFactory;

impl WorkloadFactory for SystemConfigFactory {
    fn name(&self) -> &'static str {
        "system_config"
    }

    fn describe(&self) -> &'static str {
        "list tenants, volumes and users from the orchestration manager"
    }

    fn create(&self, config: &WorkloadConfig) -> Result<Box<dyn Workload>, ConfigError> {
        Ok(Box::new(SystemConfigWorkload::new(
            SystemContent::new(),
            config.log_operations,
        )))
    }
}
