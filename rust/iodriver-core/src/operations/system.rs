//! Control-plane listings.

use async_trait::async_trait;
use std::sync::Arc;

use crate::endpoint::{Endpoint, Tenant, User, VolumeDescriptor};
use crate::error::OperationError;
use crate::listener::WorkloadEventListener;
use crate::operation::Operation;
use crate::result::ResultSink;

pub struct GetTenants {
    sink: Arc<dyn ResultSink<Vec<Tenant>>>,
}

impl GetTenants {
    pub fn new(sink: impl ResultSink<Vec<Tenant>> + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }
}

#[async_trait]
impl Operation for GetTenants {
    fn description(&self) -> String {
        "get tenants".to_string()
    }

    async fn execute(
        &self,
        endpoint: &dyn Endpoint,
        _listener: &dyn WorkloadEventListener,
    ) -> Result<(), OperationError> {
        let tenants = endpoint.orchestration_api()?.list_tenants().await?;
        self.sink.accept(tenants);
        Ok(())
    }
}

pub struct GetVolumes {
    sink: Arc<dyn ResultSink<Vec<VolumeDescriptor>>>,
}

impl GetVolumes {
    pub fn new(sink: impl ResultSink<Vec<VolumeDescriptor>> + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }
}

#[async_trait]
impl Operation for GetVolumes {
    fn description(&self) -> String {
        "get volumes".to_string()
    }

    async fn execute(
        &self,
        endpoint: &dyn Endpoint,
        _listener: &dyn WorkloadEventListener,
    ) -> Result<(), OperationError> {
        let volumes = endpoint.orchestration_api()?.list_volumes().await?;
        self.sink.accept(volumes);
        Ok(())
    }
}

pub struct GetUsers {
    sink: Arc<dyn ResultSink<Vec<User>>>,
}

impl GetUsers {
    pub fn new(sink: impl ResultSink<Vec<User>> + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }
}

#[async_trait]
impl Operation for GetUsers {
    fn description(&self) -> String {
        "get users".to_string()
    }

    async fn execute(
        &self,
        endpoint: &dyn Endpoint,
        _listener: &dyn WorkloadEventListener,
    ) -> Result<(), OperationError> {
        let users = endpoint.orchestration_api()?.list_users().await?;
        self.sink.accept(users);
        Ok(())
    }
}
