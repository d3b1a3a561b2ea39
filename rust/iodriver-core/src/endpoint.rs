use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::OperationError;
use crate::qos::VolumeQosSettings;

/// A managed-system API surface a workload can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointType {
    /// Control plane: tenants, volumes, users, QoS policy.
    OrchestrationManager,
    /// Data plane: buckets and objects.
    ObjectStore,
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointType::OrchestrationManager => write!(f, "orchestration-manager"),
            EndpointType::ObjectStore => write!(f, "object-store"),
        }
    }
}

/// Set of endpoint types an endpoint satisfies or a workload requires.
///
/// Matching is a subset check, so one endpoint can serve several workload
/// kinds without any hierarchy between them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities(BTreeSet<EndpointType>);

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tag: EndpointType) -> Self {
        self.0.insert(tag);
        self
    }

    pub fn contains(&self, tag: EndpointType) -> bool {
        self.0.contains(&tag)
    }

    /// True when every tag in `required` is present in `self`.
    pub fn satisfies(&self, required: &Capabilities) -> bool {
        required.0.is_subset(&self.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = EndpointType> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<EndpointType> for Capabilities {
    fn from(tag: EndpointType) -> Self {
        Capabilities::new().with(tag)
    }
}

impl FromIterator<EndpointType> for Capabilities {
    fn from_iter<I: IntoIterator<Item = EndpointType>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<String> = self.0.iter().map(|t| t.to_string()).collect();
        write!(f, "[{}]", tags.join(", "))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub uri: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub identifier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeDescriptor {
    pub name: String,
    #[serde(default)]
    pub tenant_id: Option<u64>,
    pub qos: VolumeQosSettings,
}

/// Control-plane calls exposed by endpoints tagged
/// [`EndpointType::OrchestrationManager`].
#[async_trait]
pub trait OrchestrationApi: Send + Sync {
    async fn list_tenants(&self) -> anyhow::Result<Vec<Tenant>>;

    async fn list_volumes(&self) -> anyhow::Result<Vec<VolumeDescriptor>>;

    async fn list_users(&self) -> anyhow::Result<Vec<User>>;

    async fn set_volume_qos(&self, settings: &VolumeQosSettings) -> anyhow::Result<()>;
}

/// Data-plane calls exposed by endpoints tagged [`EndpointType::ObjectStore`].
#[async_trait]
pub trait ObjectApi: Send + Sync {
    async fn create_bucket(&self, bucket: &str) -> anyhow::Result<()>;

    async fn delete_bucket(&self, bucket: &str) -> anyhow::Result<()>;

    async fn put_object(&self, bucket: &str, key: &str, content: Bytes) -> anyhow::Result<()>;
}

/// Handle onto the managed system. Declares the endpoint types it satisfies
/// and hands out the matching API surfaces.
pub trait Endpoint: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    fn orchestration(&self) -> Option<&dyn OrchestrationApi> {
        None
    }

    fn objects(&self) -> Option<&dyn ObjectApi> {
        None
    }
}

impl<'a> dyn Endpoint + 'a {
    /// The control-plane surface, or a [`OperationError::MissingInterface`].
    pub fn orchestration_api(&self) -> Result<&dyn OrchestrationApi, OperationError> {
        self.orchestration()
            .ok_or_else(|| OperationError::MissingInterface {
                endpoint: self.name().to_string(),
                required: EndpointType::OrchestrationManager,
            })
    }

    /// The data-plane surface, or a [`OperationError::MissingInterface`].
    pub fn object_api(&self) -> Result<&dyn ObjectApi, OperationError> {
        self.objects().ok_or_else(|| OperationError::MissingInterface {
            endpoint: self.name().to_string(),
            required: EndpointType::ObjectStore,
        })
    }
}

/// Creates endpoint instances from connection parameters.
pub trait EndpointFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn create(&self, params: &ConnectionParams) -> anyhow::Result<Box<dyn Endpoint>>;
}
