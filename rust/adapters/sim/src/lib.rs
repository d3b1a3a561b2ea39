//! In-memory stand-in for the storage platform.
//!
//! Serves both the orchestration and the object surface from one process so
//! workloads can run without a cluster. Buckets are volumes; object puts are
//! paced so a volume never exceeds its IOPS throttle, and an optional
//! system-wide budget is shared across all volumes.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use iodriver_core::endpoint::{
    Capabilities, ConnectionParams, Endpoint, EndpointFactory, EndpointType, ObjectApi,
    OrchestrationApi, Tenant, User, VolumeDescriptor,
};
use iodriver_core::operations::CREATE_OBJECT_IO_COST;
use iodriver_core::qos::VolumeQosSettings;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct SimVolume {
    qos: VolumeQosSettings,
    tenant_id: Option<u64>,
    objects: HashMap<String, Bytes>,
    next_slot: Option<Instant>,
}

#[derive(Debug)]
struct SimState {
    tenants: Vec<Tenant>,
    users: Vec<User>,
    volumes: BTreeMap<String, SimVolume>,
    next_volume_id: u64,
    system_next_slot: Option<Instant>,
}

/// Tunables of the simulated platform.
#[derive(Debug, Clone)]
pub struct SimOptions {
    pub capabilities: Capabilities,
    /// System-wide IOPS budget shared by all volumes, 0 for unlimited.
    pub system_iops_max: u32,
    /// Fixed service time added to every call.
    pub latency: Duration,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::from(EndpointType::OrchestrationManager)
                .with(EndpointType::ObjectStore),
            system_iops_max: 0,
            latency: Duration::ZERO,
        }
    }
}

impl SimOptions {
    /// Parses connection options: `capabilities` (`full` | `orchestration` |
    /// `objects`), `system_iops_max` and `latency_us`.
    pub fn from_params(params: &ConnectionParams) -> Result<Self> {
        let mut opts = Self::default();
        if let Some(v) = params.options.get("capabilities") {
            opts.capabilities = match v.as_str() {
                "full" => Self::default().capabilities,
                "orchestration" => EndpointType::OrchestrationManager.into(),
                "objects" => EndpointType::ObjectStore.into(),
                other => bail!("unknown sim capabilities: {other}"),
            };
        }
        if let Some(v) = params.options.get("system_iops_max") {
            opts.system_iops_max = v.parse().context("invalid system_iops_max")?;
        }
        if let Some(v) = params.options.get("latency_us") {
            opts.latency = Duration::from_micros(v.parse().context("invalid latency_us")?);
        }
        Ok(opts)
    }
}

pub struct SimEndpoint {
    options: SimOptions,
    state: Mutex<SimState>,
}

impl SimEndpoint {
    pub fn new(options: SimOptions) -> Self {
        Self {
            options,
            state: Mutex::new(SimState {
                tenants: vec![Tenant {
                    id: 1,
                    name: "default".to_string(),
                }],
                users: vec![User {
                    id: 1,
                    identifier: "admin".to_string(),
                }],
                volumes: BTreeMap::new(),
                next_volume_id: 1,
                system_next_slot: None,
            }),
        }
    }

    pub fn full() -> Self {
        Self::new(SimOptions::default())
    }

    pub fn orchestration_only() -> Self {
        Self::new(SimOptions {
            capabilities: EndpointType::OrchestrationManager.into(),
            ..SimOptions::default()
        })
    }

    /// Adds a volume as if created by an administrator.
    pub fn seed_volume(&self, name: &str, tenant_id: Option<u64>, qos: VolumeQosSettings) {
        let mut state = self.state.lock();
        let id = state.next_volume_id;
        state.next_volume_id += 1;
        state.volumes.insert(
            name.to_string(),
            SimVolume {
                qos: VolumeQosSettings { id, ..qos },
                tenant_id,
                objects: HashMap::new(),
                next_slot: None,
            },
        );
    }

    pub fn object_count(&self, bucket: &str) -> Option<usize> {
        self.state.lock().volumes.get(bucket).map(|v| v.objects.len())
    }

    pub fn volume_qos(&self, name: &str) -> Option<VolumeQosSettings> {
        self.state.lock().volumes.get(name).map(|v| v.qos.clone())
    }

    async fn service_time(&self) {
        if !self.options.latency.is_zero() {
            tokio::time::sleep(self.options.latency).await;
        }
    }
}

/// Reserves the next slot of a pacer running at `iops` for `cost` units and
/// returns when the caller may proceed.
fn reserve(next_slot: &mut Option<Instant>, now: Instant, iops: u32, cost: u64) -> Instant {
    if iops == 0 {
        return now;
    }
    let interval = Duration::from_secs_f64(cost as f64 / f64::from(iops));
    let start = next_slot.map_or(now, |slot| slot.max(now));
    *next_slot = Some(start + interval);
    start
}

#[async_trait]
impl OrchestrationApi for SimEndpoint {
    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        self.service_time().await;
        Ok(self.state.lock().tenants.clone())
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeDescriptor>> {
        self.service_time().await;
        let state = self.state.lock();
        Ok(state
            .volumes
            .iter()
            .map(|(name, v)| VolumeDescriptor {
                name: name.clone(),
                tenant_id: v.tenant_id,
                qos: v.qos.clone(),
            })
            .collect())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.service_time().await;
        Ok(self.state.lock().users.clone())
    }

    async fn set_volume_qos(&self, settings: &VolumeQosSettings) -> Result<()> {
        self.service_time().await;
        let mut state = self.state.lock();
        let Some((name, volume)) = state
            .volumes
            .iter_mut()
            .find(|(_, v)| v.qos.id == settings.id)
        else {
            bail!("no volume with id {}", settings.id);
        };
        debug!(
            volume = %name,
            assured = settings.iops_assured,
            throttle = settings.iops_throttle,
            "sim volume qos updated"
        );
        volume.qos = settings.clone();
        // a new throttle takes effect from the next put
        volume.next_slot = None;
        Ok(())
    }
}

#[async_trait]
impl ObjectApi for SimEndpoint {
    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.service_time().await;
        if self.state.lock().volumes.contains_key(bucket) {
            bail!("bucket {bucket} already exists");
        }
        self.seed_volume(bucket, None, VolumeQosSettings::default());
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.service_time().await;
        if self.state.lock().volumes.remove(bucket).is_none() {
            bail!("bucket {bucket} does not exist");
        }
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, content: Bytes) -> Result<()> {
        let ready_at = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(volume) = state.volumes.get_mut(bucket) else {
                bail!("bucket {bucket} does not exist");
            };
            let now = Instant::now();
            let throttle = volume.qos.iops_throttle;
            let volume_ready = reserve(&mut volume.next_slot, now, throttle, CREATE_OBJECT_IO_COST);
            volume.objects.insert(key.to_string(), content);
            let system_iops = self.options.system_iops_max;
            let system_ready = reserve(&mut state.system_next_slot, now, system_iops, CREATE_OBJECT_IO_COST);
            system_ready.max(volume_ready)
        };
        tokio::time::sleep_until(ready_at).await;
        self.service_time().await;
        Ok(())
    }
}

impl Endpoint for SimEndpoint {
    fn name(&self) -> &str {
        "sim"
    }

    fn capabilities(&self) -> Capabilities {
        self.options.capabilities.clone()
    }

    fn orchestration(&self) -> Option<&dyn OrchestrationApi> {
        self.options
            .capabilities
            .contains(EndpointType::OrchestrationManager)
            .then_some(self as &dyn OrchestrationApi)
    }

    fn objects(&self) -> Option<&dyn ObjectApi> {
        self.options
            .capabilities
            .contains(EndpointType::ObjectStore)
            .then_some(self as &dyn ObjectApi)
    }
}

pub struct SimFactory;

impl EndpointFactory for SimFactory {
    fn name(&self) -> &'static str {
        "sim"
    }

    fn create(&self, params: &ConnectionParams) -> Result<Box<dyn Endpoint>> {
        Ok(Box::new(SimEndpoint::new(SimOptions::from_params(params)?)))
    }
}
