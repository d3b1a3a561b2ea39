use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use iodriver_core::operations::{GetTenants, GetUsers, SetVolumeQos, StatVolume};
use iodriver_core::workloads::{RateLimitWorkload, SystemConfigWorkload, SystemContent};
use iodriver_core::{
    Capabilities, DriverError, Endpoint, EndpointType, ErrorKind, FnSink, GroupStatus,
    ListenerKind, ObjectApi, Operation, OperationError, OperationGroup, OrchestrationApi,
    QosEventListener, ResultLog, ResultSlot, Tenant, User, ValidatorKind, VolumeDescriptor, VolumeQosSettings,
    WorkloadConfig, WorkloadEventListener,
};
use iodriver_core::{Driver, Workload};

/// In-memory endpoint recording every call it receives.
#[derive(Default)]
struct SpyEndpoint {
    capabilities: Capabilities,
    calls: AtomicU64,
    volumes: Mutex<BTreeMap<String, VolumeQosSettings>>,
    objects: Mutex<HashMap<String, u64>>,
    fail_users: bool,
    log: Mutex<Vec<String>>,
}

impl SpyEndpoint {
    fn orchestration_only() -> Self {
        Self {
            capabilities: EndpointType::OrchestrationManager.into(),
            ..Default::default()
        }
    }

    fn full() -> Self {
        Self {
            capabilities: Capabilities::from(EndpointType::OrchestrationManager)
                .with(EndpointType::ObjectStore),
            ..Default::default()
        }
    }

    fn record(&self, call: String) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(call);
    }
}

#[async_trait]
impl OrchestrationApi for SpyEndpoint {
    async fn list_tenants(&self) -> anyhow::Result<Vec<Tenant>> {
        self.record("list_tenants".into());
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(vec![Tenant {
            id: 1,
            name: "acme".into(),
        }])
    }

    async fn list_volumes(&self) -> anyhow::Result<Vec<VolumeDescriptor>> {
        self.record("list_volumes".into());
        Ok(self
            .volumes
            .lock()
            .iter()
            .map(|(name, qos)| VolumeDescriptor {
                name: name.clone(),
                tenant_id: None,
                qos: qos.clone(),
            })
            .collect())
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        self.record("list_users".into());
        if self.fail_users {
            anyhow::bail!("users service unavailable");
        }
        Ok(vec![User {
            id: 7,
            identifier: "admin".into(),
        }])
    }

    async fn set_volume_qos(&self, settings: &VolumeQosSettings) -> anyhow::Result<()> {
        self.record(format!("set_volume_qos {}", settings.id));
        let mut volumes = self.volumes.lock();
        let entry = volumes
            .values_mut()
            .find(|v| v.id == settings.id)
            .ok_or_else(|| anyhow::anyhow!("no volume with id {}", settings.id))?;
        *entry = settings.clone();
        Ok(())
    }
}

#[async_trait]
impl ObjectApi for SpyEndpoint {
    async fn create_bucket(&self, bucket: &str) -> anyhow::Result<()> {
        self.record("create_bucket".into());
        let mut volumes = self.volumes.lock();
        let id = volumes.len() as u64 + 1;
        volumes.insert(
            bucket.to_string(),
            VolumeQosSettings {
                id,
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> anyhow::Result<()> {
        self.record("delete_bucket".into());
        self.volumes.lock().remove(bucket);
        Ok(())
    }

    async fn put_object(&self, bucket: &str, _key: &str, _content: Bytes) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.objects.lock().entry(bucket.to_string()).or_default() += 1;
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok(())
    }
}

impl Endpoint for SpyEndpoint {
    fn name(&self) -> &str {
        "spy"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn orchestration(&self) -> Option<&dyn OrchestrationApi> {
        self.capabilities
            .contains(EndpointType::OrchestrationManager)
            .then_some(self as &dyn OrchestrationApi)
    }

    fn objects(&self) -> Option<&dyn ObjectApi> {
        self.capabilities
            .contains(EndpointType::ObjectStore)
            .then_some(self as &dyn ObjectApi)
    }
}

/// Workload built from explicit groups, with setup/teardown markers.
struct ScriptedWorkload {
    required: EndpointType,
    groups: Vec<OperationGroup>,
    setup: OperationGroup,
    teardown: OperationGroup,
}

impl Workload for ScriptedWorkload {
    fn name(&self) -> &str {
        "scripted"
    }

    fn required_endpoint_type(&self) -> EndpointType {
        self.required
    }

    fn log_operations(&self) -> bool {
        true
    }

    fn create_operations(&self) -> Vec<OperationGroup> {
        self.groups.clone()
    }

    fn create_setup(&self) -> OperationGroup {
        self.setup.clone()
    }

    fn create_teardown(&self) -> OperationGroup {
        self.teardown.clone()
    }
}

/// Appends its label to a shared journal, optionally failing instead.
struct Mark {
    label: &'static str,
    journal: Arc<Mutex<Vec<&'static str>>>,
    fail: bool,
}

impl Mark {
    fn new(label: &'static str, journal: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn Operation> {
        Arc::new(Self {
            label,
            journal: journal.clone(),
            fail: false,
        })
    }

    fn failing(label: &'static str, journal: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn Operation> {
        Arc::new(Self {
            label,
            journal: journal.clone(),
            fail: true,
        })
    }
}

#[async_trait]
impl Operation for Mark {
    fn description(&self) -> String {
        self.label.to_string()
    }

    async fn execute(
        &self,
        _endpoint: &dyn Endpoint,
        _listener: &dyn WorkloadEventListener,
    ) -> Result<(), OperationError> {
        if self.fail {
            return Err(OperationError::Endpoint(anyhow::anyhow!("{} failed", self.label)));
        }
        self.journal.lock().push(self.label);
        Ok(())
    }
}

fn driver(
    endpoint: Arc<dyn Endpoint>,
    workload: Arc<dyn Workload>,
    listener: Arc<dyn WorkloadEventListener>,
) -> Result<Driver, DriverError> {
    Driver::new(endpoint, workload, listener, ValidatorKind::None.build(0.1))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn system_config_workload_fills_every_field() {
    let content = SystemContent::new();
    let workload = Arc::new(SystemConfigWorkload::new(content.clone(), true));
    let listener = Arc::new(QosEventListener::new());

    let summary = driver(
        Arc::new(SpyEndpoint::orchestration_only()),
        workload,
        listener.clone(),
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    assert!(content.is_complete());
    assert_eq!(content.tenants.get().unwrap()[0].name, "acme");
    assert_eq!(content.users.get().unwrap()[0].identifier, "admin");
    assert!(content.volumes.get().unwrap().is_empty());

    assert_eq!(summary.groups.len(), 3);
    assert_eq!(summary.groups_failed(), 0);
    assert_eq!(summary.operations_executed, 3);
    assert_eq!(listener.operations_executed(), 3);
    assert!(listener.is_finished());
    assert_eq!(summary.result_code(), 0);
    assert!(summary.results.is_some());
}

#[tokio::test]
async fn capability_mismatch_is_rejected_before_anything_runs() {
    let endpoint = Arc::new(SpyEndpoint::orchestration_only());
    let sink_called = Arc::new(AtomicBool::new(false));
    let journal = Arc::new(Mutex::new(Vec::new()));

    let flag = sink_called.clone();
    let get_tenants: Arc<dyn Operation> = Arc::new(GetTenants::new(FnSink::new(
        move |_: Vec<Tenant>| flag.store(true, Ordering::SeqCst),
    )));
    let workload = Arc::new(ScriptedWorkload {
        required: EndpointType::ObjectStore,
        groups: vec![vec![get_tenants]],
        setup: vec![Mark::new("setup", &journal)],
        teardown: vec![Mark::new("teardown", &journal)],
    });

    let err = driver(endpoint.clone(), workload, Arc::new(QosEventListener::new())).unwrap_err();
    assert_matches!(
        err,
        DriverError::EndpointMismatch { ref required, .. }
            if required.contains(EndpointType::ObjectStore)
    );
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!sink_called.load(Ordering::SeqCst));
    assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    assert!(journal.lock().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_group_does_not_affect_siblings() {
    let endpoint = Arc::new(SpyEndpoint {
        fail_users: true,
        ..SpyEndpoint::orchestration_only()
    });
    let users_sink = Arc::new(AtomicBool::new(false));
    let journal = Arc::new(Mutex::new(Vec::new()));

    let flag = users_sink.clone();
    let get_users: Arc<dyn Operation> = Arc::new(GetUsers::new(FnSink::new(move |_: Vec<User>| {
        flag.store(true, Ordering::SeqCst)
    })));
    let workload = Arc::new(ScriptedWorkload {
        required: EndpointType::OrchestrationManager,
        groups: vec![
            vec![Mark::new("a1", &journal), Mark::new("a2", &journal)],
            vec![get_users, Mark::new("never", &journal)],
            vec![Mark::new("c1", &journal)],
        ],
        setup: vec![],
        teardown: vec![],
    });

    let summary = driver(endpoint, workload, Arc::new(QosEventListener::new()))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(!users_sink.load(Ordering::SeqCst));
    assert_eq!(summary.groups_failed(), 1);
    assert_matches!(
        &summary.groups[1].status,
        GroupStatus::Failed { operation, error }
            if operation == "get users" && error.contains("unavailable")
    );
    assert_eq!(summary.groups[0].status, GroupStatus::Completed);
    assert_eq!(summary.groups[2].status, GroupStatus::Completed);

    let journal = journal.lock();
    assert!(!journal.contains(&"never"));
    let a1 = journal.iter().position(|l| *l == "a1").unwrap();
    let a2 = journal.iter().position(|l| *l == "a2").unwrap();
    assert!(a1 < a2);
    assert!(journal.contains(&"c1"));
    assert_eq!(summary.result_code(), 1);
}

#[tokio::test]
async fn setup_runs_first_and_teardown_always_runs() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let workload = Arc::new(ScriptedWorkload {
        required: EndpointType::OrchestrationManager,
        groups: vec![vec![Mark::new("group", &journal)]],
        setup: vec![Mark::new("setup-1", &journal), Mark::new("setup-2", &journal)],
        teardown: vec![
            Mark::failing("teardown-broken", &journal),
            Mark::new("teardown-2", &journal),
        ],
    });

    let summary = driver(
        Arc::new(SpyEndpoint::orchestration_only()),
        workload,
        Arc::new(QosEventListener::new()),
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    assert_eq!(*journal.lock(), vec!["setup-1", "setup-2", "group", "teardown-2"]);
    assert_eq!(summary.teardown_failures.len(), 1);
    assert_eq!(summary.teardown_failures[0].operation, "teardown-broken");
    assert_eq!(summary.result_code(), 1);
}

#[tokio::test]
async fn setup_failure_skips_groups_but_not_teardown() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let listener = Arc::new(QosEventListener::new());
    let workload = Arc::new(ScriptedWorkload {
        required: EndpointType::OrchestrationManager,
        groups: vec![vec![Mark::new("group", &journal)]],
        setup: vec![Mark::failing("setup", &journal)],
        teardown: vec![Mark::new("teardown", &journal)],
    });

    let err = driver(
        Arc::new(SpyEndpoint::orchestration_only()),
        workload,
        listener.clone(),
    )
    .unwrap()
    .run()
    .await
    .unwrap_err();

    assert_matches!(err, DriverError::Setup { ref operation, .. } if operation == "setup");
    assert_eq!(*journal.lock(), vec!["teardown"]);
    assert!(listener.is_finished());
}

#[tokio::test]
async fn operation_on_missing_surface_fails_with_capability_error() {
    let endpoint = SpyEndpoint::orchestration_only();
    let listener = QosEventListener::new();
    let op = iodriver_core::operations::CreateBucket::new("b");
    let err = op.execute(&endpoint, &listener).await.unwrap_err();
    assert_matches!(
        err,
        OperationError::MissingInterface {
            required: EndpointType::ObjectStore,
            ..
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rate_limit_workload_reports_io_for_its_bucket() {
    let mut config = WorkloadConfig::named("rate_limit");
    config.test_duration = Duration::from_millis(100);
    config.warmup_operations = 5;
    config.object_size = 16;
    let workload = Arc::new(RateLimitWorkload::new(250, &config).unwrap());
    let bucket = workload.bucket().to_string();
    let endpoint = Arc::new(SpyEndpoint::full());
    let listener = ListenerKind::Qos.build();

    let summary = driver(endpoint.clone(), workload.clone(), listener.clone())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.groups_failed(), 0);
    let stats = listener.get_stats(&bucket).unwrap();
    assert_eq!(stats.settings.iops_throttle, 250);
    let applied = workload.applied_qos();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].iops_throttle, 250);
    let results = summary.results.unwrap();
    assert_eq!(results["bucket"], bucket.as_str());
    assert_eq!(results["applied_qos"]["iops_throttle"], 250);
    assert_eq!(stats.passes, 1);
    let puts = endpoint.objects.lock()[&bucket];
    // every put after warm-up costs three io units
    assert_eq!(stats.io_count, (puts - 5) * 3);
    assert!(stats.io_count > 0);

    let log = endpoint.log.lock();
    assert_eq!(log.first().map(String::as_str), Some("create_bucket"));
    assert_eq!(log.last().map(String::as_str), Some("delete_bucket"));
    assert!(endpoint.volumes.lock().is_empty());
}

#[test]
fn workload_operations_are_reproducible() {
    let workload = SystemConfigWorkload::new(SystemContent::new(), false);
    let first: Vec<Vec<String>> = workload
        .create_operations()
        .iter()
        .map(|g| g.iter().map(|op| op.description()).collect())
        .collect();
    let second: Vec<Vec<String>> = workload
        .create_operations()
        .iter()
        .map(|g| g.iter().map(|op| op.description()).collect())
        .collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

/// Panics instead of executing.
struct Explode;

#[async_trait]
impl Operation for Explode {
    fn description(&self) -> String {
        "explode".to_string()
    }

    async fn execute(
        &self,
        _endpoint: &dyn Endpoint,
        _listener: &dyn WorkloadEventListener,
    ) -> Result<(), OperationError> {
        panic!("operation exploded")
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_group_keeps_its_index() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let explode: Arc<dyn Operation> = Arc::new(Explode);
    let workload = Arc::new(ScriptedWorkload {
        required: EndpointType::OrchestrationManager,
        groups: vec![
            vec![Mark::new("first", &journal)],
            vec![explode],
            vec![Mark::new("third", &journal)],
        ],
        setup: vec![],
        teardown: vec![Mark::new("teardown", &journal)],
    });

    let summary = driver(
        Arc::new(SpyEndpoint::orchestration_only()),
        workload,
        Arc::new(QosEventListener::new()),
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    let indexes: Vec<usize> = summary.groups.iter().map(|g| g.index).collect();
    assert_eq!(indexes, vec![0, 1, 2]);
    assert_matches!(summary.groups[1].status, GroupStatus::Failed { .. });
    assert_eq!(summary.groups[0].status, GroupStatus::Completed);
    assert_eq!(summary.groups[2].status, GroupStatus::Completed);
    assert_eq!(summary.groups_failed(), 1);
    assert_eq!(summary.result_code(), 1);
    assert!(journal.lock().contains(&"teardown"));
}

#[tokio::test]
async fn stat_volume_appends_every_reading_to_a_log() {
    let endpoint = SpyEndpoint::full();
    let listener = QosEventListener::new();
    endpoint.objects().unwrap().create_bucket("b").await.unwrap();

    let readings = ResultLog::new();
    let target = ResultSlot::new();
    let stat = StatVolume::new("b", readings.clone());
    let apply = SetVolumeQos::new(target.clone());

    stat.execute(&endpoint, &listener).await.unwrap();
    for throttle in [100, 200] {
        target.set(VolumeQosSettings {
            id: 1,
            ..VolumeQosSettings::default().with_iops_throttle(throttle)
        });
        apply.execute(&endpoint, &listener).await.unwrap();
        stat.execute(&endpoint, &listener).await.unwrap();
    }

    assert_eq!(readings.len(), 3);
    let throttles: Vec<u32> = readings.snapshot().iter().map(|q| q.iops_throttle).collect();
    assert_eq!(throttles, vec![0, 100, 200]);

    // a failed lookup delivers nothing
    let missing = StatVolume::new("nope", readings.clone());
    assert_matches!(
        missing.execute(&endpoint, &listener).await,
        Err(OperationError::VolumeNotFound(_))
    );
    assert_eq!(readings.len(), 3);
}
