//! Per-volume QoS event listeners.
//!
//! Operations report volume registration, start/stop and IO while a workload
//! runs; a reporting layer reads the aggregated [`VolumeQosStats`] afterwards.
//!
//! Every volume owns its own lifecycle lock and IO counter inside a sharded
//! map, so concurrent groups reporting for different volumes never contend,
//! and reports for the same volume only contend on that volume.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ListenerError;
use crate::qos::{VolumeQosSettings, VolumeQosStats, VolumeState};

/// Reporting sink consumed while operations execute.
pub trait WorkloadEventListener: Send + Sync {
    /// Registers `name` (or overwrites its settings if already registered).
    fn add_volume(&self, name: &str, settings: VolumeQosSettings) -> Result<(), ListenerError>;

    fn report_start(&self, name: &str) -> Result<(), ListenerError>;

    fn report_io(&self, name: &str, count: u64) -> Result<(), ListenerError>;

    fn report_stop(&self, name: &str) -> Result<(), ListenerError>;

    /// Audit record of an executed operation, independent of any volume.
    fn report_operation_execution(&self, description: &str);

    fn get_stats(&self, name: &str) -> Result<VolumeQosStats, ListenerError>;

    fn get_volumes(&self) -> BTreeSet<String>;

    /// No further lifecycle calls will follow. Idempotent.
    fn finished(&self);
}

/// Which listener implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerKind {
    #[default]
    Qos,
    Null,
}

impl ListenerKind {
    pub fn build(self) -> Arc<dyn WorkloadEventListener> {
        match self {
            ListenerKind::Qos => Arc::new(QosEventListener::new()),
            ListenerKind::Null => Arc::new(NullEventListener),
        }
    }
}

#[derive(Debug, Clone)]
struct Lifecycle {
    state: VolumeState,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    passes: u32,
}

#[derive(Debug)]
struct VolumeEntry {
    settings: RwLock<VolumeQosSettings>,
    // reporters hold the read side while adding IO; stop takes the write side,
    // so no IO lands after a volume is stopped.
    lifecycle: RwLock<Lifecycle>,
    io_count: AtomicU64,
}

impl VolumeEntry {
    fn new(settings: VolumeQosSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
            lifecycle: RwLock::new(Lifecycle {
                state: VolumeState::Registered,
                started_at: None,
                stopped_at: None,
                passes: 0,
            }),
            io_count: AtomicU64::new(0),
        }
    }
}

/// The QoS-accumulating listener.
#[derive(Debug, Default)]
pub struct QosEventListener {
    volumes: DashMap<String, Arc<VolumeEntry>>,
    operations_executed: AtomicU64,
    finished_at: Mutex<Option<DateTime<Utc>>>,
}

impl QosEventListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operation executions reported so far.
    pub fn operations_executed(&self) -> u64 {
        self.operations_executed.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.lock().is_some()
    }

    fn entry(&self, name: &str) -> Result<Arc<VolumeEntry>, ListenerError> {
        self.volumes
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| ListenerError::UnknownVolume(name.to_string()))
    }

    fn ensure_accepting(&self) -> Result<(), ListenerError> {
        if self.is_finished() {
            Err(ListenerError::Finished)
        } else {
            Ok(())
        }
    }

    fn snapshot(&self, name: &str, entry: &VolumeEntry) -> VolumeQosStats {
        let lifecycle = entry.lifecycle.read();
        let io_count = entry.io_count.load(Ordering::Acquire);
        let settings = entry.settings.read().clone();
        let end = match lifecycle.state {
            VolumeState::Stopped => lifecycle.stopped_at,
            VolumeState::Running => Some((*self.finished_at.lock()).unwrap_or_else(Utc::now)),
            _ => None,
        };
        let elapsed = match (lifecycle.started_at, end) {
            (Some(start), Some(end)) => end.signed_duration_since(start).to_std().ok(),
            _ => None,
        };
        VolumeQosStats {
            name: name.to_string(),
            settings,
            state: lifecycle.state,
            io_count,
            started_at: lifecycle.started_at,
            stopped_at: lifecycle.stopped_at,
            elapsed,
            passes: lifecycle.passes,
        }
    }
}

impl WorkloadEventListener for QosEventListener {
    fn add_volume(&self, name: &str, settings: VolumeQosSettings) -> Result<(), ListenerError> {
        self.ensure_accepting()?;
        match self.volumes.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                debug!(volume = name, "overwriting qos settings of registered volume");
                *existing.get().settings.write() = settings;
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                debug!(volume = name, "registering volume");
                slot.insert(Arc::new(VolumeEntry::new(settings)));
            }
        }
        Ok(())
    }

    fn report_start(&self, name: &str) -> Result<(), ListenerError> {
        self.ensure_accepting()?;
        let entry = self.entry(name)?;
        let mut lifecycle = entry.lifecycle.write();
        match lifecycle.state {
            VolumeState::Registered | VolumeState::Stopped => {
                entry.io_count.store(0, Ordering::Release);
                lifecycle.state = VolumeState::Running;
                lifecycle.started_at = Some(Utc::now());
                lifecycle.stopped_at = None;
                lifecycle.passes += 1;
                debug!(volume = name, pass = lifecycle.passes, "volume started");
                Ok(())
            }
            actual => Err(ListenerError::InvalidState {
                volume: name.to_string(),
                expected: &[VolumeState::Registered, VolumeState::Stopped],
                actual,
            }),
        }
    }

    fn report_io(&self, name: &str, count: u64) -> Result<(), ListenerError> {
        self.ensure_accepting()?;
        let entry = self.entry(name)?;
        let lifecycle = entry.lifecycle.read();
        if lifecycle.state != VolumeState::Running {
            return Err(ListenerError::InvalidState {
                volume: name.to_string(),
                expected: &[VolumeState::Running],
                actual: lifecycle.state,
            });
        }
        entry.io_count.fetch_add(count, Ordering::AcqRel);
        Ok(())
    }

    fn report_stop(&self, name: &str) -> Result<(), ListenerError> {
        self.ensure_accepting()?;
        let entry = self.entry(name)?;
        let mut lifecycle = entry.lifecycle.write();
        if lifecycle.state != VolumeState::Running {
            return Err(ListenerError::InvalidState {
                volume: name.to_string(),
                expected: &[VolumeState::Running],
                actual: lifecycle.state,
            });
        }
        lifecycle.state = VolumeState::Stopped;
        lifecycle.stopped_at = Some(Utc::now());
        debug!(
            volume = name,
            io = entry.io_count.load(Ordering::Acquire),
            "volume stopped"
        );
        Ok(())
    }

    fn report_operation_execution(&self, description: &str) {
        self.operations_executed.fetch_add(1, Ordering::Relaxed);
        debug!(operation = description, "operation executed");
    }

    fn get_stats(&self, name: &str) -> Result<VolumeQosStats, ListenerError> {
        let entry = self.entry(name)?;
        Ok(self.snapshot(name, &entry))
    }

    fn get_volumes(&self) -> BTreeSet<String> {
        self.volumes.iter().map(|e| e.key().clone()).collect()
    }

    fn finished(&self) {
        {
            let mut finished_at = self.finished_at.lock();
            if finished_at.is_some() {
                return;
            }
            *finished_at = Some(Utc::now());
        }
        for name in self.get_volumes() {
            if let Ok(stats) = self.get_stats(&name) {
                info!(
                    volume = %name,
                    state = %stats.state,
                    io = stats.io_count,
                    iops = stats.iops().unwrap_or(0.0),
                    "volume summary"
                );
            }
        }
    }
}

/// Listener that records nothing.
///
/// Registrations are discarded, so the volume set is always empty and every
/// lifecycle or stats call for a volume fails as unregistered.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventListener;

impl WorkloadEventListener for NullEventListener {
    fn add_volume(&self, _name: &str, _settings: VolumeQosSettings) -> Result<(), ListenerError> {
        Ok(())
    }

    fn report_start(&self, name: &str) -> Result<(), ListenerError> {
        Err(ListenerError::UnknownVolume(name.to_string()))
    }

    fn report_io(&self, name: &str, _count: u64) -> Result<(), ListenerError> {
        Err(ListenerError::UnknownVolume(name.to_string()))
    }

    fn report_stop(&self, name: &str) -> Result<(), ListenerError> {
        Err(ListenerError::UnknownVolume(name.to_string()))
    }

    fn report_operation_execution(&self, _description: &str) {}

    fn get_stats(&self, name: &str) -> Result<VolumeQosStats, ListenerError> {
        Err(ListenerError::UnknownVolume(name.to_string()))
    }

    fn get_volumes(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn finished(&self) {}
}
