//! Mapping between protocol export handles and internal volume names.
//!
//! A protocol front end (e.g. NFS) addresses volumes by a small integer
//! export id. The resolver translates in both directions, holds the per-volume
//! object size and capacity limits the front end must enforce, and notifies
//! subscribers before a volume's mapping goes away.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{info, warn};

use crate::endpoint::VolumeDescriptor;
use crate::error::{HandlerFailure, ResolverError};

/// Protocol-scoped export handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExportId(pub u32);

impl fmt::Display for ExportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-volume limits the protocol layer enforces before accepting writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeLimits {
    /// Maximum object (block) size in bytes.
    pub object_size: u64,
    /// Maximum volume capacity in bytes.
    pub max_capacity: u64,
}

impl Default for VolumeLimits {
    fn default() -> Self {
        Self {
            object_size: 1024 * 1024,
            max_capacity: 1024 * 1024 * 1024 * 1024,
        }
    }
}

/// Callback invoked with the volume name before its export is removed.
pub type VolumeDeleteHandler = Box<dyn Fn(&str) -> anyhow::Result<()> + Send + Sync>;

pub trait ExportResolver: Send + Sync {
    /// All currently exported volume names.
    fn export_names(&self) -> Vec<String>;

    fn nfs_export_id(&self, volume: &str) -> Result<ExportId, ResolverError>;

    fn volume_name(&self, export_id: ExportId) -> Result<String, ResolverError>;

    fn exists(&self, volume: &str) -> bool;

    fn object_size(&self, volume: &str) -> Result<u64, ResolverError>;

    fn max_volume_capacity_in_bytes(&self, volume: &str) -> Result<u64, ResolverError>;

    fn add_volume_delete_event_handler(&self, handler: VolumeDeleteHandler);

    /// Rejects an object write larger than the volume's object size.
    fn check_object_write(&self, volume: &str, len: u64) -> Result<(), ResolverError> {
        let limit = self.object_size(volume)?;
        if len > limit {
            return Err(ResolverError::ObjectTooLarge {
                volume: volume.to_string(),
                len,
                limit,
            });
        }
        Ok(())
    }

    /// Rejects growth of a volume past its capacity.
    fn check_capacity(&self, volume: &str, used: u64, additional: u64) -> Result<(), ResolverError> {
        let limit = self.max_volume_capacity_in_bytes(volume)?;
        let requested = used.saturating_add(additional);
        if requested > limit {
            return Err(ResolverError::CapacityExceeded {
                volume: volume.to_string(),
                requested,
                limit,
            });
        }
        Ok(())
    }
}

/// Resolver over exactly one fixed volume, for tests and local tooling.
pub struct StubExportResolver {
    volume: String,
    export_id: ExportId,
    limits: VolumeLimits,
    handlers: Mutex<Vec<VolumeDeleteHandler>>,
}

impl StubExportResolver {
    pub fn new(volume: impl Into<String>, export_id: ExportId, limits: VolumeLimits) -> Self {
        Self {
            volume: volume.into(),
            export_id,
            limits,
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    fn check(&self, volume: &str) -> Result<(), ResolverError> {
        if volume == self.volume {
            Ok(())
        } else {
            Err(ResolverError::UnknownVolume(volume.to_string()))
        }
    }
}

impl ExportResolver for StubExportResolver {
    fn export_names(&self) -> Vec<String> {
        vec![self.volume.clone()]
    }

    fn nfs_export_id(&self, volume: &str) -> Result<ExportId, ResolverError> {
        self.check(volume)?;
        Ok(self.export_id)
    }

    fn volume_name(&self, export_id: ExportId) -> Result<String, ResolverError> {
        if export_id == self.export_id {
            Ok(self.volume.clone())
        } else {
            Err(ResolverError::UnknownExport(export_id))
        }
    }

    fn exists(&self, volume: &str) -> bool {
        volume == self.volume
    }

    fn object_size(&self, volume: &str) -> Result<u64, ResolverError> {
        self.check(volume)?;
        Ok(self.limits.object_size)
    }

    fn max_volume_capacity_in_bytes(&self, volume: &str) -> Result<u64, ResolverError> {
        self.check(volume)?;
        Ok(self.limits.max_capacity)
    }

    fn add_volume_delete_event_handler(&self, handler: VolumeDeleteHandler) {
        self.handlers.lock().push(handler);
    }
}

#[derive(Debug, Clone, Copy)]
struct Export {
    id: ExportId,
    limits: VolumeLimits,
}

#[derive(Debug, Default)]
struct ExportTable {
    by_name: HashMap<String, Export>,
    by_id: BTreeMap<ExportId, String>,
}

impl ExportTable {
    fn lowest_free_id(&self) -> Option<ExportId> {
        // ids start at 1; 0 is the pseudo-root of the export namespace
        let mut candidate = 1u32;
        for id in self.by_id.keys() {
            if id.0 > candidate {
                break;
            }
            if id.0 == candidate {
                candidate = candidate.checked_add(1)?;
            }
        }
        Some(ExportId(candidate))
    }
}

/// Dynamic resolver over the platform's volume list.
///
/// Lookups take a shared lock and may run from any number of protocol
/// requests concurrently; `add_volume`/`remove_volume`/`reconcile` are
/// administrative and expected to be serialized by the caller.
#[derive(Default)]
pub struct VolumeExportResolver {
    table: RwLock<ExportTable>,
    handlers: RwLock<Vec<Arc<VolumeDeleteHandler>>>,
    default_limits: VolumeLimits,
}

impl VolumeExportResolver {
    pub fn new(default_limits: VolumeLimits) -> Self {
        Self {
            table: RwLock::new(ExportTable::default()),
            handlers: RwLock::new(Vec::new()),
            default_limits,
        }
    }

    /// Exports `volume` under the lowest free export id.
    pub fn add_volume(&self, volume: &str, limits: VolumeLimits) -> Result<ExportId, ResolverError> {
        let mut table = self.table.write();
        if table.by_name.contains_key(volume) {
            return Err(ResolverError::VolumeExists(volume.to_string()));
        }
        let id = table
            .lowest_free_id()
            .ok_or(ResolverError::ExportIdsExhausted)?;
        table.by_name.insert(volume.to_string(), Export { id, limits });
        table.by_id.insert(id, volume.to_string());
        info!(volume, export_id = %id, "volume exported");
        Ok(id)
    }

    /// Exports `volume` under a caller-chosen export id.
    pub fn add_volume_with_id(
        &self,
        volume: &str,
        id: ExportId,
        limits: VolumeLimits,
    ) -> Result<(), ResolverError> {
        let mut table = self.table.write();
        if table.by_name.contains_key(volume) {
            return Err(ResolverError::VolumeExists(volume.to_string()));
        }
        if table.by_id.contains_key(&id) {
            return Err(ResolverError::ExportIdInUse(id));
        }
        table.by_name.insert(volume.to_string(), Export { id, limits });
        table.by_id.insert(id, volume.to_string());
        info!(volume, export_id = %id, "volume exported");
        Ok(())
    }

    /// Removes `volume`'s export.
    ///
    /// Every delete handler runs first, in registration order, whether or not
    /// an earlier one failed. The mapping is then removed in full; handler
    /// failures are returned afterwards.
    pub fn remove_volume(&self, volume: &str) -> Result<ExportId, ResolverError> {
        if !self.exists(volume) {
            return Err(ResolverError::UnknownVolume(volume.to_string()));
        }

        let handlers: Vec<Arc<VolumeDeleteHandler>> = self.handlers.read().clone();
        let mut failures = Vec::new();
        for (index, handler) in handlers.iter().enumerate() {
            let message = match panic::catch_unwind(AssertUnwindSafe(|| handler(volume))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{e:#}"),
                Err(payload) => format!("handler panicked: {}", panic_message(payload.as_ref())),
            };
            warn!(volume, handler = index, error = %message, "volume delete handler failed");
            failures.push(HandlerFailure { index, message });
        }

        let id = {
            let mut table = self.table.write();
            let export = table
                .by_name
                .remove(volume)
                .ok_or_else(|| ResolverError::UnknownVolume(volume.to_string()))?;
            table.by_id.remove(&export.id);
            export.id
        };
        info!(volume, export_id = %id, "volume export removed");

        if failures.is_empty() {
            Ok(id)
        } else {
            Err(ResolverError::DeleteHandlersFailed {
                volume: volume.to_string(),
                failures,
            })
        }
    }

    /// Brings the exports in line with the platform's current volume list:
    /// new volumes are exported with the default limits, vanished ones removed.
    ///
    /// Returns the first error encountered, after processing every volume.
    pub fn reconcile(&self, volumes: &[VolumeDescriptor]) -> Result<(), ResolverError> {
        let current: Vec<String> = self.export_names();
        let mut first_error = None;

        for name in &current {
            if !volumes.iter().any(|v| &v.name == name) {
                if let Err(e) = self.remove_volume(name) {
                    first_error.get_or_insert(e);
                }
            }
        }
        for volume in volumes {
            if !self.exists(&volume.name) {
                if let Err(e) = self.add_volume(&volume.name, self.default_limits) {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn export(&self, volume: &str) -> Result<Export, ResolverError> {
        self.table
            .read()
            .by_name
            .get(volume)
            .copied()
            .ok_or_else(|| ResolverError::UnknownVolume(volume.to_string()))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string payload"
    }
}

impl ExportResolver for VolumeExportResolver {
    fn export_names(&self) -> Vec<String> {
        // id order keeps listings stable across calls
        self.table.read().by_id.values().cloned().collect()
    }

    fn nfs_export_id(&self, volume: &str) -> Result<ExportId, ResolverError> {
        self.export(volume).map(|e| e.id)
    }

    fn volume_name(&self, export_id: ExportId) -> Result<String, ResolverError> {
        self.table
            .read()
            .by_id
            .get(&export_id)
            .cloned()
            .ok_or(ResolverError::UnknownExport(export_id))
    }

    fn exists(&self, volume: &str) -> bool {
        self.table.read().by_name.contains_key(volume)
    }

    fn object_size(&self, volume: &str) -> Result<u64, ResolverError> {
        self.export(volume).map(|e| e.limits.object_size)
    }

    fn max_volume_capacity_in_bytes(&self, volume: &str) -> Result<u64, ResolverError> {
        self.export(volume).map(|e| e.limits.max_capacity)
    }

    fn add_volume_delete_event_handler(&self, handler: VolumeDeleteHandler) {
        self.handlers.write().push(Arc::new(handler));
    }
}
