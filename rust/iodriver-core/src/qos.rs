//! Volume QoS settings and the statistics the event listener derives from
//! reported IO.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Storage media a volume is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaPolicy {
    #[default]
    HddOnly,
    SsdOnly,
    HybridOnly,
}

/// Configured QoS parameters of one volume.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VolumeQosSettings {
    pub id: u64,
    /// Minimum IOPS the platform should guarantee.
    pub iops_assured: u32,
    /// Maximum IOPS the platform allows, 0 for unlimited.
    pub iops_throttle: u32,
    pub priority: u32,
    /// Commit log retention in seconds.
    pub commit_log_retention: u64,
    pub media_policy: MediaPolicy,
}

impl VolumeQosSettings {
    pub fn with_iops_assured(mut self, iops: u32) -> Self {
        self.iops_assured = iops;
        self
    }

    pub fn with_iops_throttle(mut self, iops: u32) -> Self {
        self.iops_throttle = iops;
        self
    }
}

/// Lifecycle state of a volume inside the event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeState {
    Registered,
    Running,
    Stopped,
}

impl fmt::Display for VolumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeState::Registered => write!(f, "registered"),
            VolumeState::Running => write!(f, "running"),
            VolumeState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Point-in-time statistics of one volume.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeQosStats {
    pub name: String,
    pub settings: VolumeQosSettings,
    pub state: VolumeState,
    /// IO units reported during the current (or last) pass.
    pub io_count: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Option<Duration>,
    /// Number of start/stop passes begun so far.
    pub passes: u32,
}

impl VolumeQosStats {
    /// Measured IO units per second, once any time has elapsed.
    pub fn iops(&self) -> Option<f64> {
        let secs = self.elapsed?.as_secs_f64();
        if secs <= 0.0 {
            return None;
        }
        Some(self.io_count as f64 / secs)
    }
}
