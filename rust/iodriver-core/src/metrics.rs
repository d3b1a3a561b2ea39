use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use serde::Serialize;
use std::time::Duration;

use crate::qos::VolumeQosStats;
use crate::validator::Validation;

#[derive(Debug, Clone, Serialize)]
pub struct LatencyStats {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub p999_ms: f64,
    pub max_ms: f64,
}

pub struct LatencyRecorder {
    pub hist: Histogram<u64>,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self {
            hist: Histogram::new(3).expect("3 significant figures is a valid precision"),
        }
    }

    pub fn record(&mut self, dur: Duration) {
        let us = dur.as_micros() as u64;
        let _ = self.hist.record(us.max(1));
    }

    /// Folds another recorder's samples into this one.
    pub fn merge(&mut self, other: &LatencyRecorder) {
        // both sides are auto-resizing, so adding never runs out of range
        let _ = self.hist.add(&other.hist);
    }

    pub fn count(&self) -> u64 {
        self.hist.len()
    }

    pub fn to_stats(&self) -> LatencyStats {
        LatencyStats {
            p50_ms: self.hist.value_at_quantile(0.50) as f64 / 1000.0,
            p95_ms: self.hist.value_at_quantile(0.95) as f64 / 1000.0,
            p99_ms: self.hist.value_at_quantile(0.99) as f64 / 1000.0,
            p999_ms: self.hist.value_at_quantile(0.999) as f64 / 1000.0,
            max_ms: self.hist.max() as f64 / 1000.0,
        }
    }
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupStatus {
    Completed,
    Failed { operation: String, error: String },
}

/// How one operation group ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupOutcome {
    pub index: usize,
    pub operations_executed: u64,
    #[serde(flatten)]
    pub status: GroupStatus,
}

impl GroupOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, GroupStatus::Failed { .. })
    }
}

/// Failure of a single teardown operation; teardown carries on past it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeardownFailure {
    pub operation: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub workload: String,
    pub endpoint: String,
    pub started_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub operations_executed: u64,
    pub groups: Vec<GroupOutcome>,
    pub teardown_failures: Vec<TeardownFailure>,
    pub latency: LatencyStats,
    pub volumes: Vec<VolumeQosStats>,
    pub validation: Validation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
}

impl RunSummary {
    pub fn groups_failed(&self) -> usize {
        self.groups.iter().filter(|g| g.is_failed()).count()
    }

    /// 0 when every group and teardown step succeeded and validation passed.
    pub fn result_code(&self) -> i32 {
        if self.groups_failed() == 0 && self.teardown_failures.is_empty() && self.validation.passed {
            0
        } else {
            1
        }
    }
}
