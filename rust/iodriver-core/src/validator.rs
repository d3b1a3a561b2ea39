//! Judging a finished run from the listener's statistics.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::listener::WorkloadEventListener;
use crate::qos::VolumeQosStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    None,
    RateLimit,
    AssuredRate,
}

impl ValidatorKind {
    pub fn build(self, tolerance: f64) -> Box<dyn Validator> {
        match self {
            ValidatorKind::None => Box::new(AcceptAll),
            ValidatorKind::RateLimit => Box::new(RateLimitValidator::new(tolerance)),
            ValidatorKind::AssuredRate => Box::new(AssuredRateValidator::new(tolerance)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeVerdict {
    pub volume: String,
    pub measured_iops: Option<f64>,
    pub bound_iops: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validation {
    pub validator: String,
    pub passed: bool,
    pub volumes: Vec<VolumeVerdict>,
}

impl Validation {
    /// Process-style result code: 0 when passed, 1 otherwise.
    pub fn result_code(&self) -> i32 {
        if self.passed {
            0
        } else {
            1
        }
    }
}

pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, listener: &dyn WorkloadEventListener) -> Validation;
}

pub struct AcceptAll;

impl Validator for AcceptAll {
    fn name(&self) -> &'static str {
        "none"
    }

    fn validate(&self, _listener: &dyn WorkloadEventListener) -> Validation {
        Validation {
            validator: self.name().to_string(),
            passed: true,
            volumes: Vec::new(),
        }
    }
}

/// Checks each volume selected by `bound` against `within`.
/// A run where no volume was checked fails.
fn judge(
    name: &'static str,
    listener: &dyn WorkloadEventListener,
    bound: impl Fn(&VolumeQosStats) -> Option<f64>,
    within: impl Fn(f64, f64) -> bool,
) -> Validation {
    let mut volumes = Vec::new();
    for volume in listener.get_volumes() {
        let stats = match listener.get_stats(&volume) {
            Ok(stats) => stats,
            Err(e) => {
                warn!(volume = %volume, error = %e, "volume vanished during validation");
                continue;
            }
        };
        let Some(bound_iops) = bound(&stats) else {
            continue;
        };
        let measured_iops = stats.iops();
        let passed = measured_iops.is_some_and(|m| within(m, bound_iops));
        info!(
            validator = name,
            volume = %volume,
            measured = measured_iops.unwrap_or(0.0),
            bound = bound_iops,
            passed,
            "volume validated"
        );
        volumes.push(VolumeVerdict {
            volume,
            measured_iops,
            bound_iops,
            passed,
        });
    }
    let passed = !volumes.is_empty() && volumes.iter().all(|v| v.passed);
    Validation {
        validator: name.to_string(),
        passed,
        volumes,
    }
}

/// Measured IOPS of every throttled volume must stay at or below its
/// throttle, plus tolerance. Unthrottled volumes are ignored.
pub struct RateLimitValidator {
    tolerance: f64,
}

impl RateLimitValidator {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }
}

impl Validator for RateLimitValidator {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn validate(&self, listener: &dyn WorkloadEventListener) -> Validation {
        let factor = 1.0 + self.tolerance;
        judge(
            self.name(),
            listener,
            |stats| match stats.settings.iops_throttle {
                0 => None,
                throttle => Some(f64::from(throttle)),
            },
            |measured, throttle| measured <= throttle * factor,
        )
    }
}

/// Measured IOPS of every volume with an assured rate must reach it, minus
/// tolerance.
pub struct AssuredRateValidator {
    tolerance: f64,
}

impl AssuredRateValidator {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }
}

impl Validator for AssuredRateValidator {
    fn name(&self) -> &'static str {
        "assured_rate"
    }

    fn validate(&self, listener: &dyn WorkloadEventListener) -> Validation {
        let factor = 1.0 - self.tolerance;
        judge(
            self.name(),
            listener,
            |stats| match stats.settings.iops_assured {
                0 => None,
                assured => Some(f64::from(assured)),
            },
            |measured, assured| measured >= assured * factor,
        )
    }
}
