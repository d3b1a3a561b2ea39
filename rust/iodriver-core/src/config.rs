use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::endpoint::ConnectionParams;
use crate::error::ConfigError;
use crate::listener::ListenerKind;
use crate::validator::ValidatorKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Endpoint factory name, e.g. `sim` or `om-rest`.
    pub kind: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl EndpointConfig {
    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            uri: self.uri.clone(),
            options: self.options.clone(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            kind: "sim".to_string(),
            uri: String::new(),
            options: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    pub name: String,
    #[serde(default)]
    pub log_operations: bool,
    /// Length of the timed load phase of each bucket.
    #[serde(default = "default_test_duration", with = "humantime_serde")]
    pub test_duration: Duration,
    #[serde(default = "default_warmup_operations")]
    pub warmup_operations: u32,
    #[serde(default = "default_object_size")]
    pub object_size: usize,
    /// Target throttle for `rate_limit`.
    #[serde(default)]
    pub iops: Option<u32>,
    /// Competitors of the assured bucket for `assured_rate`.
    #[serde(default)]
    pub competing_buckets: Option<u32>,
    /// System-wide IOPS budget for `assured_rate`.
    #[serde(default)]
    pub system_iops_max: Option<u32>,
}

impl WorkloadConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log_operations: false,
            test_duration: default_test_duration(),
            warmup_operations: default_warmup_operations(),
            object_size: default_object_size(),
            iops: None,
            competing_buckets: None,
            system_iops_max: None,
        }
    }
}

fn default_test_duration() -> Duration {
    Duration::from_secs(10)
}

fn default_warmup_operations() -> u32 {
    100
}

fn default_object_size() -> usize {
    4096
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Unset picks the workload's suggested validator.
    #[serde(default)]
    pub kind: Option<ValidatorKind>,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            kind: None,
            tolerance: default_tolerance(),
        }
    }
}

fn default_tolerance() -> f64 {
    0.1
}

/// Everything a run needs, loaded once and passed down explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub listener: ListenerKind,
    #[serde(default)]
    pub validator: ValidatorConfig,
}

impl DriverConfig {
    pub fn from_yaml(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(s)?)
    }
}

#[derive(Debug, Clone)]
pub struct DriverConfigFile;

impl DriverConfigFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DriverConfig, ConfigError> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        DriverConfig::from_yaml(&s)
    }
}
