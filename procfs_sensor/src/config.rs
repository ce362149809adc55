//! Sensor configuration: the JSON record handed to the core pipeline.
//!
//! Baseline keys are `name`, `target`, `sampling-interval`, `output.{uri,port}` and
//! `verbose`. Everything else is optional and defaults to the baseline behavior.

use serde::{Deserialize, Deserializer};
use std::path::{Component, Path, PathBuf};
use std::{fs, time::Duration};

use crate::error::SensorError;
use crate::parser::{ColumnLayout, ParsePolicy};
use crate::pipeline::FailurePolicy;
use crate::scheduler::SchedulePolicy;
use crate::transport::Framing;

pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup/perf_event";
pub const DEFAULT_MEMBERSHIP_FILE: &str = "tasks";
pub const DEFAULT_STAT_PROGRAM: &str = "pidstat";
const DEFAULT_STAT_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SensorConfig {
    pub name: String,
    #[serde(default)]
    pub target: Vec<String>,
    #[serde(deserialize_with = "millis_from_number_or_string")]
    pub sampling_interval: u64,
    pub output: OutputConfig,
    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub schedule: SchedulePolicy,
    #[serde(default)]
    pub on_tick_failure: FailurePolicy,
    #[serde(default)]
    pub parse_policy: ParsePolicy,
    #[serde(default)]
    pub framing: Framing,
    #[serde(default)]
    pub stat_command: StatCommandConfig,
    #[serde(default)]
    pub stat_layout: ColumnLayout,
    #[serde(default = "default_cgroup_root")]
    pub cgroup_root: PathBuf,
    #[serde(default = "default_membership_file")]
    pub membership_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub uri: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StatCommandConfig {
    pub program: String,
    /// 0 disables the bound and waits for the program indefinitely.
    pub timeout_ms: u64,
}

impl Default for StatCommandConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_STAT_PROGRAM.to_string(),
            timeout_ms: DEFAULT_STAT_TIMEOUT_MS,
        }
    }
}

fn default_cgroup_root() -> PathBuf {
    PathBuf::from(DEFAULT_CGROUP_ROOT)
}

fn default_membership_file() -> String {
    DEFAULT_MEMBERSHIP_FILE.to_string()
}

// Older config files carry the interval as a string ("1000").
fn millis_from_number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Number(u64),
        Text(String),
    }

    match Millis::deserialize(deserializer)? {
        Millis::Number(n) => Ok(n),
        Millis::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl SensorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, SensorError> {
        let config: SensorConfig = serde_json::from_str(json)
            .map_err(|e| SensorError::Config(format!("cannot parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SensorError> {
        if self.sampling_interval == 0 {
            return Err(SensorError::Config(
                "sampling-interval must be greater than 0".into(),
            ));
        }
        if self.output.port == 0 {
            return Err(SensorError::Config("output.port must be non-zero".into()));
        }
        if self.output.uri.trim().is_empty() {
            return Err(SensorError::Config("output.uri is empty".into()));
        }
        for t in &self.target {
            if t.trim().is_empty() {
                return Err(SensorError::Config("target names must not be empty".into()));
            }
            let escapes = Path::new(t).components().any(|c| {
                matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
            });
            if escapes {
                return Err(SensorError::Config(format!(
                    "target {t:?} escapes the cgroup root"
                )));
            }
        }
        if self.membership_file.is_empty() || self.membership_file.contains('/') {
            return Err(SensorError::Config(format!(
                "membership-file {:?} must be a plain file name",
                self.membership_file
            )));
        }
        self.stat_layout.validate()?;
        Ok(())
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval)
    }

    pub fn stat_timeout(&self) -> Option<Duration> {
        match self.stat_command.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn output_addr(&self) -> (String, u16) {
        (self.output.uri.clone(), self.output.port)
    }
}

/// Read and validate a `.json` config file.
pub fn load_config(path: &Path) -> Result<SensorConfig, SensorError> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return Err(SensorError::Config(format!(
            "config file must be a .json file: {}",
            path.display()
        )));
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| SensorError::Config(format!("cannot read {}: {e}", path.display())))?;
    SensorConfig::from_json_str(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASELINE: &str = r#"{
        "name": "sensor-1",
        "target": ["web", "db"],
        "sampling-interval": 1000,
        "output": {"uri": "127.0.0.1", "port": 9000},
        "verbose": false
    }"#;

    #[test]
    fn baseline_config_gets_baseline_defaults() {
        let cfg = SensorConfig::from_json_str(BASELINE).unwrap();
        assert_eq!(cfg.target, vec!["web", "db"]);
        assert_eq!(cfg.sampling_interval(), Duration::from_millis(1000));
        assert_eq!(cfg.schedule, SchedulePolicy::FixedDelay);
        assert_eq!(cfg.on_tick_failure, FailurePolicy::Continue);
        assert_eq!(cfg.parse_policy, ParsePolicy::Tolerant);
        assert_eq!(cfg.framing, Framing::None);
        assert_eq!(cfg.stat_command.program, "pidstat");
        assert_eq!(cfg.stat_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(cfg.stat_layout, ColumnLayout::default());
        assert_eq!(cfg.cgroup_root, PathBuf::from(DEFAULT_CGROUP_ROOT));
        assert_eq!(cfg.membership_file, "tasks");
    }

    #[test]
    fn extension_keys_override_defaults() {
        let json = r#"{
            "name": "s", "target": [], "sampling-interval": "250",
            "output": {"uri": "collector", "port": 1},
            "verbose": true,
            "schedule": "fixed-rate",
            "on-tick-failure": "abort",
            "parse-policy": "strict",
            "framing": "length-prefix",
            "stat-command": {"timeout-ms": 0},
            "stat-layout": {"columns": 11, "pid-column": 3, "cpu-column": 8},
            "membership-file": "cgroup.procs"
        }"#;
        let cfg = SensorConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.sampling_interval, 250);
        assert_eq!(cfg.schedule, SchedulePolicy::FixedRate);
        assert_eq!(cfg.on_tick_failure, FailurePolicy::Abort);
        assert_eq!(cfg.parse_policy, ParsePolicy::Strict);
        assert_eq!(cfg.framing, Framing::LengthPrefix);
        assert_eq!(cfg.stat_timeout(), None);
        assert_eq!(cfg.stat_command.program, "pidstat");
        assert_eq!(cfg.stat_layout.header_lines, 3);
        assert_eq!(cfg.stat_layout.columns, 11);
        assert_eq!(cfg.membership_file, "cgroup.procs");
    }

    #[test]
    fn rejects_zero_interval_and_escaping_targets() {
        let zero = BASELINE.replace("1000", "0");
        assert!(matches!(
            SensorConfig::from_json_str(&zero),
            Err(SensorError::Config(_))
        ));
        let escape = BASELINE.replace("\"db\"", "\"../../etc\"");
        assert!(SensorConfig::from_json_str(&escape).is_err());
        let absolute = BASELINE.replace("\"db\"", "\"/etc\"");
        assert!(SensorConfig::from_json_str(&absolute).is_err());
    }

    #[test]
    fn load_config_requires_json_extension() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("sensor.yaml");
        fs::write(&yaml, BASELINE).unwrap();
        assert!(load_config(&yaml).is_err());

        let json = dir.path().join("sensor.json");
        fs::write(&json, BASELINE).unwrap();
        assert_eq!(load_config(&json).unwrap().name, "sensor-1");
    }
}
