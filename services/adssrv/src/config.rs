//! Service configuration
//!
//! YAML file merged with `ADSSRV_`-prefixed environment overrides, loaded
//! once at startup and validated eagerly; there is no hot reload. Workers
//! and buffers are declared by name, and validation enforces the pairing
//! rule: a buffer feeds at most one reader and at most one writer.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::address::AmsNetId;
use crate::error::{AdsClientError, Result};
use crate::transport::PORT_TC3_PLC1;

/// Environment variable prefix for config overrides, nested keys split
/// with `__` (e.g. `ADSSRV_SERVICE__LOG_LEVEL=debug`)
pub const ENV_PREFIX: &str = "ADSSRV_";

fn default_service_name() -> String {
    "adssrv".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ams_net_port() -> u16 {
    PORT_TC3_PLC1
}

fn default_update_interval_ms() -> u64 {
    1000
}

fn default_retry_attempts() -> u32 {
    10
}

fn default_buffer_capacity() -> usize {
    64
}

fn default_true() -> bool {
    true
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    /// Exchange buffers, keyed by name
    #[serde(default)]
    pub buffers: IndexMap<String, BufferConfig>,
    /// Workers, keyed by name
    pub workers: IndexMap<String, WorkerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    #[serde(default = "default_buffer_capacity")]
    pub capacity: usize,
    /// Suspend the producer instead of evicting the oldest record
    #[serde(default)]
    pub no_drop: bool,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_buffer_capacity(),
            no_drop: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerRole {
    Reader,
    Writer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub role: WorkerRole,
    /// Target device AMS net id, validated at load
    pub ams_net_id: String,
    pub ip_address: String,
    #[serde(default = "default_ams_net_port")]
    pub ams_net_port: u16,
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default)]
    pub retain_connection: bool,
    /// Per-operation transport timeout; provider default when omitted
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Buffer this worker produces into (reader) or drains (writer)
    pub buffer: String,
    /// Variables polled each cycle; readers only
    #[serde(default)]
    pub data_names: Vec<String>,
    /// Apply the registered per-record transform between read and append
    #[serde(default)]
    pub process_data_enabled: bool,
    /// Records coalesced per writer cycle; 0 writes record-by-record
    #[serde(default)]
    pub write_batch_size: usize,
    #[serde(default = "default_true")]
    pub verify_write_operations: bool,
}

impl WorkerConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl AppConfig {
    /// Load from a YAML file with environment overrides, then validate
    pub fn load(path: &Path) -> Result<Self> {
        let config: AppConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Eager validation of everything that would otherwise fail mid-run
    pub fn validate(&self) -> Result<()> {
        if self.workers.is_empty() {
            return Err(AdsClientError::config("no workers configured"));
        }

        for (name, buffer) in &self.buffers {
            if buffer.capacity == 0 {
                return Err(AdsClientError::config(format!(
                    "buffer '{name}': capacity must be non-zero"
                )));
            }
        }

        let mut producers: IndexMap<&str, &str> = IndexMap::new();
        let mut consumers: IndexMap<&str, &str> = IndexMap::new();

        for (name, worker) in &self.workers {
            AmsNetId::parse(&worker.ams_net_id).map_err(|e| {
                AdsClientError::config(format!("worker '{name}': {e}"))
            })?;
            if worker.ip_address.is_empty() {
                return Err(AdsClientError::config(format!(
                    "worker '{name}': ip_address is required"
                )));
            }
            if worker.update_interval_ms == 0 {
                return Err(AdsClientError::config(format!(
                    "worker '{name}': update_interval_ms must be non-zero"
                )));
            }
            if worker.retry_attempts == 0 {
                return Err(AdsClientError::config(format!(
                    "worker '{name}': retry_attempts must be non-zero"
                )));
            }
            if !self.buffers.contains_key(&worker.buffer) {
                return Err(AdsClientError::config(format!(
                    "worker '{name}': unknown buffer '{}'",
                    worker.buffer
                )));
            }

            match worker.role {
                WorkerRole::Reader => {
                    if worker.data_names.is_empty() {
                        return Err(AdsClientError::config(format!(
                            "reader '{name}': data_names must not be empty"
                        )));
                    }
                    if let Some(other) =
                        producers.insert(worker.buffer.as_str(), name.as_str())
                    {
                        return Err(AdsClientError::config(format!(
                            "buffer '{}' has two producers: '{other}' and '{name}'",
                            worker.buffer
                        )));
                    }
                },
                WorkerRole::Writer => {
                    if let Some(other) =
                        consumers.insert(worker.buffer.as_str(), name.as_str())
                    {
                        return Err(AdsClientError::config(format!(
                            "buffer '{}' has two consumers: '{other}' and '{name}'",
                            worker.buffer
                        )));
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    const MINIMAL: &str = r#"
buffers:
  exchange: {}
workers:
  plc1_reader:
    role: reader
    ams_net_id: "192.168.0.10.1.1"
    ip_address: "192.168.0.10"
    buffer: exchange
    data_names: ["MAIN.x", "MAIN.y"]
  plc2_writer:
    role: writer
    ams_net_id: "192.168.0.11.1.1"
    ip_address: "192.168.0.11"
    buffer: exchange
"#;

    fn write_config(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yml")
            .tempfile()
            .unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let file = write_config(MINIMAL);
        let config = AppConfig::load(file.path()).unwrap();

        assert_eq!(config.service.name, "adssrv");
        assert_eq!(config.buffers["exchange"].capacity, 64);

        let reader = &config.workers["plc1_reader"];
        assert_eq!(reader.ams_net_port, 851);
        assert_eq!(reader.update_interval(), Duration::from_millis(1000));
        assert_eq!(reader.retry_attempts, 10);
        assert!(!reader.retain_connection);
        assert!(!reader.process_data_enabled);

        let writer = &config.workers["plc2_writer"];
        assert_eq!(writer.write_batch_size, 0);
        assert!(writer.verify_write_operations);
    }

    #[test]
    fn rejects_malformed_net_id() {
        let yaml = MINIMAL.replace("192.168.0.10.1.1", "192.168.0.10");
        let file = write_config(&yaml);
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, AdsClientError::ConfigError(_)));
        assert!(err.to_string().contains("plc1_reader"));
    }

    #[test]
    fn rejects_reader_without_data_names() {
        let yaml = MINIMAL.replace("data_names: [\"MAIN.x\", \"MAIN.y\"]", "");
        let file = write_config(&yaml);
        assert!(AppConfig::load(file.path()).is_err());
    }

    #[test]
    fn rejects_unknown_buffer_reference() {
        let yaml = MINIMAL.replace("buffer: exchange\n    data_names", "buffer: nope\n    data_names");
        let file = write_config(&yaml);
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("unknown buffer"));
    }

    #[test]
    fn rejects_second_consumer_on_one_buffer() {
        let yaml = format!(
            "{MINIMAL}  extra_writer:\n    role: writer\n    ams_net_id: \"1.2.3.4.1.1\"\n    ip_address: \"1.2.3.4\"\n    buffer: exchange\n"
        );
        let file = write_config(&yaml);
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("two consumers"));
    }

    #[test]
    fn rejects_zero_interval_and_zero_retries() {
        for field in ["update_interval_ms: 0", "retry_attempts: 0"] {
            let yaml = MINIMAL.replace(
                "data_names: [\"MAIN.x\", \"MAIN.y\"]",
                &format!("data_names: [\"MAIN.x\"]\n    {field}"),
            );
            let file = write_config(&yaml);
            assert!(AppConfig::load(file.path()).is_err(), "{field}");
        }
    }

    #[test]
    fn environment_overrides_file_values() {
        let file = write_config(MINIMAL);
        // Scoped to a key no other test reads
        std::env::set_var("ADSSRV_SERVICE__LOG_LEVEL", "debug");
        let config = AppConfig::load(file.path()).unwrap();
        std::env::remove_var("ADSSRV_SERVICE__LOG_LEVEL");
        assert_eq!(config.service.log_level, "debug");
    }
}
