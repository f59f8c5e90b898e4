//! Server-side configuration, read from `/etc/audiorelay/<context>.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const CONFIG_DIR: &str = "/etc/audiorelay";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub storage: StorageConfig,
    pub backends: BackendsConfig,
    #[serde(default)]
    pub proxy: ProxySettings,
    #[serde(default)]
    pub health: HealthSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `relay.redb`.
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    pub local: BackendEndpoint,
    pub web: BackendEndpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEndpoint {
    pub base_url: String,

    /// Service credential used when a request carries none.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_idle_timeout")]
    pub read_idle_timeout_secs: u64,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            metadata_timeout_secs: default_metadata_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            read_idle_timeout_secs: default_read_idle_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Background refresh period; 0 disables it.
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,

    #[serde(default)]
    pub auto_select_on_start: bool,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout(),
            interval_secs: default_health_interval(),
            auto_select_on_start: false,
        }
    }
}

fn default_metadata_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_read_idle_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    3
}

fn default_health_interval() -> u64 {
    60
}

impl ServerConfig {
    /// Resolve `-c` to a file: anything with `/` or `.` is a path,
    /// a bare name is a context under `/etc/audiorelay`.
    pub fn resolve_path(context_or_path: &str) -> PathBuf {
        if context_or_path.contains('/') || context_or_path.contains('.') {
            PathBuf::from(context_or_path)
        } else {
            Path::new(CONFIG_DIR).join(format!("{}.toml", context_or_path))
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        Path::new(&self.storage.data_dir).join("relay.redb")
    }
}

impl ProxySettings {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.read_idle_timeout_secs)
    }
}

impl HealthSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
