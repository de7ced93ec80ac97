use crate::error::Result;
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// 探测参数: 超时, 块大小, 轮数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub connect_timeout_ms: u64,
    /// Deadline for a single PONG line
    pub ping_timeout_ms: u64,
    pub command_timeout_ms: u64,
    /// Deadline for moving one round's payload (plus the upload ack)
    pub transfer_timeout_ms: u64,
    pub max_rounds: usize,
    pub start_block_size: u64,
    pub max_transfer_size: u64,
    pub max_ping_samples: usize,
    pub data_block_size: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            ping_timeout_ms: 5_000,
            command_timeout_ms: 1_000,
            transfer_timeout_ms: 10_000,
            max_rounds: 4,
            start_block_size: 4096,
            max_transfer_size: 8 * 1024 * 1024,
            max_ping_samples: 60,
            data_block_size: 16 * 1024,
        }
    }
}

impl ProbeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }
}

/// 候选服务器选择参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectConfig {
    pub want_count: usize,
    pub max_failures: usize,
    pub sample_count: usize,
    /// Samples used by the full latency test of the chosen server
    pub full_sample_count: usize,
}

impl Default for SelectConfig {
    fn default() -> Self {
        Self {
            want_count: 5,
            max_failures: 3,
            sample_count: 5,
            full_sample_count: 20,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub probe: ProbeConfig,
    pub select: SelectConfig,
}

impl Settings {
    /// ~/.config/netspeed/settings.toml (按平台不同)
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "netspeed").map(|dirs| dirs.config_dir().join("settings.toml"))
    }

    /// Strategy:
    /// 1. Read the given path (or the user config path)
    /// 2. Fall back to built-in defaults when no file exists
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).await?;
        let settings: Settings = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded settings");
        Ok(settings)
    }
}
