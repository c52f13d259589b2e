//! Daemon configuration.
//!
//! Loaded from a JSON file. Every field has a default, so a file only needs
//! the values it changes.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use wgc_reconcile::ReconcileConfig;
use wgc_wireguard::SystemSource;

/// Default location of the config file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/wgconnectd/config.json";

/// Top-level daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Reconciliation settings.
    pub reconcile: ReconcileConfig,
    /// JSON file holding the tunnel inventory.
    pub inventory_path: PathBuf,
    /// Seconds between passes in `run` mode.
    pub interval_secs: u64,
    /// `wg` executable.
    pub wg_command: String,
    /// `ip` executable.
    pub ip_command: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            reconcile: ReconcileConfig::default(),
            inventory_path: PathBuf::from("/var/lib/wgconnectd/tunnels.json"),
            interval_secs: 30,
            wg_command: "wg".to_string(),
            ip_command: "ip".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Load and validate configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string.
    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(content).context("invalid config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.reconcile.validate()?;
        if self.interval_secs == 0 {
            bail!("interval_secs must be at least 1");
        }
        if self.wg_command.is_empty() || self.ip_command.is_empty() {
            bail!("wg_command and ip_command cannot be empty");
        }
        Ok(())
    }

    /// Write the configuration as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create '{}'", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write config file '{}'", path.display()))
    }

    /// Live-state source using the configured executables.
    pub fn source(&self) -> SystemSource {
        SystemSource::new()
            .with_wg_command(&self.wg_command)
            .with_ip_command(&self.ip_command)
    }
}
