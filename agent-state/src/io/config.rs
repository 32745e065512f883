//! Console configuration stored under `.agent-state/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config location relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".agent-state/config.toml";

/// Console configuration (TOML).
///
/// Missing fields default to values that match a locally running agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsoleConfig {
    pub agent: AgentConfig,
    pub snapshot: SnapshotConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL of the agent server.
    pub base_url: String,
    /// Agent name used in request paths.
    pub name: String,
    /// Per-request timeout. Unset means outbound writes never time out.
    pub request_timeout_secs: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8085".to_string(),
            name: "data_orchestration_agent".to_string(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SnapshotConfig {
    /// JSON file the agent mirrors its document into, if any.
    pub path: Option<PathBuf>,
    /// Poll interval for the snapshot file watcher.
    pub poll_interval_ms: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: None,
            poll_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EventsConfig {
    /// Capacity of the broadcast channel feeding SSE clients.
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

impl ConsoleConfig {
    pub fn validate(&self) -> Result<()> {
        let base_url = self.agent.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(anyhow!("agent.base_url must start with http:// or https://"));
        }
        if self.agent.name.trim().is_empty() || self.agent.name.contains('/') {
            return Err(anyhow!("agent.name must be non-empty and must not contain '/'"));
        }
        if self.agent.request_timeout_secs == Some(0) {
            return Err(anyhow!("agent.request_timeout_secs must be > 0 when set"));
        }
        if self.snapshot.poll_interval_ms == 0 {
            return Err(anyhow!("snapshot.poll_interval_ms must be > 0"));
        }
        if self.events.channel_capacity == 0 {
            return Err(anyhow!("events.channel_capacity must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ConsoleConfig::default()`.
pub fn load_config(path: &Path) -> Result<ConsoleConfig> {
    if !path.exists() {
        let cfg = ConsoleConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ConsoleConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ConsoleConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ConsoleConfig::default());
        assert_eq!(cfg.agent.name, "data_orchestration_agent");
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("config.toml");
        let mut cfg = ConsoleConfig::default();
        cfg.snapshot.path = Some(PathBuf::from("state.json"));
        cfg.agent.request_timeout_secs = Some(30);
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[agent]\nbase_url = \"https://agent.internal\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.agent.base_url, "https://agent.internal");
        assert_eq!(cfg.snapshot.poll_interval_ms, 250);
    }

    #[test]
    fn rejects_zero_timeout_and_bad_url() {
        let mut cfg = ConsoleConfig::default();
        cfg.agent.request_timeout_secs = Some(0);
        assert!(cfg.validate().is_err());

        let mut cfg = ConsoleConfig::default();
        cfg.agent.base_url = "localhost:8085".to_string();
        assert!(cfg.validate().is_err());
    }
}
