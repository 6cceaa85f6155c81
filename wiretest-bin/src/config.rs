//! Layered configuration: compiled-in defaults, overlaid by `wiretest.toml`,
//! overlaid by CLI flags (spec SPEC_FULL.md §4.6 "Configuration").
//!
//! Mirrors the teacher's `core_config::{ConfigFile, Config, load_from}`
//! three-tier precedence, minus the viewport-context clamping this tool has
//! no use for.

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,
    #[serde(default)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub default_timeout_ms: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_timeout_ms: 10_000,
            log_level: "warn".to_string(),
        }
    }
}

/// `wiretest.toml` next to the script, unless `explicit` names a path.
fn discover(script_path: &Path, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    let candidate = script_path.parent().unwrap_or_else(|| Path::new(".")).join("wiretest.toml");
    candidate.exists().then_some(candidate)
}

pub fn load(script_path: &Path, explicit: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();
    if let Some(path) = discover(script_path, explicit) {
        let content = std::fs::read_to_string(&path)?;
        let file: ConfigFile = toml::from_str(&content)?;
        if let Some(ms) = file.default_timeout_ms {
            config.default_timeout_ms = ms;
        }
        if let Some(level) = file.log_level {
            config.log_level = level;
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("a.htt");
        let config = load(&script, None).unwrap();
        assert_eq!(config.default_timeout_ms, 10_000);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn sibling_toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("a.htt");
        std::fs::write(dir.path().join("wiretest.toml"), "default_timeout_ms = 2500\nlog_level = \"debug\"\n").unwrap();
        let config = load(&script, None).unwrap();
        assert_eq!(config.default_timeout_ms, 2500);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn explicit_path_wins_over_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("a.htt");
        std::fs::write(dir.path().join("wiretest.toml"), "default_timeout_ms = 1\n").unwrap();
        let explicit = dir.path().join("other.toml");
        std::fs::write(&explicit, "default_timeout_ms = 9000\n").unwrap();
        let config = load(&script, Some(&explicit)).unwrap();
        assert_eq!(config.default_timeout_ms, 9000);
    }
}
