//! TOML configuration for the CLI: engine location, workspace roots,
//! the editor-style ignore table, and service tuning.

use anyhow::{Context, Result};
use scour_indexer::ServiceConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "scour.toml";

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub engine: EngineSection,
    /// Workspace roots opened when none are passed on the command line.
    pub roots: Vec<PathBuf>,
    /// Ignore globs and whether each is enabled, as an editor would
    /// persist them.
    pub ignore: BTreeMap<String, bool>,
    pub include: IncludeSection,
    pub timing: TimingSection,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    /// Explicit engine binary path; falls back to `SCOUR_ENGINE` and then
    /// `qgrep` on `PATH`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IncludeSection {
    /// Overrides for the managed shader include rules.
    pub shader_extensions: Option<Vec<String>>,
    /// Overrides for the managed script include rules.
    pub script_extensions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingSection {
    pub fs_debounce_ms: u64,
    pub config_debounce_ms: u64,
    pub watch_restart_delay_ms: u64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            fs_debounce_ms: 2000,
            config_debounce_ms: 500,
            watch_restart_delay_ms: 5000,
        }
    }
}

impl CliConfig {
    /// Loads the explicit file, else `./scour.toml`, else the user config
    /// dir, else defaults. Returns the path actually read, if any.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            let config = Self::read(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            return Ok((config, Some(path.to_path_buf())));
        }

        for candidate in Self::default_locations() {
            if candidate.is_file() {
                let config = Self::read(&candidate)
                    .with_context(|| format!("failed to read config {}", candidate.display()))?;
                return Ok((config, Some(candidate)));
            }
        }
        Ok((Self::default(), None))
    }

    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            locations.push(dir.join("scour").join(CONFIG_FILE_NAME));
        }
        locations
    }

    #[must_use]
    pub fn ignore_patterns(&self) -> Vec<(String, bool)> {
        self.ignore
            .iter()
            .map(|(pattern, enabled)| (pattern.clone(), *enabled))
            .collect()
    }

    #[must_use]
    pub fn to_service_config(&self) -> ServiceConfig {
        let defaults = ServiceConfig::default();
        ServiceConfig {
            engine_path: self.engine.path.clone(),
            shader_extensions: self
                .include
                .shader_extensions
                .clone()
                .unwrap_or(defaults.shader_extensions),
            script_extensions: self
                .include
                .script_extensions
                .clone()
                .unwrap_or(defaults.script_extensions),
            ignore_patterns: self.ignore_patterns(),
            fs_debounce: Duration::from_millis(self.timing.fs_debounce_ms),
            config_debounce: Duration::from_millis(self.timing.config_debounce_ms),
            watch_restart_delay: Duration::from_millis(self.timing.watch_restart_delay_ms),
            ..defaults
        }
    }
}
