//! Engine settings for Specdesk.
//!
//! Settings are persisted as a JSON file. Every field has a default, so a
//! partial (or absent) file is always usable.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Executable name of OpenSpec.
pub const DEFAULT_TOOL_COMMAND: &str = "openspec";

/// Package identity installed by the package managers.
pub const DEFAULT_TOOL_PACKAGE: &str = "@fission-ai/openspec@latest";

/// Subdirectory of the OS config directory holding the settings file.
const CONFIG_DIR_NAME: &str = "specdesk";

const MIN_TIMEOUT_MS: u64 = 100;
const MAX_TIMEOUT_MS: u64 = 120_000;

// =============================================================================
// Engine Settings
// =============================================================================

/// Engine settings - persisted as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Command used to launch OpenSpec.
    pub tool_command: String,

    /// Package identity handed to the package manager's global install.
    pub tool_package: String,

    /// Timeout for the `--version` availability probe.
    pub probe_timeout_ms: u64,

    /// Timeout for each package-manager presence check.
    pub detect_timeout_ms: u64,

    /// Timeout for the capability listing invocation.
    pub list_timeout_ms: u64,

    /// Extend the child PATH with well-known global bin directories.
    pub augment_path: bool,

    /// Additional directories appended to the child PATH.
    pub extra_path_dirs: Vec<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tool_command: DEFAULT_TOOL_COMMAND.to_string(),
            tool_package: DEFAULT_TOOL_PACKAGE.to_string(),
            probe_timeout_ms: 3_000,
            detect_timeout_ms: 2_000,
            list_timeout_ms: 10_000,
            augment_path: true,
            extra_path_dirs: Vec::new(),
        }
    }
}

impl EngineSettings {
    /// Returns the default settings file location.
    ///
    /// Path: `{config_dir}/specdesk/settings.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join("settings.json"))
    }

    /// Loads settings from the default location, falling back to defaults.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory on this platform, using default settings");
                Ok(Self::default())
            }
        }
    }

    /// Loads settings from a specific file.
    ///
    /// A missing file yields defaults. A corrupt file is logged and also
    /// yields defaults, so a bad edit never prevents startup.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Settings not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        match serde_json::from_str::<EngineSettings>(&content) {
            Ok(mut settings) => {
                settings.validate();
                Ok(settings)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to parse settings at {}, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
        }
    }

    /// Saves settings to a specific file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        debug!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Validate and clamp settings to valid ranges.
    pub fn validate(&mut self) {
        self.probe_timeout_ms = self.probe_timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);
        self.detect_timeout_ms = self
            .detect_timeout_ms
            .clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);
        self.list_timeout_ms = self.list_timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);

        if self.tool_command.trim().is_empty() {
            self.tool_command = DEFAULT_TOOL_COMMAND.to_string();
        }
        if self.tool_package.trim().is_empty() {
            self.tool_package = DEFAULT_TOOL_PACKAGE.to_string();
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn detect_timeout(&self) -> Duration {
        Duration::from_millis(self.detect_timeout_ms)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_millis(self.list_timeout_ms)
    }
}
