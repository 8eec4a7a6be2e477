//! Core types for OpenSpec management.
//!
//! This module defines the values exchanged between the leaf components and
//! the session: tool availability snapshots, installer identities and their
//! detection results, and the tool-selection mode used to build `init`
//! arguments.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PreconditionViolation;

// ============================================================================
// Tool Availability
// ============================================================================

/// Snapshot produced by one availability probe. Superseded, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAvailability {
    pub available: bool,
    pub version: Option<String>,
}

impl ToolAvailability {
    pub fn available(version: Option<String>) -> Self {
        Self {
            available: true,
            version,
        }
    }

    pub fn missing() -> Self {
        Self {
            available: false,
            version: None,
        }
    }
}

// ============================================================================
// Installer Identifiers
// ============================================================================

/// Package managers able to install OpenSpec globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallerId {
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

impl InstallerId {
    /// Returns all installer IDs in catalog order.
    pub fn all() -> &'static [InstallerId] {
        &[Self::Npm, Self::Pnpm, Self::Yarn, Self::Bun]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
            Self::Bun => "bun",
        }
    }
}

impl fmt::Display for InstallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InstallerId {
    type Err = PreconditionViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "npm" => Ok(Self::Npm),
            "pnpm" => Ok(Self::Pnpm),
            "yarn" => Ok(Self::Yarn),
            "bun" => Ok(Self::Bun),
            _ => Err(PreconditionViolation::UnknownInstaller(s.to_string())),
        }
    }
}

// ============================================================================
// Installer Detection
// ============================================================================

/// Detection result for one package manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallerDescriptor {
    pub name: InstallerId,
    pub installed: bool,
    pub version: Option<String>,
}

impl InstallerDescriptor {
    pub fn absent(name: InstallerId) -> Self {
        Self {
            name,
            installed: false,
            version: None,
        }
    }

    pub fn present(name: InstallerId, version: Option<String>) -> Self {
        Self {
            name,
            installed: true,
            version,
        }
    }
}

/// Detection results for every known installer, in catalog order.
///
/// Membership is fixed: the set always holds exactly one descriptor per
/// [`InstallerId`]; absence is recorded as `installed = false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallerSet(Vec<InstallerDescriptor>);

impl InstallerSet {
    /// Builds the set by asking `describe` for every installer.
    ///
    /// The descriptor's `name` is forced to the requested identity.
    pub fn from_fn<F>(mut describe: F) -> Self
    where
        F: FnMut(InstallerId) -> InstallerDescriptor,
    {
        Self(
            InstallerId::all()
                .iter()
                .map(|id| InstallerDescriptor {
                    name: *id,
                    ..describe(*id)
                })
                .collect(),
        )
    }

    /// Builds the set from detection results, filling gaps with absent entries.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = InstallerDescriptor>) -> Self {
        let found: Vec<InstallerDescriptor> = descriptors.into_iter().collect();
        Self::from_fn(|id| {
            found
                .iter()
                .find(|d| d.name == id)
                .cloned()
                .unwrap_or_else(|| InstallerDescriptor::absent(id))
        })
    }

    /// A set where nothing is installed.
    pub fn none_installed() -> Self {
        Self::from_fn(InstallerDescriptor::absent)
    }

    pub fn get(&self, id: InstallerId) -> &InstallerDescriptor {
        // Every identity is present by construction.
        &self.0[InstallerId::all()
            .iter()
            .position(|candidate| *candidate == id)
            .unwrap_or_default()]
    }

    pub fn is_installed(&self, id: InstallerId) -> bool {
        self.get(id).installed
    }

    /// First installed installer in catalog order.
    pub fn first_installed(&self) -> Option<InstallerId> {
        self.0.iter().find(|d| d.installed).map(|d| d.name)
    }

    pub fn any_installed(&self) -> bool {
        self.first_installed().is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstallerDescriptor> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// Tool Selection
// ============================================================================

/// How the selected capability names are turned into `init` arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSelectionMode {
    /// Configure every tool OpenSpec supports.
    #[default]
    All,
    /// Configure no tools.
    None,
    /// Configure only the selected tools.
    Custom,
}

impl ToolSelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::None => "none",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ToolSelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installer_id_as_str() {
        assert_eq!(InstallerId::Npm.as_str(), "npm");
        assert_eq!(InstallerId::Pnpm.as_str(), "pnpm");
        assert_eq!(InstallerId::Yarn.as_str(), "yarn");
        assert_eq!(InstallerId::Bun.as_str(), "bun");
    }

    #[test]
    fn test_installer_id_from_str() {
        assert_eq!("npm".parse::<InstallerId>().unwrap(), InstallerId::Npm);
        assert_eq!("PNPM".parse::<InstallerId>().unwrap(), InstallerId::Pnpm);
        assert_eq!(" yarn ".parse::<InstallerId>().unwrap(), InstallerId::Yarn);
        assert_eq!("bun".parse::<InstallerId>().unwrap(), InstallerId::Bun);
        assert_eq!(
            "brew".parse::<InstallerId>().unwrap_err(),
            PreconditionViolation::UnknownInstaller("brew".to_string())
        );
    }

    #[test]
    fn test_installer_set_always_complete() {
        let set = InstallerSet::from_descriptors(vec![InstallerDescriptor::present(
            InstallerId::Bun,
            Some("1.1.0".to_string()),
        )]);

        assert_eq!(set.len(), 4);
        for id in InstallerId::all() {
            assert_eq!(set.iter().filter(|d| d.name == *id).count(), 1);
        }
        assert!(set.is_installed(InstallerId::Bun));
        assert!(!set.is_installed(InstallerId::Npm));
        assert_eq!(set.get(InstallerId::Bun).version.as_deref(), Some("1.1.0"));
        assert_eq!(set.first_installed(), Some(InstallerId::Bun));
    }

    #[test]
    fn test_installer_set_forces_names() {
        let set = InstallerSet::from_fn(|_| InstallerDescriptor::absent(InstallerId::Npm));
        let names: Vec<InstallerId> = set.iter().map(|d| d.name).collect();
        assert_eq!(names, InstallerId::all());
    }

    #[test]
    fn test_none_installed() {
        let set = InstallerSet::none_installed();
        assert!(!set.any_installed());
        assert_eq!(set.first_installed(), None);
    }

    #[test]
    fn test_selection_mode_default_and_serde() {
        assert_eq!(ToolSelectionMode::default(), ToolSelectionMode::All);
        let json = serde_json::to_string(&ToolSelectionMode::Custom).unwrap();
        assert_eq!(json, "\"custom\"");
    }
}
