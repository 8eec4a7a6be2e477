//! Package manager detection.
//!
//! Each known installer gets a short, bounded `--version` check. The checks are
//! independent and run concurrently; every failure is swallowed and recorded as
//! "not installed".

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info};

use crate::config::EngineSettings;
use crate::process::{run_bounded, BoundedRun, ProcessRunner};

use super::catalog::get_installer_definition;
use super::probe::extract_version;
use super::types::{InstallerDescriptor, InstallerId, InstallerSet};

/// Detects which package managers are present on the host.
#[derive(Clone)]
pub struct InstallerCatalog {
    runner: Arc<dyn ProcessRunner>,
    timeout: Duration,
}

impl InstallerCatalog {
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: &EngineSettings) -> Self {
        Self {
            runner,
            timeout: settings.detect_timeout(),
        }
    }

    /// Checks every installer. The result always holds all four identities.
    pub async fn detect(&self) -> InstallerSet {
        let checks = InstallerId::all().iter().map(|id| self.detect_one(*id));
        let set = InstallerSet::from_descriptors(join_all(checks).await);

        info!(
            installed = ?set.iter().filter(|d| d.installed).map(|d| d.name.as_str()).collect::<Vec<_>>(),
            "Installer detection complete"
        );
        set
    }

    async fn detect_one(&self, id: InstallerId) -> InstallerDescriptor {
        let command = get_installer_definition(id).version_command();

        match run_bounded(self.runner.as_ref(), command, self.timeout).await {
            BoundedRun::Completed(outcome) if outcome.success() => {
                InstallerDescriptor::present(id, parse_installer_version(&outcome.stdout))
            }
            BoundedRun::Completed(outcome) => {
                debug!(installer = %id, exit_code = outcome.exit_code, "Installer check failed");
                InstallerDescriptor::absent(id)
            }
            BoundedRun::LaunchFailed(e) => {
                debug!(installer = %id, error = %e, "Installer not found");
                InstallerDescriptor::absent(id)
            }
            BoundedRun::TimedOut => {
                debug!(installer = %id, "Installer check timed out");
                InstallerDescriptor::absent(id)
            }
        }
    }
}

/// Version token if present, else the first non-empty output line.
fn parse_installer_version(stdout: &str) -> Option<String> {
    extract_version(stdout).or_else(|| {
        stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::{Script, ScriptedRunner};

    fn catalog(runner: Arc<ScriptedRunner>) -> InstallerCatalog {
        let settings = EngineSettings {
            detect_timeout_ms: 100,
            ..Default::default()
        };
        InstallerCatalog::new(runner, &settings)
    }

    #[test]
    fn test_parse_installer_version() {
        assert_eq!(parse_installer_version("10.2.4\n").as_deref(), Some("10.2.4"));
        assert_eq!(parse_installer_version("\n  canary  \n").as_deref(), Some("canary"));
        assert_eq!(parse_installer_version(""), None);
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn test_detect_reports_every_identity() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.script("bun --version", Script::ok("1.1.38"));
        runner.script("yarn --version", Script::fail(1, "corepack error"));
        runner.script("pnpm --version", Script::Hang);
        // npm is unscripted: launch fails with NotFound

        let set = catalog(runner.clone()).detect().await;

        assert_eq!(set.len(), 4);
        for id in InstallerId::all() {
            assert_eq!(set.iter().filter(|d| d.name == *id).count(), 1);
        }
        assert_eq!(
            set.get(InstallerId::Bun),
            &InstallerDescriptor::present(InstallerId::Bun, Some("1.1.38".to_string()))
        );
        assert!(!set.is_installed(InstallerId::Npm));
        assert!(!set.is_installed(InstallerId::Pnpm));
        assert!(!set.is_installed(InstallerId::Yarn));
        assert_eq!(runner.launch_count(), 4);
    }

    #[tokio::test]
    async fn test_detect_with_nothing_installed() {
        let runner = Arc::new(ScriptedRunner::new());
        let set = catalog(runner).detect().await;
        assert_eq!(set, InstallerSet::none_installed());
    }
}
