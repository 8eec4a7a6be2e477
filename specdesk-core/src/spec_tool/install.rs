//! Global installation of OpenSpec through a package manager.
//!
//! The install runs the chosen installer's global-install command with live
//! output, then always re-probes availability: a zero exit code does not prove
//! the tool is reachable (the global bin directory may not be on PATH).

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::EngineSettings;
use crate::error::{EngineError, PreconditionViolation};
use crate::process::{CommandSpec, LineSender, OperationOutcome, ProcessRunner};

use super::catalog::get_installer_definition;
use super::probe::AvailabilityProber;
use super::types::{InstallerId, InstallerSet, ToolAvailability};

/// Result of an install whose process ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub installer: InstallerId,
    pub outcome: OperationOutcome,
    /// Availability probed after the install process exited.
    pub availability: ToolAvailability,
}

impl InstallReport {
    /// The install exited cleanly and the tool is now usable.
    pub fn succeeded(&self) -> bool {
        self.outcome.success() && self.availability.available
    }
}

/// Installs OpenSpec package.
#[derive(Clone)]
pub struct Installation {
    runner: Arc<dyn ProcessRunner>,
    prober: AvailabilityProber,
    package: String,
}

impl Installation {
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: &EngineSettings) -> Self {
        Self {
            prober: AvailabilityProber::new(runner.clone(), settings),
            runner,
            package: settings.tool_package.clone(),
        }
    }

    pub fn install_command(&self, installer: InstallerId) -> CommandSpec {
        get_installer_definition(installer).install_command(&self.package)
    }

    /// Installs with `installer`, which `installers` must report as present.
    ///
    /// Lines are streamed to `lines` while the install runs. A launch failure
    /// is returned as an error; any completed run (whatever its exit code) is
    /// followed by a fresh probe and returned as a report.
    pub async fn install(
        &self,
        installers: &InstallerSet,
        installer: InstallerId,
        lines: Option<LineSender>,
    ) -> Result<InstallReport, EngineError> {
        if !installers.is_installed(installer) {
            return Err(PreconditionViolation::InstallerNotInstalled(installer).into());
        }

        let command = self.install_command(installer);
        info!(%installer, command = %command, "Installing OpenSpec");

        let outcome = self.runner.run(command, lines).await?;
        if !outcome.success() {
            warn!(%installer, exit_code = outcome.exit_code, "Install command failed");
        }

        let availability = self.prober.probe().await;

        Ok(InstallReport {
            installer,
            outcome,
            availability,
        })
    }
}
