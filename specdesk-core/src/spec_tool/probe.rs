//! Availability probing for OpenSpec.
//!
//! A probe runs `<tool> --version` with a short timeout. Every outcome maps to
//! exactly one of available/missing: a launch failure, a non-zero exit and a
//! timeout all report the tool as missing.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

use crate::config::EngineSettings;
use crate::process::{run_bounded, BoundedRun, CommandSpec, ProcessRunner};

use super::catalog::tool_program;
use super::types::ToolAvailability;

/// Detailed result of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Available { version: Option<String> },
    Missing { reason: String },
    /// The probe neither succeeded nor failed within the timeout.
    Inconclusive,
}

impl ProbeOutcome {
    pub fn availability(&self) -> ToolAvailability {
        match self {
            Self::Available { version } => ToolAvailability::available(version.clone()),
            Self::Missing { .. } | Self::Inconclusive => ToolAvailability::missing(),
        }
    }
}

/// Runs OpenSpec's version invocation.
#[derive(Clone)]
pub struct AvailabilityProber {
    runner: Arc<dyn ProcessRunner>,
    program: String,
    timeout: Duration,
}

impl AvailabilityProber {
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: &EngineSettings) -> Self {
        Self {
            runner,
            program: tool_program(&settings.tool_command),
            timeout: settings.probe_timeout(),
        }
    }

    pub fn version_command(&self) -> CommandSpec {
        CommandSpec::new(&self.program).arg("--version")
    }

    /// Probes and reports why the tool is or is not usable.
    pub async fn probe_outcome(&self) -> ProbeOutcome {
        let outcome = match run_bounded(self.runner.as_ref(), self.version_command(), self.timeout)
            .await
        {
            BoundedRun::Completed(outcome) if outcome.success() => {
                let version =
                    extract_version(&outcome.stdout).or_else(|| extract_version(&outcome.stderr));
                ProbeOutcome::Available { version }
            }
            BoundedRun::Completed(outcome) => ProbeOutcome::Missing {
                reason: format!("{} exited with code {}", self.program, outcome.exit_code),
            },
            BoundedRun::LaunchFailed(e) => ProbeOutcome::Missing {
                reason: e.to_string(),
            },
            BoundedRun::TimedOut => ProbeOutcome::Inconclusive,
        };

        match &outcome {
            ProbeOutcome::Available { version } => {
                info!(program = %self.program, version = ?version, "OpenSpec available")
            }
            ProbeOutcome::Missing { reason } => {
                info!(program = %self.program, %reason, "OpenSpec missing")
            }
            ProbeOutcome::Inconclusive => info!(
                program = %self.program,
                timeout_ms = self.timeout.as_millis() as u64,
                "OpenSpec probe timed out, treating as missing"
            ),
        }

        outcome
    }

    /// Probes the tool. Never fails: absence is a normal result.
    pub async fn probe(&self) -> ToolAvailability {
        self.probe_outcome().await.availability()
    }
}

/// Extracts the first semver-like token (`1.2.3`, `0.9.0-beta.1`) from `text`.
pub fn extract_version(text: &str) -> Option<String> {
    static VERSION_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = VERSION_RE
        .get_or_init(|| {
            Regex::new(r"(\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?)").ok()
        })
        .as_ref()?;

    let version = re.captures(text)?.get(1)?.as_str().to_string();
    debug!(%version, "Extracted version token");
    Some(version)
}
