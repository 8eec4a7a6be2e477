//! Session state aggregate.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::discovery::ProjectInfo;
use crate::output::{OperationKind, OutputLine};
use crate::process::OperationOutcome;
use crate::spec_tool::{InstallerId, InstallerSet, ToolAvailability, ToolSelectionMode};

// =============================================================================
// Phase
// =============================================================================

/// Coarse availability phase of OpenSpec for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Unknown,
    Probing,
    Available,
    Missing,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Probing => "probing",
            Self::Available => "available",
            Self::Missing => "missing",
        }
    }

    /// Phase implied by a probe result.
    pub fn from_availability(availability: &ToolAvailability) -> Self {
        if availability.available {
            Self::Available
        } else {
            Self::Missing
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Flows
// =============================================================================

/// Status of an Install or Invoke sub-flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    #[default]
    Idle,
    Running,
    Success,
    Failed,
}

impl FlowStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Why a sub-flow ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum FailureKind {
    /// The process could not be started.
    Launch,
    /// The process ran and exited with this non-zero code.
    NonZeroExit(i32),
    /// The install exited cleanly but the tool is still not reachable.
    InstalledButUnavailable,
}

impl FailureKind {
    /// Failures an environment fix (PATH, shell restart) can clear without
    /// re-running the operation; `refresh_availability` picks them up.
    pub fn is_retryable_after_env_fix(&self) -> bool {
        matches!(self, Self::InstalledButUnavailable)
    }
}

/// One Install or Invoke sub-flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlowRecord {
    pub status: FlowStatus,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    /// Output of the current (or last) run, in arrival order.
    pub log: Vec<OutputLine>,
    pub outcome: Option<OperationOutcome>,
    pub run_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl FlowRecord {
    /// Moves to `Running`, discarding everything from the previous run.
    pub(crate) fn begin(&mut self) -> Uuid {
        let run_id = Uuid::new_v4();
        *self = Self {
            status: FlowStatus::Running,
            run_id: Some(run_id),
            started_at: Some(Utc::now()),
            ..Self::default()
        };
        run_id
    }

    pub(crate) fn succeed(&mut self, outcome: OperationOutcome) {
        self.status = FlowStatus::Success;
        self.outcome = Some(outcome);
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn fail(
        &mut self,
        failure: Option<FailureKind>,
        message: impl Into<String>,
        outcome: Option<OperationOutcome>,
    ) {
        self.status = FlowStatus::Failed;
        self.failure = failure;
        self.error = Some(message.into());
        self.outcome = outcome;
        self.finished_at = Some(Utc::now());
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Everything a session knows about one target path.
///
/// Only the session mutates this; callers get clones via `snapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub target_path: PathBuf,
    /// Bumped on every open or reopen. Results of operations started under an
    /// older generation are dropped.
    pub generation: u64,
    pub closed: bool,
    pub phase: Phase,
    /// `None` while unknown or probing.
    pub availability: Option<ToolAvailability>,
    /// `None` until detection has run.
    pub installers: Option<InstallerSet>,
    pub chosen_installer: Option<InstallerId>,
    /// Capability names in the order the tool reports them.
    pub capabilities: Vec<String>,
    pub capabilities_error: Option<String>,
    pub mode: ToolSelectionMode,
    /// Selected capability names, kept in capability-list order.
    pub selected: Vec<String>,
    pub install: FlowRecord,
    pub invoke: FlowRecord,
    pub project: Option<ProjectInfo>,
    pub project_error: Option<String>,
}

impl SessionState {
    pub fn new(target_path: PathBuf, generation: u64) -> Self {
        Self {
            target_path,
            generation,
            closed: false,
            phase: Phase::Unknown,
            availability: None,
            installers: None,
            chosen_installer: None,
            capabilities: Vec::new(),
            capabilities_error: None,
            mode: ToolSelectionMode::default(),
            selected: Vec::new(),
            install: FlowRecord::default(),
            invoke: FlowRecord::default(),
            project: None,
            project_error: None,
        }
    }

    pub fn flow(&self, kind: OperationKind) -> &FlowRecord {
        match kind {
            OperationKind::Install => &self.install,
            OperationKind::Invoke => &self.invoke,
        }
    }

    pub(crate) fn flow_mut(&mut self, kind: OperationKind) -> &mut FlowRecord {
        match kind {
            OperationKind::Install => &mut self.install,
            OperationKind::Invoke => &mut self.invoke,
        }
    }

    /// Stores `names` restricted to known capabilities, deduplicated and in
    /// capability-list order.
    pub(crate) fn replace_selection<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        let wanted: Vec<&str> = names.into_iter().collect();
        self.selected = self
            .capabilities
            .iter()
            .filter(|c| wanted.contains(&c.as_str()))
            .cloned()
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_unknown_and_idle() {
        let state = SessionState::new(PathBuf::from("/repo/a"), 1);
        assert_eq!(state.phase, Phase::Unknown);
        assert_eq!(state.install.status, FlowStatus::Idle);
        assert_eq!(state.invoke.status, FlowStatus::Idle);
        assert_eq!(state.mode, ToolSelectionMode::All);
        assert!(state.installers.is_none());
    }

    #[test]
    fn test_begin_clears_previous_run() {
        let mut flow = FlowRecord::default();
        flow.begin();
        flow.log.push(OutputLine {
            target: PathBuf::from("/repo/a"),
            kind: OperationKind::Invoke,
            stream: crate::output::OutputStream::Out,
            text: "first".to_string(),
        });
        flow.fail(Some(FailureKind::NonZeroExit(2)), "boom", None);
        let first_run = flow.run_id;

        flow.begin();
        assert_eq!(flow.status, FlowStatus::Running);
        assert!(flow.log.is_empty());
        assert!(flow.error.is_none());
        assert!(flow.failure.is_none());
        assert_ne!(flow.run_id, first_run);
        assert!(flow.finished_at.is_none());
    }

    #[test]
    fn test_replace_selection_uses_capability_order() {
        let mut state = SessionState::new(PathBuf::from("/repo/a"), 1);
        state.capabilities = vec!["claude".into(), "cursor".into(), "windsurf".into()];

        state.replace_selection(["windsurf", "bogus", "claude", "windsurf"]);
        assert_eq!(state.selected, vec!["claude", "windsurf"]);
    }

    #[test]
    fn test_failure_kind_retryable() {
        assert!(FailureKind::InstalledButUnavailable.is_retryable_after_env_fix());
        assert!(!FailureKind::Launch.is_retryable_after_env_fix());
        assert!(!FailureKind::NonZeroExit(1).is_retryable_after_env_fix());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Missing.to_string(), "missing");
        assert_eq!(
            Phase::from_availability(&ToolAvailability::available(None)),
            Phase::Available
        );
    }
}
