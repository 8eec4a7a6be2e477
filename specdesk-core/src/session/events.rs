//! State-change notifications emitted by a session.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::discovery::ProjectInfo;
use crate::output::OperationKind;
use crate::spec_tool::InstallerSet;

use super::state::{FlowStatus, Phase};

/// Capacity of a session's event channel. Slow receivers see `Lagged`.
pub const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    PhaseChanged {
        target: PathBuf,
        phase: Phase,
    },
    InstallersDetected {
        target: PathBuf,
        installers: InstallerSet,
    },
    CapabilitiesLoaded {
        target: PathBuf,
        capabilities: Vec<String>,
    },
    CapabilitiesFailed {
        target: PathBuf,
        error: String,
    },
    FlowChanged {
        target: PathBuf,
        kind: OperationKind,
        status: FlowStatus,
    },
    ProjectRefreshed {
        target: PathBuf,
        project: Option<ProjectInfo>,
    },
    Closed {
        target: PathBuf,
    },
}

impl SessionEvent {
    pub fn target(&self) -> &Path {
        match self {
            Self::PhaseChanged { target, .. }
            | Self::InstallersDetected { target, .. }
            | Self::CapabilitiesLoaded { target, .. }
            | Self::CapabilitiesFailed { target, .. }
            | Self::FlowChanged { target, .. }
            | Self::ProjectRefreshed { target, .. }
            | Self::Closed { target } => target,
        }
    }
}

pub(crate) fn event_channel() -> broadcast::Sender<SessionEvent> {
    let (tx, _) = broadcast::channel(EVENT_CAPACITY);
    tx
}
