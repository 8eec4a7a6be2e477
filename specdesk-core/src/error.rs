//! Error taxonomy for the engine.
//!
//! Leaf components return these as typed values; only the session state
//! machine turns them into flow states and user-facing messages.

use std::path::PathBuf;

use thiserror::Error;

use crate::discovery::DiscoveryError;
use crate::output::OperationKind;
use crate::process::LaunchError;
use crate::session::Phase;
use crate::spec_tool::InstallerId;

/// An operation was requested outside its allowed state transitions.
///
/// Always raised before any process is launched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionViolation {
    #[error("Unknown installer: {0}")]
    UnknownInstaller(String),
    #[error("Installer {0} is not installed on this system")]
    InstallerNotInstalled(InstallerId),
    #[error("Installers have not been detected yet")]
    InstallersNotDetected,
    #[error("No installer selected")]
    NoInstallerChosen,
    #[error("Custom tool selection requires at least one selected tool")]
    EmptyCustomSelection,
    #[error("No tools are available to configure")]
    NoCapabilities,
    #[error("Unknown tool: {0}")]
    UnknownCapability(String),
    #[error("Target path is not a directory: {}", .0.display())]
    TargetNotDirectory(PathBuf),
    #[error("{operation} requires the tool to be {expected}, but it is {actual}")]
    WrongPhase {
        operation: OperationKind,
        expected: Phase,
        actual: Phase,
    },
    #[error("{0} is already running")]
    AlreadyRunning(OperationKind),
    #[error("Session is closed")]
    SessionClosed,
}

/// OpenSpec's capability list could not be determined.
///
/// Distinct from an empty list, which is a legitimate answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Could not list tools: {0}")]
pub struct ListingFailed(pub String);

/// Errors surfaced by the engine's operation surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Precondition(#[from] PreconditionViolation),
    #[error(transparent)]
    Listing(#[from] ListingFailed),
    #[error("Project discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
}
