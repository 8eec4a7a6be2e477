//! Operations against the OpenSpec command-line tool.
//!
//! Everything here is stateless: each component holds a shared
//! [`ProcessRunner`](crate::process::ProcessRunner) and the relevant settings,
//! and can be called concurrently from any number of sessions.
//!
//! # Architecture
//!
//! - `types`: Core types (ToolAvailability, InstallerId, InstallerSet, ToolSelectionMode)
//! - `catalog`: Static installer definitions and their command shapes
//! - `env`: Search-path augmentation for launched processes
//! - `probe`: `openspec --version` availability probe
//! - `installers`: Concurrent package manager detection
//! - `install`: Global install with output streaming and re-probe
//! - `capabilities`: Tool listing from `openspec init --help`
//! - `invoke`: `openspec init --tools ...` argument building and invocation
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use specdesk_core::config::EngineSettings;
//! use specdesk_core::process::SystemProcessRunner;
//! use specdesk_core::spec_tool::{AvailabilityProber, InstallerCatalog};
//!
//! let settings = EngineSettings::default();
//! let runner = Arc::new(SystemProcessRunner::new());
//!
//! if !AvailabilityProber::new(runner.clone(), &settings).probe().await.available {
//!     let installers = InstallerCatalog::new(runner, &settings).detect().await;
//!     println!("First usable installer: {:?}", installers.first_installed());
//! }
//! ```

pub mod capabilities;
pub mod catalog;
pub mod env;
pub mod install;
pub mod installers;
pub mod invoke;
pub mod probe;
pub mod types;

// Re-export commonly used types
pub use capabilities::{parse_tools_help, CapabilityLister};
pub use catalog::{get_all_installer_definitions, get_installer_definition, InstallerDefinition};
pub use env::{augmented_path, search_path, well_known_bin_dirs};
pub use install::{InstallReport, Installation};
pub use installers::InstallerCatalog;
pub use invoke::{build_init_args, Invocation, ALL_TOOLS, NO_TOOLS, TOOLS_FLAG};
pub use probe::{extract_version, AvailabilityProber, ProbeOutcome};
pub use types::{InstallerDescriptor, InstallerId, InstallerSet, ToolAvailability, ToolSelectionMode};
