//! Project discovery for a target path.
//!
//! Resolves the git work tree containing a path and reports whether it has
//! already been initialised for OpenSpec (an `openspec/` directory at the
//! repository root). The session re-runs discovery after a successful
//! `init`, and front-ends may call it directly.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::process::{CommandSpec, ProcessRunner};

/// Directory OpenSpec creates at the repository root.
pub const OPENSPEC_DIR: &str = "openspec";

/// What discovery learned about a target path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub repo_path: PathBuf,
    pub repo_name: String,
    pub openspec_present: bool,
}

/// Why discovery could not describe a path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("Path does not exist")]
    PathNotFound,
    #[error("Path is not a directory")]
    PathNotDirectory,
    #[error("git is not available")]
    GitUnavailable,
    #[error("Path is not inside a git work tree")]
    NotGitWorkTree,
    #[error("Could not determine the repository root")]
    RepoRootUnavailable,
    #[error("I/O error: {0}")]
    Io(String),
}

impl DiscoveryError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PathNotFound => "path_not_found",
            Self::PathNotDirectory => "path_not_directory",
            Self::GitUnavailable => "git_unavailable",
            Self::NotGitWorkTree => "not_git_work_tree",
            Self::RepoRootUnavailable => "repo_root_unavailable",
            Self::Io(_) => "io_error",
        }
    }
}

impl From<io::Error> for DiscoveryError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Describes the project a path belongs to.
#[async_trait]
pub trait ProjectDiscovery: Send + Sync {
    async fn discover(&self, path: &Path) -> Result<ProjectInfo, DiscoveryError>;
}

/// Discovery backed by `git rev-parse --show-toplevel`.
#[derive(Clone)]
pub struct GitProjectDiscovery {
    runner: Arc<dyn ProcessRunner>,
}

impl GitProjectDiscovery {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    fn toplevel_command(path: &Path) -> CommandSpec {
        CommandSpec::new("git")
            .arg("-C")
            .arg(path.to_string_lossy())
            .args(["rev-parse", "--show-toplevel"])
    }
}

#[async_trait]
impl ProjectDiscovery for GitProjectDiscovery {
    async fn discover(&self, path: &Path) -> Result<ProjectInfo, DiscoveryError> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DiscoveryError::PathNotFound)
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_dir() {
            return Err(DiscoveryError::PathNotDirectory);
        }

        let outcome = self
            .runner
            .run(Self::toplevel_command(path), None)
            .await
            .map_err(|e| {
                debug!(error = %e, "git launch failed");
                DiscoveryError::GitUnavailable
            })?;

        if !outcome.success() {
            return Err(DiscoveryError::NotGitWorkTree);
        }

        let root = outcome.stdout.trim();
        if root.is_empty() {
            return Err(DiscoveryError::RepoRootUnavailable);
        }

        let repo_path = PathBuf::from(root);
        let openspec_present = fs::metadata(repo_path.join(OPENSPEC_DIR))
            .map(|m| m.is_dir())
            .unwrap_or(false);
        let repo_name = repo_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(root)
            .to_string();

        debug!(repo = %repo_path.display(), openspec_present, "Project discovered");
        Ok(ProjectInfo {
            repo_path,
            repo_name,
            openspec_present,
        })
    }
}
