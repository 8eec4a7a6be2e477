//! Environment helpers for launching OpenSpec.
//!
//! A global install frequently lands in a bin directory the current process
//! cannot see (a desktop app does not inherit the login shell's PATH). These
//! helpers build the `PATH` handed to child processes: the inherited entries
//! first, then configured extras, then the well-known global bin directories
//! of the supported package managers.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::config::EngineSettings;

/// Returns the global bin directories used by the supported package managers.
///
/// Existence is not checked here.
pub fn well_known_bin_dirs() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".bun").join("bin"));
        candidates.push(home.join(".npm-global").join("bin"));
        candidates.push(home.join(".yarn").join("bin"));
        candidates.push(
            home.join(".config")
                .join("yarn")
                .join("global")
                .join("node_modules")
                .join(".bin"),
        );

        #[cfg(target_os = "macos")]
        candidates.push(home.join("Library").join("pnpm"));
        #[cfg(not(target_os = "macos"))]
        candidates.push(home.join(".local").join("share").join("pnpm"));
    }

    #[cfg(windows)]
    {
        if let Some(data) = dirs::data_dir() {
            candidates.push(data.join("npm"));
        }
    }

    #[cfg(not(windows))]
    {
        candidates.push(PathBuf::from("/usr/local/bin"));
        candidates.push(PathBuf::from("/opt/homebrew/bin"));
    }

    candidates
}

/// Appends `candidates` to an existing PATH value, skipping duplicates.
///
/// Returns `None` if the result cannot be represented as a PATH (an entry
/// containing the platform separator).
pub fn augmented_path(existing: Option<&OsStr>, candidates: &[PathBuf]) -> Option<OsString> {
    let mut entries: Vec<PathBuf> = Vec::new();

    let inherited = existing.map(|p| std::env::split_paths(p).collect::<Vec<_>>());
    for entry in inherited
        .into_iter()
        .flatten()
        .chain(candidates.iter().cloned())
    {
        if entry.as_os_str().is_empty() || entries.contains(&entry) {
            continue;
        }
        entries.push(entry);
    }

    match std::env::join_paths(entries) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(error = %e, "Could not build augmented PATH");
            None
        }
    }
}

/// Computes the PATH for child processes, or `None` to inherit unchanged.
///
/// Well-known directories are included whether or not they exist yet: a
/// first global install creates them, and the runner keeps this PATH for
/// the lifetime of the engine.
pub fn search_path(settings: &EngineSettings) -> Option<OsString> {
    build_search_path(
        settings,
        std::env::var_os("PATH").as_deref(),
        well_known_bin_dirs(),
    )
}

fn build_search_path(
    settings: &EngineSettings,
    inherited: Option<&OsStr>,
    well_known: Vec<PathBuf>,
) -> Option<OsString> {
    if !settings.augment_path {
        return None;
    }

    let mut candidates = settings.extra_path_dirs.clone();
    candidates.extend(well_known);

    let path = augmented_path(inherited, &candidates)?;
    debug!(path = ?path, "Using augmented PATH for child processes");
    Some(path)
}
