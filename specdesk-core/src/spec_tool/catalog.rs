//! Installer catalog with hardcoded definitions.
//!
//! This module contains the static definitions for every supported package
//! manager: executable names per platform, the presence check, and the
//! global-install invocation for OpenSpec package.

use crate::process::CommandSpec;

use super::types::InstallerId;

/// Platform-specific executable names.
#[derive(Debug, Clone)]
pub struct ExecutableNames {
    /// Name on Linux and macOS.
    pub unix: &'static str,
    /// Name on Windows (package managers ship `.cmd` shims there).
    pub windows: &'static str,
}

impl ExecutableNames {
    /// Returns the executable name for the current platform.
    pub fn current(&self) -> &'static str {
        #[cfg(windows)]
        {
            self.windows
        }
        #[cfg(not(windows))]
        {
            self.unix
        }
    }
}

/// Complete definition of a package manager.
#[derive(Debug, Clone)]
pub struct InstallerDefinition {
    pub id: InstallerId,
    pub display_name: &'static str,
    pub executable: ExecutableNames,
    /// Arguments for the lightweight presence check.
    pub version_args: &'static [&'static str],
    /// Arguments preceding the package identity in a global install.
    pub global_install_args: &'static [&'static str],
}

impl InstallerDefinition {
    /// The presence check, e.g. `pnpm --version`.
    pub fn version_command(&self) -> CommandSpec {
        CommandSpec::new(self.executable.current()).args(self.version_args.iter().copied())
    }

    /// The global install of `package`, e.g. `bun add -g <package>`.
    pub fn install_command(&self, package: &str) -> CommandSpec {
        CommandSpec::new(self.executable.current())
            .args(self.global_install_args.iter().copied())
            .arg(package)
    }
}

// ============================================================================
// Definitions
// ============================================================================

const NPM_DEFINITION: InstallerDefinition = InstallerDefinition {
    id: InstallerId::Npm,
    display_name: "npm",
    executable: ExecutableNames {
        unix: "npm",
        windows: "npm.cmd",
    },
    version_args: &["--version"],
    global_install_args: &["install", "-g"],
};

const PNPM_DEFINITION: InstallerDefinition = InstallerDefinition {
    id: InstallerId::Pnpm,
    display_name: "pnpm",
    executable: ExecutableNames {
        unix: "pnpm",
        windows: "pnpm.cmd",
    },
    version_args: &["--version"],
    global_install_args: &["add", "-g"],
};

const YARN_DEFINITION: InstallerDefinition = InstallerDefinition {
    id: InstallerId::Yarn,
    display_name: "Yarn",
    executable: ExecutableNames {
        unix: "yarn",
        windows: "yarn.cmd",
    },
    version_args: &["--version"],
    global_install_args: &["global", "add"],
};

const BUN_DEFINITION: InstallerDefinition = InstallerDefinition {
    id: InstallerId::Bun,
    display_name: "Bun",
    executable: ExecutableNames {
        unix: "bun",
        windows: "bun",
    },
    version_args: &["--version"],
    global_install_args: &["add", "-g"],
};

static ALL_INSTALLERS: [InstallerDefinition; 4] = [
    NPM_DEFINITION,
    PNPM_DEFINITION,
    YARN_DEFINITION,
    BUN_DEFINITION,
];

// ============================================================================
// Public API
// ============================================================================

/// Returns the definition for an installer.
pub fn get_installer_definition(id: InstallerId) -> &'static InstallerDefinition {
    match id {
        InstallerId::Npm => &ALL_INSTALLERS[0],
        InstallerId::Pnpm => &ALL_INSTALLERS[1],
        InstallerId::Yarn => &ALL_INSTALLERS[2],
        InstallerId::Bun => &ALL_INSTALLERS[3],
    }
}

/// Returns all installer definitions in catalog order.
pub fn get_all_installer_definitions() -> &'static [InstallerDefinition] {
    &ALL_INSTALLERS
}

/// Resolves OpenSpec command for the current platform.
///
/// On Windows a bare command name gets the `.cmd` suffix that global npm-style
/// installs create; explicit names and paths with an extension are kept.
pub fn tool_program(command: &str) -> String {
    #[cfg(windows)]
    {
        if std::path::Path::new(command).extension().is_none() {
            return format!("{}.cmd", command);
        }
    }
    command.to_string()
}
