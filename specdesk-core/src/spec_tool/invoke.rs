//! Invocation of OpenSpec's `init` command.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::EngineSettings;
use crate::error::{EngineError, PreconditionViolation};
use crate::process::{CommandSpec, LineSender, OperationOutcome, ProcessRunner};

use super::catalog::tool_program;
use super::types::ToolSelectionMode;

/// Flag selecting the tools to configure.
pub const TOOLS_FLAG: &str = "--tools";
/// Flag value meaning every tool.
pub const ALL_TOOLS: &str = "all";
/// Flag value meaning no tools.
pub const NO_TOOLS: &str = "none";
/// Separator between selected tool names.
pub const TOOL_DELIMITER: &str = ",";

/// Builds the `init` arguments for a selection.
///
/// `selected` is only consulted in `Custom` mode, where it must be non-empty.
/// Names are joined in the order given; no deduplication or sorting happens
/// here.
pub fn build_init_args(
    mode: ToolSelectionMode,
    selected: &[String],
) -> Result<Vec<String>, PreconditionViolation> {
    let value = match mode {
        ToolSelectionMode::All => ALL_TOOLS.to_string(),
        ToolSelectionMode::None => NO_TOOLS.to_string(),
        ToolSelectionMode::Custom => {
            if selected.is_empty() {
                return Err(PreconditionViolation::EmptyCustomSelection);
            }
            selected.join(TOOL_DELIMITER)
        }
    };

    Ok(vec!["init".to_string(), TOOLS_FLAG.to_string(), value])
}

/// Runs `init` for a target project.
#[derive(Clone)]
pub struct Invocation {
    runner: Arc<dyn ProcessRunner>,
    program: String,
}

impl Invocation {
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: &EngineSettings) -> Self {
        Self {
            runner,
            program: tool_program(&settings.tool_command),
        }
    }

    /// The full command for a selection, run from `target`.
    pub fn init_command(
        &self,
        target: &Path,
        mode: ToolSelectionMode,
        selected: &[String],
    ) -> Result<CommandSpec, PreconditionViolation> {
        let args = build_init_args(mode, selected)?;
        Ok(CommandSpec::new(&self.program)
            .args(args)
            .current_dir(target))
    }

    /// Runs `init` in `target`, streaming output to `lines`.
    ///
    /// The caller is responsible for refreshing project status after a
    /// successful run; this does not inspect what the tool wrote.
    pub async fn invoke(
        &self,
        target: &Path,
        mode: ToolSelectionMode,
        selected: &[String],
        lines: Option<LineSender>,
    ) -> Result<OperationOutcome, EngineError> {
        let command = self.init_command(target, mode, selected)?;
        if !target.is_dir() {
            return Err(PreconditionViolation::TargetNotDirectory(target.to_path_buf()).into());
        }

        info!(path = %target.display(), command = %command, "Invoking OpenSpec");
        Ok(self.runner.run(command, lines).await?)
    }
}

#[cfg(all(test, not(windows)))]
mod tests {
    use super::*;
    use crate::process::testing::{Script, ScriptedRunner};
    use tempfile::TempDir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_args_for_all() {
        let args = build_init_args(ToolSelectionMode::All, &names(&["ignored"])).unwrap();
        assert_eq!(args, vec!["init", "--tools", "all"]);
    }

    #[test]
    fn test_args_for_none() {
        let args = build_init_args(ToolSelectionMode::None, &[]).unwrap();
        assert_eq!(args, vec!["init", "--tools", "none"]);
    }

    #[test]
    fn test_args_for_custom_keep_caller_order() {
        let args = build_init_args(ToolSelectionMode::Custom, &names(&["x", "y"])).unwrap();
        assert_eq!(args, vec!["init", "--tools", "x,y"]);

        let args = build_init_args(ToolSelectionMode::Custom, &names(&["y", "x", "y"])).unwrap();
        assert_eq!(args[2], "y,x,y");
    }

    #[test]
    fn test_custom_requires_selection() {
        assert_eq!(
            build_init_args(ToolSelectionMode::Custom, &[]).unwrap_err(),
            PreconditionViolation::EmptyCustomSelection
        );
    }

    #[tokio::test]
    async fn test_invoke_runs_in_target() {
        let temp_dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.script("openspec init --tools cursor", Script::ok("done"));
        let invocation = Invocation::new(runner.clone(), &EngineSettings::default());

        let outcome = invocation
            .invoke(
                temp_dir.path(),
                ToolSelectionMode::Custom,
                &names(&["cursor"]),
                None,
            )
            .await
            .unwrap();

        assert!(outcome.success());
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].cwd.as_deref(), Some(temp_dir.path()));
    }

    #[tokio::test]
    async fn test_invoke_preconditions_do_not_launch() {
        let temp_dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let invocation = Invocation::new(runner.clone(), &EngineSettings::default());

        let err = invocation
            .invoke(temp_dir.path(), ToolSelectionMode::Custom, &[], None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::Precondition(PreconditionViolation::EmptyCustomSelection)
        );

        let missing = temp_dir.path().join("missing");
        let err = invocation
            .invoke(&missing, ToolSelectionMode::All, &[], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Precondition(PreconditionViolation::TargetNotDirectory(_))
        ));

        assert_eq!(runner.launch_count(), 0);
    }
}
