//! Capability discovery.
//!
//! OpenSpec documents the integration targets accepted by `init --tools`
//! in its help output:
//!
//! ```text
//! Options:
//!   --tools <tools>  Configure AI tools non-interactively. Use "all", "none",
//!                    or a comma-separated list of: claude, cursor, windsurf
//!   -h, --help       display help for command
//! ```
//!
//! The list is re-read on every call, since the installed tool version (and
//! its capability set) can change between runs.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

use crate::config::EngineSettings;
use crate::error::ListingFailed;
use crate::process::{run_bounded, BoundedRun, CommandSpec, ProcessRunner};

use super::catalog::tool_program;
use super::invoke::{ALL_TOOLS, NO_TOOLS, TOOLS_FLAG};

const LIST_MARKER: &str = "list of:";

/// Lists the capabilities supported by the installed OpenSpec.
#[derive(Clone)]
pub struct CapabilityLister {
    runner: Arc<dyn ProcessRunner>,
    program: String,
    timeout: Duration,
}

impl CapabilityLister {
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: &EngineSettings) -> Self {
        Self {
            runner,
            program: tool_program(&settings.tool_command),
            timeout: settings.list_timeout(),
        }
    }

    pub fn help_command(&self) -> CommandSpec {
        CommandSpec::new(&self.program).args(["init", "--help"])
    }

    /// Returns the capability names in the order the tool reports them.
    pub async fn list_tools(&self) -> Result<Vec<String>, ListingFailed> {
        let command = self.help_command();
        debug!(command = %command, "Listing OpenSpec capabilities");

        let outcome = match run_bounded(self.runner.as_ref(), command, self.timeout).await {
            BoundedRun::Completed(outcome) => outcome,
            BoundedRun::LaunchFailed(e) => return Err(ListingFailed(e.to_string())),
            BoundedRun::TimedOut => {
                return Err(ListingFailed(format!(
                    "{} init --help did not finish within {} ms",
                    self.program,
                    self.timeout.as_millis()
                )))
            }
        };

        if !outcome.success() {
            return Err(ListingFailed(format!(
                "{} init --help exited with code {}",
                self.program, outcome.exit_code
            )));
        }

        let tools = parse_tools_help(&outcome.stdout)?;
        info!(count = tools.len(), "OpenSpec capabilities listed");
        Ok(tools)
    }
}

/// Parses the `--tools` option description from `init --help` output.
pub fn parse_tools_help(help: &str) -> Result<Vec<String>, ListingFailed> {
    static NAME_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let name_re = NAME_RE
        .get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9._-]*$").ok())
        .as_ref()
        .ok_or_else(|| ListingFailed("tool name pattern failed to compile".to_string()))?;

    let lines: Vec<&str> = help.lines().collect();
    let start = lines
        .iter()
        .position(|line| line.contains(TOOLS_FLAG))
        .ok_or_else(|| ListingFailed(format!("help output does not mention {}", TOOLS_FLAG)))?;

    // Option descriptions wrap onto indented continuation lines.
    let mut description = lines[start].trim().to_string();
    for line in &lines[start + 1..] {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('-') {
            break;
        }
        description.push(' ');
        description.push_str(trimmed);
    }

    let marker = description
        .to_ascii_lowercase()
        .find(LIST_MARKER)
        .ok_or_else(|| ListingFailed(format!("{} description has no tool list", TOOLS_FLAG)))?;
    let list = &description[marker + LIST_MARKER.len()..];

    let mut tools = Vec::new();
    for entry in list.split(',') {
        let name = entry.trim().trim_end_matches('.');
        if name.is_empty() || name == ALL_TOOLS || name == NO_TOOLS {
            continue;
        }
        if !name_re.is_match(name) {
            return Err(ListingFailed(format!("unrecognised tool name {:?}", name)));
        }
        tools.push(name.to_string());
    }

    Ok(tools)
}

#[cfg(all(test, not(windows)))]
mod tests {
    use super::*;
    use crate::process::testing::{Script, ScriptedRunner};

    const HELP: &str = "\
Usage: openspec init [options] [path]

Initialize OpenSpec in your project

Options:
  --tools <tools>  Configure AI tools non-interactively. Use \"all\", \"none\",
                   or a comma-separated list of: amazon-q, claude, cline,
                   cursor, github-copilot, windsurf
  -h, --help       display help for command
";

    #[test]
    fn test_parse_wrapped_help() {
        let tools = parse_tools_help(HELP).unwrap();
        assert_eq!(
            tools,
            vec!["amazon-q", "claude", "cline", "cursor", "github-copilot", "windsurf"]
        );
    }

    #[test]
    fn test_parse_single_line_with_period() {
        let help = "  --tools <tools>  Use a comma-separated list of: claude, cursor.\n";
        assert_eq!(parse_tools_help(help).unwrap(), vec!["claude", "cursor"]);
    }

    #[test]
    fn test_parse_empty_list_is_not_failure() {
        let help = "  --tools <tools>  Use \"all\", \"none\", or a comma-separated list of:\n";
        assert_eq!(parse_tools_help(help).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_parse_missing_tools_option() {
        let help = "Usage: openspec init [options]\n  -h, --help  display help\n";
        let err = parse_tools_help(help).unwrap_err();
        assert!(err.0.contains("--tools"));
    }

    #[test]
    fn test_parse_missing_list_marker() {
        let help = "  --tools <tools>  Configure AI tools\n";
        assert!(parse_tools_help(help).is_err());
    }

    #[test]
    fn test_parse_rejects_garbage_names() {
        let help = "  --tools <tools>  list of: claude, Not A Tool!\n";
        assert!(parse_tools_help(help).is_err());
    }

    #[tokio::test]
    async fn test_list_tools_from_runner() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.script("openspec init --help", Script::ok(HELP));
        let lister = CapabilityLister::new(runner.clone(), &EngineSettings::default());

        let tools = lister.list_tools().await.unwrap();
        assert_eq!(tools.len(), 6);
        assert_eq!(runner.call_count("openspec init --help"), 1);

        // Never cached: a second call launches again.
        lister.list_tools().await.unwrap();
        assert_eq!(runner.call_count("openspec init --help"), 2);
    }

    #[tokio::test]
    async fn test_list_tools_failures() {
        let runner = Arc::new(ScriptedRunner::new());
        let lister = CapabilityLister::new(runner.clone(), &EngineSettings::default());
        assert!(lister.list_tools().await.is_err());

        runner.script("openspec init --help", Script::fail(2, "unknown option"));
        let err = lister.list_tools().await.unwrap_err();
        assert!(err.0.contains("exited with code 2"));
    }
}
