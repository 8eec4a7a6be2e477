//! Specdesk CLI
//!
//! Terminal front-end for the Specdesk engine: check whether OpenSpec is
//! available for a project, install it with a detected package manager, and
//! run `openspec init` with a tool selection.

use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use specdesk_core::spec_tool::get_installer_definition;
use specdesk_core::{
    Engine, EngineSettings, FlowRecord, FlowStatus, InstallerId, OutputLine, OutputStream, Phase,
    Subscription, ToolSelectionMode,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Specdesk - set up OpenSpec for a project
#[derive(Parser, Debug)]
#[command(name = "specdesk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show tool availability, installers or tools, and project status
    Status {
        /// Project directory
        path: PathBuf,
    },

    /// List package managers and whether they are installed
    Installers,

    /// List the tools `openspec init --tools` accepts
    Tools,

    /// Install OpenSpec globally with a package manager
    Install {
        /// npm, pnpm, yarn or bun
        installer: String,

        /// Project directory the install is run for
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Run `openspec init` in a project
    Init {
        /// Project directory
        path: PathBuf,

        #[command(flatten)]
        selection: Selection,
    },
}

/// Which tools to configure.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct Selection {
    /// Configure every tool
    #[arg(long)]
    pub all: bool,

    /// Configure no tools
    #[arg(long)]
    pub none: bool,

    /// Comma-separated tool names
    #[arg(long, value_delimiter = ',')]
    pub tools: Option<Vec<String>>,
}

impl Selection {
    fn mode(&self) -> ToolSelectionMode {
        if self.all {
            ToolSelectionMode::All
        } else if self.none {
            ToolSelectionMode::None
        } else {
            ToolSelectionMode::Custom
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    info!("Starting Specdesk v{}", specdesk_core::VERSION);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so tool output on stdout stays clean.
fn init_logging(debug: bool) {
    let default = if debug { "specdesk=debug" } else { "specdesk=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(path: Option<&PathBuf>) -> Result<EngineSettings> {
    match path {
        Some(path) => EngineSettings::load_from(path),
        None => EngineSettings::load(),
    }
}

/// Runs a command. `Ok(false)` means it ran but did not succeed.
async fn run(cli: Cli) -> Result<bool> {
    let settings = load_settings(cli.config.as_ref()).context("Failed to load settings")?;
    let engine = Engine::new(settings);

    match cli.command {
        Command::Status { path } => status(&engine, path).await,
        Command::Installers => {
            for descriptor in engine.detect_installers().await.iter() {
                println!(
                    "{:<5} {}",
                    installer_label(descriptor.name),
                    describe_installed(descriptor.installed, descriptor.version.as_deref())
                );
            }
            Ok(true)
        }
        Command::Tools => {
            for tool in engine.list_capabilities().await? {
                println!("{}", tool);
            }
            Ok(true)
        }
        Command::Install { installer, path } => {
            let installer: InstallerId = installer.parse()?;
            let path = match path {
                Some(path) => path,
                None => std::env::current_dir().context("Failed to resolve current directory")?,
            };
            install(&engine, installer, path).await
        }
        Command::Init { path, selection } => init(&engine, path, selection).await,
    }
}

async fn status(engine: &Engine, path: PathBuf) -> Result<bool> {
    let session = engine.open_session(path).await;
    let state = session.snapshot().await;

    println!("path:    {}", state.target_path.display());
    println!("openspec: {}", describe_availability(&state.availability));

    match (&state.project, &state.project_error) {
        (Some(project), _) => println!(
            "project: {} ({}openspec/ directory)",
            project.repo_name,
            if project.openspec_present { "has " } else { "no " }
        ),
        (None, Some(code)) => println!("project: {}", code),
        (None, None) => {}
    }

    match state.phase {
        Phase::Available => match &state.capabilities_error {
            Some(error) => println!("tools:   unavailable ({})", error),
            None => println!("tools:   {}", state.capabilities.join(", ")),
        },
        Phase::Missing => {
            if let Some(installers) = &state.installers {
                println!("installers:");
                for descriptor in installers.iter() {
                    println!(
                        "  {:<5} {}",
                        installer_label(descriptor.name),
                        describe_installed(descriptor.installed, descriptor.version.as_deref())
                    );
                }
            }
            match state.chosen_installer {
                Some(id) => println!("run `specdesk install {}` to install openspec", id),
                None => println!("no supported package manager found (npm, pnpm, yarn, bun)"),
            }
        }
        Phase::Unknown | Phase::Probing => {}
    }

    Ok(true)
}

async fn install(engine: &Engine, installer: InstallerId, path: PathBuf) -> Result<bool> {
    let mut output = engine.subscribe();
    let session = engine.open_session(path).await;

    let result = stream_output(&mut output, session.install(installer)).await;
    result?;

    let state = session.snapshot().await;
    report_flow("install", &state.install);
    if state.phase == Phase::Available {
        println!("openspec {}", describe_availability(&state.availability));
    }
    Ok(state.install.status == FlowStatus::Success)
}

async fn init(engine: &Engine, path: PathBuf, selection: Selection) -> Result<bool> {
    let mut output = engine.subscribe();
    let session = engine.open_session(path).await;

    let state = session.snapshot().await;
    if state.phase != Phase::Available {
        bail!("openspec is not available; run `specdesk status` for install options");
    }

    session.set_mode(selection.mode()).await?;
    if let Some(tools) = &selection.tools {
        let unknown: Vec<&str> = tools
            .iter()
            .map(String::as_str)
            .filter(|t| !state.capabilities.iter().any(|c| c == t))
            .collect();
        if !unknown.is_empty() {
            bail!(
                "Unknown tool(s): {}. Available: {}",
                unknown.join(", "),
                state.capabilities.join(", ")
            );
        }
        session.set_selected(tools).await?;
    }

    let result = stream_output(&mut output, session.invoke()).await;
    result?;

    let state = session.snapshot().await;
    report_flow("init", &state.invoke);
    Ok(state.invoke.status == FlowStatus::Success)
}

/// Drives `op` to completion while printing operation output as it arrives.
async fn stream_output<F, T>(output: &mut Subscription, op: F) -> T
where
    F: Future<Output = T>,
{
    tokio::pin!(op);
    let result = loop {
        tokio::select! {
            result = &mut op => break result,
            Some(line) = output.recv() => print_line(&line),
        }
    };

    for line in output.drain() {
        print_line(&line);
    }
    result
}

fn print_line(line: &OutputLine) {
    match line.stream {
        OutputStream::Out => println!("{}", line.text),
        OutputStream::Err => eprintln!("{}", line.text),
    }
}

fn report_flow(name: &str, flow: &FlowRecord) {
    match (&flow.status, &flow.error) {
        (FlowStatus::Success, _) => println!("{} succeeded", name),
        (_, Some(error)) => eprintln!("{} failed: {}", name, error),
        (status, None) => eprintln!("{} {}", name, status),
    }
}

fn describe_availability(availability: &Option<specdesk_core::ToolAvailability>) -> String {
    match availability {
        Some(a) if a.available => match &a.version {
            Some(version) => format!("available ({})", version),
            None => "available".to_string(),
        },
        Some(_) => "missing".to_string(),
        None => "unknown".to_string(),
    }
}

fn installer_label(id: InstallerId) -> &'static str {
    get_installer_definition(id).display_name
}

fn describe_installed(installed: bool, version: Option<&str>) -> String {
    match (installed, version) {
        (true, Some(version)) => format!("installed ({})", version),
        (true, None) => "installed".to_string(),
        (false, _) => "not installed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_init_with_tools() {
        let cli = Cli::try_parse_from(["specdesk", "init", "/repo/a", "--tools", "claude,cursor"])
            .unwrap();
        match cli.command {
            Command::Init { path, selection } => {
                assert_eq!(path, PathBuf::from("/repo/a"));
                assert_eq!(selection.mode(), ToolSelectionMode::Custom);
                assert_eq!(
                    selection.tools,
                    Some(vec!["claude".to_string(), "cursor".to_string()])
                );
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_init_modes() {
        let cli = Cli::try_parse_from(["specdesk", "init", ".", "--all"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Init { ref selection, .. } if selection.mode() == ToolSelectionMode::All
        ));

        let cli = Cli::try_parse_from(["specdesk", "init", ".", "--none"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Init { ref selection, .. } if selection.mode() == ToolSelectionMode::None
        ));
    }

    #[test]
    fn test_init_requires_exactly_one_selection() {
        assert!(Cli::try_parse_from(["specdesk", "init", "."]).is_err());
        assert!(Cli::try_parse_from(["specdesk", "init", ".", "--all", "--none"]).is_err());
    }

    #[test]
    fn test_parse_install_with_global_config() {
        let cli = Cli::try_parse_from([
            "specdesk",
            "install",
            "bun",
            "--path",
            "/repo/a",
            "--config",
            "/tmp/settings.json",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/settings.json")));
        match cli.command {
            Command::Install { installer, path } => {
                assert_eq!(installer.parse::<InstallerId>().unwrap(), InstallerId::Bun);
                assert_eq!(path, Some(PathBuf::from("/repo/a")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_describe_helpers() {
        assert_eq!(describe_installed(true, Some("1.1.38")), "installed (1.1.38)");
        assert_eq!(describe_installed(false, Some("1.1.38")), "not installed");
        assert_eq!(describe_availability(&None), "unknown");
        assert_eq!(installer_label(InstallerId::Bun), "Bun");
        assert_eq!(installer_label(InstallerId::Pnpm), "pnpm");
        assert_eq!(
            describe_availability(&Some(specdesk_core::ToolAvailability::missing())),
            "missing"
        );
    }
}
