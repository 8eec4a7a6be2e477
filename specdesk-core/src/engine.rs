//! Engine facade.
//!
//! The [`Engine`] wires the stateless OpenSpec components to one shared
//! [`ProcessRunner`] and [`OutputBroadcaster`], and opens sessions.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::config::EngineSettings;
use crate::discovery::{GitProjectDiscovery, ProjectDiscovery};
use crate::error::ListingFailed;
use crate::output::{OutputBroadcaster, OutputFilter, Subscription};
use crate::process::{ProcessRunner, SystemProcessRunner};
use crate::session::Session;
use crate::spec_tool::{
    search_path, AvailabilityProber, CapabilityLister, InstallerCatalog, InstallerSet,
    Installation, Invocation, ToolAvailability,
};

/// Entry point for front-ends. Cheap to clone; clones share the runner,
/// settings and broadcaster.
#[derive(Clone)]
pub struct Engine {
    settings: Arc<EngineSettings>,
    prober: AvailabilityProber,
    installer_catalog: InstallerCatalog,
    installation: Installation,
    lister: CapabilityLister,
    invocation: Invocation,
    broadcaster: OutputBroadcaster,
    discovery: Option<Arc<dyn ProjectDiscovery>>,
}

impl Engine {
    /// Creates an engine that launches real processes, with git-backed
    /// project discovery.
    pub fn new(mut settings: EngineSettings) -> Self {
        settings.validate();
        let runner: Arc<dyn ProcessRunner> = match search_path(&settings) {
            Some(path) => Arc::new(SystemProcessRunner::with_search_path(path)),
            None => Arc::new(SystemProcessRunner::new()),
        };
        info!(
            tool = %settings.tool_command,
            augment_path = settings.augment_path,
            "Engine initialized"
        );

        let discovery = Arc::new(GitProjectDiscovery::new(runner.clone()));
        Self::with_runner(runner, settings).with_discovery(discovery)
    }

    /// Creates an engine over a custom runner. No project discovery is
    /// configured.
    pub fn with_runner(runner: Arc<dyn ProcessRunner>, settings: EngineSettings) -> Self {
        Self {
            prober: AvailabilityProber::new(runner.clone(), &settings),
            installer_catalog: InstallerCatalog::new(runner.clone(), &settings),
            installation: Installation::new(runner.clone(), &settings),
            lister: CapabilityLister::new(runner.clone(), &settings),
            invocation: Invocation::new(runner.clone(), &settings),
            broadcaster: OutputBroadcaster::new(),
            discovery: None,
            settings: Arc::new(settings),
        }
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn ProjectDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // =========================================================================
    // Stateless Surface
    // =========================================================================

    /// Probes OpenSpec.
    pub async fn availability(&self) -> ToolAvailability {
        self.prober.probe().await
    }

    /// Checks every known package manager.
    pub async fn detect_installers(&self) -> InstallerSet {
        self.installer_catalog.detect().await
    }

    /// Lists the tools `init --tools` accepts.
    pub async fn list_capabilities(&self) -> Result<Vec<String>, ListingFailed> {
        self.lister.list_tools().await
    }

    pub fn broadcaster(&self) -> &OutputBroadcaster {
        &self.broadcaster
    }

    /// Subscribes to every output line from every session.
    pub fn subscribe(&self) -> Subscription {
        self.broadcaster.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: OutputFilter) -> Subscription {
        self.broadcaster.subscribe_filtered(filter)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Opens a session for `target_path` and runs its initial probe.
    pub async fn open_session(&self, target_path: impl Into<PathBuf>) -> Session {
        let session = Session::new(self.clone(), target_path.into());
        session.start().await;
        session
    }

    pub(crate) fn prober(&self) -> &AvailabilityProber {
        &self.prober
    }

    pub(crate) fn installer_catalog(&self) -> &InstallerCatalog {
        &self.installer_catalog
    }

    pub(crate) fn installation(&self) -> &Installation {
        &self.installation
    }

    pub(crate) fn lister(&self) -> &CapabilityLister {
        &self.lister
    }

    pub(crate) fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub(crate) fn discovery(&self) -> Option<&Arc<dyn ProjectDiscovery>> {
        self.discovery.as_ref()
    }
}

#[cfg(all(test, not(windows)))]
mod tests {
    use super::*;
    use crate::discovery::{DiscoveryError, ProjectInfo};
    use crate::process::testing::{Script, ScriptedRunner};
    use crate::spec_tool::InstallerId;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;

    struct FixedDiscovery;

    #[async_trait]
    impl ProjectDiscovery for FixedDiscovery {
        async fn discover(&self, path: &Path) -> Result<ProjectInfo, DiscoveryError> {
            Ok(ProjectInfo {
                repo_path: path.to_path_buf(),
                repo_name: "fixture".to_string(),
                openspec_present: true,
            })
        }
    }

    #[tokio::test]
    async fn test_detect_installers_reports_all_four() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.script("pnpm --version", Script::ok("9.0.0"));
        let engine = Engine::with_runner(runner, EngineSettings::default());

        let set = engine.detect_installers().await;
        assert_eq!(set.len(), 4);
        assert_eq!(set.first_installed(), Some(InstallerId::Pnpm));
    }

    #[tokio::test]
    async fn test_stateless_surface() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.script("openspec --version", Script::ok("0.9.1"));
        runner.script(
            "openspec init --help",
            Script::ok("  --tools <tools>  list of: claude"),
        );
        let engine = Engine::with_runner(runner, EngineSettings::default());

        assert_eq!(
            engine.availability().await.version.as_deref(),
            Some("0.9.1")
        );
        assert_eq!(engine.list_capabilities().await.unwrap(), vec!["claude"]);
    }

    #[tokio::test]
    async fn test_successful_invoke_refreshes_project() {
        let temp_dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.script("openspec --version", Script::ok("0.9.1"));
        runner.script(
            "openspec init --help",
            Script::ok("  --tools <tools>  list of: claude"),
        );
        runner.script("openspec init --tools all", Script::ok("done"));
        let engine = Engine::with_runner(runner, EngineSettings::default())
            .with_discovery(Arc::new(FixedDiscovery));

        let session = engine.open_session(temp_dir.path()).await;
        assert_eq!(session.snapshot().await.project.unwrap().repo_name, "fixture");

        let mut events = session.subscribe_events();
        session.invoke().await.unwrap();
        let mut refreshed = false;
        while let Ok(event) = events.try_recv() {
            if let crate::session::SessionEvent::ProjectRefreshed { project, .. } = event {
                refreshed = project.is_some();
            }
        }
        assert!(refreshed);
    }

    #[test]
    fn test_new_validates_settings() {
        let engine = Engine::new(EngineSettings {
            probe_timeout_ms: 0,
            ..Default::default()
        });
        assert_eq!(engine.settings().probe_timeout_ms, 100);
        assert!(engine.discovery().is_some());
    }
}
