//! Per-target-path session state machine.
//!
//! A [`Session`] owns the [`SessionState`] for one target path and drives it
//! through the tool lifecycle:
//!
//! ```text
//! Unknown -> Probing -> Available  (capabilities fetched)
//!                    -> Missing    (installers detected) -> install -> re-probe
//! ```
//!
//! Install and Invoke are independent sub-flows, each
//! `Idle -> Running -> Success | Failed`, re-enterable from a terminal state.
//! Preconditions are checked and the `Running` transition is made under one
//! write lock, so at most one run of each flow is in flight per session.
//!
//! # Architecture
//!
//! - `state`: The state aggregate and its flow records
//! - `events`: Broadcast notifications for front-ends

pub mod events;
pub mod state;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::discovery::ProjectInfo;
use crate::engine::Engine;
use crate::error::{EngineError, ListingFailed, PreconditionViolation};
use crate::output::{OperationKind, OutputLine};
use crate::process::{line_channel, LineSender, OperationOutcome};
use crate::spec_tool::{InstallerId, ToolAvailability, ToolSelectionMode};

pub use events::{SessionEvent, EVENT_CAPACITY};
pub use state::{FailureKind, FlowRecord, FlowStatus, Phase, SessionState};

/// Handle to one session. Clones share the same state.
#[derive(Clone)]
pub struct Session {
    engine: Engine,
    state: Arc<RwLock<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
}

fn ensure_open(state: &SessionState) -> Result<(), PreconditionViolation> {
    if state.closed {
        Err(PreconditionViolation::SessionClosed)
    } else {
        Ok(())
    }
}

fn is_current(state: &SessionState, generation: u64) -> bool {
    !state.closed && state.generation == generation
}

impl Session {
    pub(crate) fn new(engine: Engine, target_path: PathBuf) -> Self {
        Self {
            engine,
            state: Arc::new(RwLock::new(SessionState::new(target_path, 1))),
            events: events::event_channel(),
        }
    }

    /// Runs the opening probe (and whatever it triggers) plus discovery.
    pub(crate) async fn start(&self) {
        let generation = {
            let state = self.state.read().await;
            info!(path = %state.target_path.display(), generation = state.generation, "Session opened");
            state.generation
        };

        self.probe_and_follow(generation).await;
        if let Err(e) = self.refresh_project_for(generation).await {
            debug!(error = %e, "Project discovery failed on open");
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn target_path(&self) -> PathBuf {
        self.state.read().await.target_path.clone()
    }

    /// Subscribes to state-change events from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    async fn open_generation(&self) -> Result<u64, PreconditionViolation> {
        let state = self.state.read().await;
        ensure_open(&state)?;
        Ok(state.generation)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Resets the session for `target_path` (which may be the same path) and
    /// starts over with a fresh probe. Results of operations still running
    /// from before the reset are discarded.
    pub async fn reopen(&self, target_path: impl Into<PathBuf>) -> Result<(), EngineError> {
        let target_path = target_path.into();
        {
            let mut state = self.state.write().await;
            ensure_open(&state)?;
            let generation = state.generation + 1;
            info!(
                from = %state.target_path.display(),
                to = %target_path.display(),
                generation,
                "Session reopened"
            );
            *state = SessionState::new(target_path, generation);
        }

        self.start().await;
        Ok(())
    }

    /// Closes the session. Every later operation fails with `SessionClosed`.
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        if state.closed {
            return;
        }
        state.closed = true;
        state.generation += 1;
        info!(path = %state.target_path.display(), "Session closed");
        self.emit(SessionEvent::Closed {
            target: state.target_path.clone(),
        });
    }

    // =========================================================================
    // Availability, Capabilities, Installers
    // =========================================================================

    /// Re-probes the tool and follows the resulting phase.
    pub async fn refresh_availability(&self) -> Result<ToolAvailability, EngineError> {
        let generation = self.open_generation().await?;
        Ok(self.probe_and_follow(generation).await)
    }

    /// Fetches the capability list again. Capabilities only feed `invoke`,
    /// so this needs the tool to be available.
    pub async fn retry_capabilities(&self) -> Result<Vec<String>, EngineError> {
        let generation = {
            let state = self.state.read().await;
            ensure_open(&state)?;
            if state.phase != Phase::Available {
                return Err(PreconditionViolation::WrongPhase {
                    operation: OperationKind::Invoke,
                    expected: Phase::Available,
                    actual: state.phase,
                }
                .into());
            }
            state.generation
        };
        Ok(self.load_capabilities(generation).await?)
    }

    /// Re-runs project discovery. `None` when no discovery is configured.
    pub async fn refresh_project(&self) -> Result<Option<ProjectInfo>, EngineError> {
        let generation = self.open_generation().await?;
        self.refresh_project_for(generation).await
    }

    async fn probe_and_follow(&self, generation: u64) -> ToolAvailability {
        {
            let mut state = self.state.write().await;
            if !is_current(&state, generation) {
                return ToolAvailability::missing();
            }
            state.availability = None;
            if state.phase != Phase::Probing {
                state.phase = Phase::Probing;
                self.emit(SessionEvent::PhaseChanged {
                    target: state.target_path.clone(),
                    phase: Phase::Probing,
                });
            }
        }

        let availability = self.engine.prober().probe().await;
        self.fold_availability(generation, availability.clone()).await;
        availability
    }

    /// Stores a probe result. A phase change to `Available` fetches
    /// capabilities; a change to `Missing` detects installers.
    async fn fold_availability(&self, generation: u64, availability: ToolAvailability) {
        let entered = {
            let mut state = self.state.write().await;
            if !is_current(&state, generation) {
                debug!(generation, "Discarding stale availability");
                return;
            }

            let phase = Phase::from_availability(&availability);
            state.availability = Some(availability);
            if state.phase == phase {
                None
            } else {
                info!(
                    path = %state.target_path.display(),
                    from = %state.phase,
                    to = %phase,
                    "Session phase changed"
                );
                state.phase = phase;
                self.emit(SessionEvent::PhaseChanged {
                    target: state.target_path.clone(),
                    phase,
                });
                Some(phase)
            }
        };

        match entered {
            Some(Phase::Available) => {
                let _ = self.load_capabilities(generation).await;
            }
            Some(Phase::Missing) => self.detect_installers(generation).await,
            _ => {}
        }
    }

    async fn load_capabilities(&self, generation: u64) -> Result<Vec<String>, ListingFailed> {
        let result = self.engine.lister().list_tools().await;

        let mut state = self.state.write().await;
        if !is_current(&state, generation) {
            return result;
        }

        match &result {
            Ok(tools) => {
                state.capabilities = tools.clone();
                state.capabilities_error = None;
                let previous = std::mem::take(&mut state.selected);
                state.replace_selection(previous.iter().map(String::as_str));
                self.emit(SessionEvent::CapabilitiesLoaded {
                    target: state.target_path.clone(),
                    capabilities: tools.clone(),
                });
            }
            Err(e) => {
                warn!(path = %state.target_path.display(), error = %e, "Capability listing failed");
                state.capabilities.clear();
                state.selected.clear();
                state.capabilities_error = Some(e.to_string());
                self.emit(SessionEvent::CapabilitiesFailed {
                    target: state.target_path.clone(),
                    error: e.to_string(),
                });
            }
        }

        result
    }

    async fn detect_installers(&self, generation: u64) {
        let installers = self.engine.installer_catalog().detect().await;

        let mut state = self.state.write().await;
        if !is_current(&state, generation) {
            return;
        }

        let chosen = state
            .chosen_installer
            .filter(|id| installers.is_installed(*id))
            .or_else(|| installers.first_installed());
        debug!(chosen = ?chosen, "Installer selection updated");

        state.chosen_installer = chosen;
        state.installers = Some(installers.clone());
        self.emit(SessionEvent::InstallersDetected {
            target: state.target_path.clone(),
            installers,
        });
    }

    async fn refresh_project_for(
        &self,
        generation: u64,
    ) -> Result<Option<ProjectInfo>, EngineError> {
        let Some(discovery) = self.engine.discovery().cloned() else {
            return Ok(None);
        };
        let target_path = self.target_path().await;
        let result = discovery.discover(&target_path).await;

        let mut state = self.state.write().await;
        if is_current(&state, generation) {
            match &result {
                Ok(info) => {
                    state.project = Some(info.clone());
                    state.project_error = None;
                }
                Err(e) => {
                    state.project = None;
                    state.project_error = Some(e.code().to_string());
                }
            }
            self.emit(SessionEvent::ProjectRefreshed {
                target: state.target_path.clone(),
                project: state.project.clone(),
            });
        }

        Ok(Some(result?))
    }

    // =========================================================================
    // Selection
    // =========================================================================

    /// Picks the installer used by [`install_chosen`](Self::install_chosen).
    pub async fn choose_installer(&self, installer: InstallerId) -> Result<(), EngineError> {
        let mut state = self.state.write().await;
        ensure_open(&state)?;
        let installers = state
            .installers
            .as_ref()
            .ok_or(PreconditionViolation::InstallersNotDetected)?;
        if !installers.is_installed(installer) {
            return Err(PreconditionViolation::InstallerNotInstalled(installer).into());
        }
        state.chosen_installer = Some(installer);
        Ok(())
    }

    /// Sets the selection mode. Switching to `All` clears the selection.
    pub async fn set_mode(&self, mode: ToolSelectionMode) -> Result<(), EngineError> {
        let mut state = self.state.write().await;
        ensure_open(&state)?;
        state.mode = mode;
        if mode == ToolSelectionMode::All {
            state.selected.clear();
        }
        Ok(())
    }

    /// Flips one capability in or out of the selection. Returns whether it is
    /// now selected.
    pub async fn toggle_capability(&self, name: &str) -> Result<bool, EngineError> {
        let mut state = self.state.write().await;
        ensure_open(&state)?;
        if !state.capabilities.iter().any(|c| c == name) {
            return Err(PreconditionViolation::UnknownCapability(name.to_string()).into());
        }

        let mut wanted: Vec<String> = state.selected.clone();
        let now_selected = if let Some(pos) = wanted.iter().position(|s| s == name) {
            wanted.remove(pos);
            false
        } else {
            wanted.push(name.to_string());
            true
        };
        state.replace_selection(wanted.iter().map(String::as_str));
        Ok(now_selected)
    }

    /// Replaces the selection. Unknown names are dropped.
    pub async fn set_selected<I, S>(&self, names: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<S> = names.into_iter().collect();
        let mut state = self.state.write().await;
        ensure_open(&state)?;
        state.replace_selection(names.iter().map(|name| name.as_ref()));
        Ok(())
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Installs with the installer chosen by detection or `choose_installer`.
    pub async fn install_chosen(&self) -> Result<OperationOutcome, EngineError> {
        let chosen = {
            let state = self.state.read().await;
            ensure_open(&state)?;
            state.chosen_installer
        };
        match chosen {
            Some(installer) => self.install(installer).await,
            None => Err(PreconditionViolation::NoInstallerChosen.into()),
        }
    }

    /// Installs OpenSpec with `installer`.
    ///
    /// Requires phase `Missing`, an idle or finished Install flow, and an
    /// installer the last detection reported as installed. A non-zero exit is
    /// returned as an outcome; a launch failure as an error. Either way the
    /// tool is re-probed and the phase follows the result.
    pub async fn install(&self, installer: InstallerId) -> Result<OperationOutcome, EngineError> {
        let kind = OperationKind::Install;
        let (generation, target_path, installers) = {
            let mut state = self.state.write().await;
            ensure_open(&state)?;
            if state.install.status.is_running() {
                return Err(PreconditionViolation::AlreadyRunning(kind).into());
            }
            if state.phase != Phase::Missing {
                return Err(PreconditionViolation::WrongPhase {
                    operation: kind,
                    expected: Phase::Missing,
                    actual: state.phase,
                }
                .into());
            }
            let installers = state
                .installers
                .clone()
                .ok_or(PreconditionViolation::InstallersNotDetected)?;
            if !installers.is_installed(installer) {
                return Err(PreconditionViolation::InstallerNotInstalled(installer).into());
            }

            state.chosen_installer = Some(installer);
            let run_id = state.install.begin();
            info!(path = %state.target_path.display(), %installer, %run_id, "Install started");
            self.emit_flow(&state, kind);
            (state.generation, state.target_path.clone(), installers)
        };

        let installation = self.engine.installation().clone();
        let result = self
            .run_streaming(kind, generation, target_path, |lines| async move {
                installation.install(&installers, installer, Some(lines)).await
            })
            .await;

        match result {
            Ok(report) => {
                let succeeded = report.succeeded();
                let outcome = report.outcome.clone();
                let finished = outcome.clone();
                let tool = self.engine.settings().tool_command.clone();
                self.finish_flow(kind, generation, move |flow| {
                    if succeeded {
                        flow.succeed(finished);
                    } else if finished.success() {
                        flow.fail(
                            Some(FailureKind::InstalledButUnavailable),
                            format!(
                                "{} finished, but {} is still not available. Make sure the global bin directory is on PATH, then refresh.",
                                installer, tool
                            ),
                            Some(finished),
                        );
                    } else {
                        let code = finished.exit_code;
                        flow.fail(
                            Some(FailureKind::NonZeroExit(code)),
                            format!("{} exited with code {}", installer, code),
                            Some(finished),
                        );
                    }
                })
                .await;
                self.fold_availability(generation, report.availability).await;
                Ok(outcome)
            }
            Err(EngineError::Launch(e)) => {
                let message = e.to_string();
                self.finish_flow(kind, generation, |flow| {
                    flow.fail(Some(FailureKind::Launch), message, None)
                })
                .await;
                let availability = self.engine.prober().probe().await;
                self.fold_availability(generation, availability).await;
                Err(e.into())
            }
            Err(e) => {
                let message = e.to_string();
                self.finish_flow(kind, generation, |flow| flow.fail(None, message, None))
                    .await;
                Err(e)
            }
        }
    }

    /// Runs `init` in the target path with the current mode and selection.
    ///
    /// Requires phase `Available`, an idle or finished Invoke flow, a
    /// non-empty capability list and, in `Custom` mode, a non-empty selection.
    /// On success project discovery is refreshed.
    pub async fn invoke(&self) -> Result<OperationOutcome, EngineError> {
        let kind = OperationKind::Invoke;
        let (generation, target_path, mode, selected) = {
            let mut state = self.state.write().await;
            ensure_open(&state)?;
            if state.invoke.status.is_running() {
                return Err(PreconditionViolation::AlreadyRunning(kind).into());
            }
            if state.phase != Phase::Available {
                return Err(PreconditionViolation::WrongPhase {
                    operation: kind,
                    expected: Phase::Available,
                    actual: state.phase,
                }
                .into());
            }
            if state.capabilities.is_empty() {
                return Err(PreconditionViolation::NoCapabilities.into());
            }
            if state.mode == ToolSelectionMode::Custom && state.selected.is_empty() {
                return Err(PreconditionViolation::EmptyCustomSelection.into());
            }
            if !state.target_path.is_dir() {
                return Err(
                    PreconditionViolation::TargetNotDirectory(state.target_path.clone()).into(),
                );
            }

            let run_id = state.invoke.begin();
            info!(
                path = %state.target_path.display(),
                mode = %state.mode,
                %run_id,
                "Invoke started"
            );
            self.emit_flow(&state, kind);
            (
                state.generation,
                state.target_path.clone(),
                state.mode,
                state.selected.clone(),
            )
        };

        let invocation = self.engine.invocation().clone();
        let run_path = target_path.clone();
        let result = self
            .run_streaming(kind, generation, target_path, |lines| async move {
                invocation
                    .invoke(&run_path, mode, &selected, Some(lines))
                    .await
            })
            .await;

        match result {
            Ok(outcome) if outcome.success() => {
                let finished = outcome.clone();
                self.finish_flow(kind, generation, |flow| flow.succeed(finished))
                    .await;
                if let Err(e) = self.refresh_project_for(generation).await {
                    warn!(error = %e, "Project refresh after init failed");
                }
                Ok(outcome)
            }
            Ok(outcome) => {
                let code = outcome.exit_code;
                let finished = outcome.clone();
                self.finish_flow(kind, generation, |flow| {
                    flow.fail(
                        Some(FailureKind::NonZeroExit(code)),
                        format!("init exited with code {}", code),
                        Some(finished),
                    )
                })
                .await;
                Ok(outcome)
            }
            Err(EngineError::Launch(e)) => {
                let message = e.to_string();
                self.finish_flow(kind, generation, |flow| {
                    flow.fail(Some(FailureKind::Launch), message, None)
                })
                .await;
                Err(e.into())
            }
            Err(e) => {
                let message = e.to_string();
                self.finish_flow(kind, generation, |flow| flow.fail(None, message, None))
                    .await;
                Err(e)
            }
        }
    }

    // =========================================================================
    // Flow Plumbing
    // =========================================================================

    fn emit_flow(&self, state: &SessionState, kind: OperationKind) {
        self.emit(SessionEvent::FlowChanged {
            target: state.target_path.clone(),
            kind,
            status: state.flow(kind).status,
        });
    }

    /// Runs `op` with a line sender, appending each line to the flow log and
    /// publishing it, until the operation completes and the sender is dropped.
    async fn run_streaming<F, Fut, T>(
        &self,
        kind: OperationKind,
        generation: u64,
        target_path: PathBuf,
        op: F,
    ) -> T
    where
        F: FnOnce(LineSender) -> Fut,
        Fut: Future<Output = T>,
    {
        let (tx, mut rx) = line_channel();

        let forward = async {
            while let Some(line) = rx.recv().await {
                let line = OutputLine {
                    target: target_path.clone(),
                    kind,
                    stream: line.stream,
                    text: line.text,
                };
                {
                    let mut state = self.state.write().await;
                    if is_current(&state, generation) {
                        state.flow_mut(kind).log.push(line.clone());
                    }
                }
                self.engine.broadcaster().publish(line);
            }
        };

        let (result, ()) = tokio::join!(op(tx), forward);
        result
    }

    async fn finish_flow(
        &self,
        kind: OperationKind,
        generation: u64,
        finish: impl FnOnce(&mut FlowRecord),
    ) {
        let mut state = self.state.write().await;
        if !is_current(&state, generation) {
            debug!(%kind, generation, "Discarding stale flow result");
            return;
        }

        let flow = state.flow_mut(kind);
        finish(flow);
        info!(
            %kind,
            status = %flow.status,
            error = ?flow.error,
            "Flow finished"
        );
        self.emit_flow(&state, kind);
    }
}
