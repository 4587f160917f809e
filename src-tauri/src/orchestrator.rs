//! Download/install lifecycle.
//!
//! One `Orchestrator` owns the canonical [`OrchestratorState`]. User commands
//! and backend events reach it through a single channel and are handled one
//! at a time, each to completion, in arrival order. Every change is published
//! on a `watch` channel for readers.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::backend::{Backend, BackendEvent, DownloadProgress};
use crate::config::{BootstrapConfig, InstallMode};
use crate::error::{ApiError, ApiErrorCode, ApiResult, BootstrapError};
use crate::format;
use crate::logger;
use crate::release::{ReleaseMetadata, ReleaseSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecyclePhase {
    Idle,
    Downloading,
    Installing,
    Complete,
    Error,
}

/// Transfer figures as last reported by the backend.
///
/// `None` means unresolved: the backend has not supplied a usable value yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub percentage: Option<f64>,
    pub speed: Option<f64>,
    pub eta: Option<f64>,
}

impl ProgressSnapshot {
    /// Merge a backend sample. Percentage is only replaced by a non-negative
    /// value; the other optional fields only by defined ones.
    fn apply(&mut self, sample: &DownloadProgress) {
        self.downloaded_bytes = sample.downloaded_bytes;
        if let Some(total) = sample.total_bytes {
            self.total_bytes = Some(total);
        }
        if let Some(percentage) = sample.percentage.filter(|p| *p >= 0.0) {
            self.percentage = Some(percentage);
        }
        if let Some(speed) = sample.speed {
            self.speed = Some(speed);
        }
        if sample.eta.is_some() {
            self.eta = sample.eta;
        }
    }

    /// Display strings for the current figures
    pub fn labels(&self) -> ProgressLabels {
        let size = match self.total_bytes {
            // "12 MB / 80 MB", or just the downloaded amount while the total is unknown
            Some(total) => format!(
                "{} / {}",
                format::format_bytes(self.downloaded_bytes),
                format::format_bytes(total)
            ),
            None => format::format_bytes(self.downloaded_bytes),
        };
        ProgressLabels {
            size,
            rate: format::format_rate(self.speed.unwrap_or(0.0)),
            eta: format::format_eta(self.eta),
        }
    }
}

/// Preformatted progress text, refreshed on every publication
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressLabels {
    pub size: String,
    pub rate: String,
    pub eta: String,
}

impl Default for ProgressLabels {
    fn default() -> Self {
        ProgressSnapshot::default().labels()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorState {
    pub phase: LifecyclePhase,
    pub progress: ProgressSnapshot,
    pub labels: ProgressLabels,
    pub error_message: Option<String>,
    pub purge_previous: bool,
    pub previous_installation_detected: bool,
    /// Tag of the latest release, for display only
    pub latest_version: Option<String>,
    /// A start sequence is being processed (purge, URL lookup, download command)
    pub starting: bool,
}

impl OrchestratorState {
    /// `Start` is only honoured from `Idle` or `Error`, and not while a
    /// start sequence is already running
    pub fn accepts_start(&self) -> bool {
        !self.starting && matches!(self.phase, LifecyclePhase::Idle | LifecyclePhase::Error)
    }

    /// Command-boundary check so the UI learns about a rejected start
    pub fn check_start(&self) -> ApiResult<()> {
        if self.accepts_start() {
            return Ok(());
        }
        let detail = if self.starting {
            "starting".to_string()
        } else {
            format!("{:?}", self.phase).to_lowercase()
        };
        Err(ApiError::with_details(
            ApiErrorCode::InvalidState,
            "Installation cannot be started right now",
            detail,
        ))
    }
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self {
            phase: LifecyclePhase::Idle,
            progress: ProgressSnapshot::default(),
            labels: ProgressLabels::default(),
            error_message: None,
            purge_previous: false,
            previous_installation_detected: false,
            latest_version: None,
            starting: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Start,
    SetPurgePrevious(bool),
    CheckPreviousInstallation,
    RefreshVersion,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command(UserCommand),
    Event(BackendEvent),
}

/// Whether an inbound message changed anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    Ignored,
}

pub type Inbox = mpsc::UnboundedReceiver<Inbound>;

/// Sending side of the orchestrator's channel. Cheap to clone.
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl OrchestratorHandle {
    /// Queue a user command. Returns false once the orchestrator is gone.
    pub fn send(&self, command: UserCommand) -> bool {
        self.tx.send(Inbound::Command(command)).is_ok()
    }

    /// Queue a backend event. Returns false once the orchestrator is gone.
    pub fn emit(&self, event: BackendEvent) -> bool {
        self.tx.send(Inbound::Event(event)).is_ok()
    }
}

pub fn channel() -> (OrchestratorHandle, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OrchestratorHandle { tx }, rx)
}

pub struct Orchestrator {
    config: BootstrapConfig,
    backend: Arc<dyn Backend>,
    releases: Arc<dyn ReleaseSource>,
    state: OrchestratorState,
    publisher: watch::Sender<OrchestratorState>,
    inbox: Inbox,
    /// Messages pulled off the inbox while dropping stale starts
    backlog: VecDeque<Inbound>,
}

impl Orchestrator {
    pub fn new(
        config: BootstrapConfig,
        backend: Arc<dyn Backend>,
        releases: Arc<dyn ReleaseSource>,
        inbox: Inbox,
    ) -> Self {
        let state = OrchestratorState::default();
        let (publisher, _) = watch::channel(state.clone());
        Self {
            config,
            backend,
            releases,
            state,
            publisher,
            inbox,
            backlog: VecDeque::new(),
        }
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    /// Read-only view that follows every transition
    pub fn subscribe(&self) -> watch::Receiver<OrchestratorState> {
        self.publisher.subscribe()
    }

    fn publish(&mut self) {
        self.state.labels = self.state.progress.labels();
        self.publisher.send_replace(self.state.clone());
    }

    /// Startup work: show the window, look for an old install, fetch the
    /// version to display. None of it can move the machine to `Error`.
    pub async fn startup(&mut self) {
        if let Err(e) = self.backend.show_main_window().await {
            let error = BootstrapError::Backend(format!("show main window: {:#}", e));
            logger::log_error(&error.to_string(), Some("orchestrator"));
        }
        self.dispatch(Inbound::Command(UserCommand::CheckPreviousInstallation)).await;
        self.dispatch(Inbound::Command(UserCommand::RefreshVersion)).await;
    }

    /// Consume the inbox until every handle has been dropped
    pub async fn run(mut self) {
        loop {
            let message = match self.backlog.pop_front() {
                Some(message) => message,
                None => match self.inbox.recv().await {
                    Some(message) => message,
                    None => break,
                },
            };
            self.dispatch(message).await;
        }
        crate::log_debug!("Orchestrator inbox closed", "orchestrator");
    }

    pub async fn dispatch(&mut self, message: Inbound) -> Disposition {
        match message {
            Inbound::Command(command) => self.handle_command(command).await,
            Inbound::Event(event) => self.handle_event(event).await,
        }
    }

    async fn handle_command(&mut self, command: UserCommand) -> Disposition {
        match command {
            UserCommand::Start => self.start().await,
            UserCommand::SetPurgePrevious(purge) => {
                if self.state.purge_previous == purge {
                    return Disposition::Ignored;
                }
                self.state.purge_previous = purge;
                self.publish();
                Disposition::Applied
            }
            UserCommand::CheckPreviousInstallation => {
                let detected = self.backend.check_previous_installation().await;
                if detected {
                    logger::log_info("Previous installation detected", Some("orchestrator"));
                }
                self.state.previous_installation_detected = detected;
                self.publish();
                Disposition::Applied
            }
            UserCommand::RefreshVersion => match self.releases.fetch().await {
                Ok(metadata) => {
                    self.record_latest_version(&metadata);
                    self.publish();
                    Disposition::Applied
                }
                Err(e) => {
                    logger::log_error(&format!("Version display lookup failed: {}", e), Some("orchestrator"));
                    Disposition::Ignored
                }
            },
        }
    }

    async fn start(&mut self) -> Disposition {
        if !self.state.accepts_start() {
            logger::log_info(
                &format!("Start ignored while {:?}", self.state.phase),
                Some("orchestrator"),
            );
            return Disposition::Ignored;
        }

        logger::log_info("Starting download", Some("orchestrator"));
        self.state.phase = LifecyclePhase::Idle;
        self.state.error_message = None;
        self.state.starting = true;
        self.publish();

        let outcome = self.run_start_sequence().await;
        self.state.starting = false;
        match outcome {
            Ok(()) => self.publish(),
            Err(e) => self.fail(e),
        }

        self.drop_queued_starts();
        Disposition::Applied
    }

    async fn run_start_sequence(&mut self) -> Result<(), BootstrapError> {
        if self.state.purge_previous {
            self.backend
                .delete_previous_installation()
                .await
                .map_err(|e| BootstrapError::PurgeFailed(format!("{:#}", e)))?;
            self.state.previous_installation_detected = false;
            logger::log_info("Previous installation removed", Some("orchestrator"));
        }

        self.state.progress = ProgressSnapshot::default();
        self.state.phase = LifecyclePhase::Downloading;
        self.publish();

        let url = self.resolve_download_url().await?;
        self.backend
            .start_download(&url)
            .await
            .map_err(|e| BootstrapError::DownloadFailed(format!("{:#}", e)))?;
        crate::log_debug!(&format!("Download command issued for {}", url), "orchestrator");
        Ok(())
    }

    /// Latest installer URL, or the configured fallback when the lookup fails
    async fn resolve_download_url(&mut self) -> Result<String, BootstrapError> {
        match self.releases.fetch().await {
            Ok(metadata) => {
                self.record_latest_version(&metadata);
                Ok(metadata.download_url)
            }
            Err(e) => {
                logger::log_error(&e.to_string(), Some("orchestrator"));
                match &self.config.fallback_download_url {
                    Some(url) => {
                        logger::log_info(&format!("Using fallback URL {}", url), Some("orchestrator"));
                        Ok(url.clone())
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// Normalised semantic version when the tag is one, the raw tag otherwise
    fn record_latest_version(&mut self, metadata: &ReleaseMetadata) {
        let shown = match metadata.version() {
            Some(version) => version.to_string(),
            None => {
                logger::log_info(
                    &format!("Release tag '{}' is not a semantic version", metadata.version_tag),
                    Some("orchestrator"),
                );
                metadata.version_tag.clone()
            }
        };
        self.state.latest_version = Some(shown);
    }

    /// Starts that were queued behind an in-flight start are stale
    fn drop_queued_starts(&mut self) {
        while let Ok(message) = self.inbox.try_recv() {
            if message == Inbound::Command(UserCommand::Start) {
                crate::log_debug!("Dropping start queued during a start sequence", "orchestrator");
                continue;
            }
            self.backlog.push_back(message);
        }
    }

    fn fail(&mut self, error: BootstrapError) {
        logger::log_error(&error.to_string(), Some("orchestrator"));
        self.state.phase = LifecyclePhase::Error;
        self.state.error_message = Some(error.to_string());
        self.publish();
    }

    async fn handle_event(&mut self, event: BackendEvent) -> Disposition {
        let expected = match event {
            BackendEvent::DownloadProgress(_)
            | BackendEvent::DownloadComplete { .. }
            | BackendEvent::DownloadError { .. } => LifecyclePhase::Downloading,
            BackendEvent::InstallComplete | BackendEvent::InstallError { .. } => {
                LifecyclePhase::Installing
            }
        };
        if self.state.phase != expected {
            crate::log_debug!(
                &format!("Ignoring {} while {:?}", event.name(), self.state.phase),
                "orchestrator"
            );
            return Disposition::Ignored;
        }

        match event {
            BackendEvent::DownloadProgress(sample) => {
                self.state.progress.apply(&sample);
                self.publish();
            }
            BackendEvent::DownloadComplete {
                installer_path,
                total_bytes,
            } => self.on_download_complete(installer_path, total_bytes).await,
            BackendEvent::InstallComplete => self.on_install_complete().await,
            BackendEvent::DownloadError { message } => {
                self.fail(BootstrapError::DownloadFailed(message))
            }
            BackendEvent::InstallError { message } => {
                self.fail(BootstrapError::InstallFailed(message))
            }
        }
        Disposition::Applied
    }

    async fn on_download_complete(&mut self, installer_path: Option<String>, total_bytes: Option<u64>) {
        if let Some(total) = total_bytes {
            self.state.progress.total_bytes = Some(total);
        }
        self.state.progress.percentage = Some(100.0);
        self.state.progress.eta = None;
        logger::log_info("Download complete", Some("orchestrator"));

        match self.config.install_mode {
            InstallMode::Managed => {
                self.state.phase = LifecyclePhase::Installing;
                self.publish();
            }
            InstallMode::Handoff => {
                let Some(path) = installer_path else {
                    self.fail(BootstrapError::InstallFailed(
                        "Download finished without an installer path".to_string(),
                    ));
                    return;
                };
                if let Err(e) = self.backend.run_installer(&path).await {
                    self.fail(BootstrapError::InstallFailed(format!("{:#}", e)));
                    return;
                }
                self.state.phase = LifecyclePhase::Complete;
                self.publish();
                self.backend.exit_process().await;
            }
        }
    }

    async fn on_install_complete(&mut self) {
        self.state.phase = LifecyclePhase::Complete;
        self.publish();
        logger::log_info("Installation complete, launching", Some("orchestrator"));

        if let Err(e) = self.backend.launch_installed_app().await {
            // The install stands; only the handoff failed
            let error = BootstrapError::LaunchFailed(format!("{:#}", e));
            logger::log_error(&error.to_string(), Some("orchestrator"));
            self.state.error_message = Some(error.to_string());
            self.publish();
            return;
        }

        tokio::time::sleep(self.config.launch_grace()).await;
        self.backend.exit_process().await;
    }
}
