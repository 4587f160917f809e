//! Installer backend: the command surface the orchestrator drives and the
//! events it pushes back.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::app_dirs;
use crate::config::{BootstrapConfig, InstallMode};
use crate::logger;
use crate::orchestrator::OrchestratorHandle;

/// Minimum spacing between two `download-progress` events
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Pause between killing the launcher and deleting its files
const KILL_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Flags for a silent NSIS install
const SILENT_INSTALL_ARGS: [&str; 2] = ["/S", "/NORESTART"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub downloaded_bytes: u64,
    #[serde(default)]
    pub total_bytes: Option<u64>,
    /// Negative or absent while the total size is unknown
    #[serde(default)]
    pub percentage: Option<f64>,
    /// Bytes per second since the download started
    #[serde(default)]
    pub speed: Option<f64>,
    /// Seconds remaining
    #[serde(default)]
    pub eta: Option<f64>,
}

/// Notifications pushed by the backend. Delivery is at-least-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum BackendEvent {
    DownloadProgress(DownloadProgress),
    #[serde(rename_all = "camelCase")]
    DownloadComplete {
        #[serde(default)]
        installer_path: Option<String>,
        #[serde(default)]
        total_bytes: Option<u64>,
    },
    InstallComplete,
    DownloadError {
        message: String,
    },
    InstallError {
        message: String,
    },
}

impl BackendEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            BackendEvent::DownloadProgress(_) => "download-progress",
            BackendEvent::DownloadComplete { .. } => "download-complete",
            BackendEvent::InstallComplete => "install-complete",
            BackendEvent::DownloadError { .. } => "download-error",
            BackendEvent::InstallError { .. } => "install-error",
        }
    }
}

/// Commands the orchestrator issues. Each is awaited before the orchestrator
/// moves on; `start_download` only starts the transfer, its outcome arrives
/// as events.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn check_previous_installation(&self) -> bool;
    async fn delete_previous_installation(&self) -> Result<()>;
    async fn start_download(&self, url: &str) -> Result<()>;
    async fn run_installer(&self, installer_path: &str) -> Result<()>;
    async fn launch_installed_app(&self) -> Result<()>;
    async fn exit_process(&self);
    async fn show_main_window(&self) -> Result<()>;
}

/// Window and process control owned by the UI shell
pub trait WindowHost: Send + Sync {
    fn show_main_window(&self) -> Result<()>;
    fn exit(&self, code: i32);
}

/// Host for runs without a webview
pub struct HeadlessHost;

impl WindowHost for HeadlessHost {
    fn show_main_window(&self) -> Result<()> {
        Ok(())
    }

    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

/// Filesystem locations the native backend works with
#[derive(Debug, Clone)]
pub struct LauncherPaths {
    pub previous_installation: Option<PathBuf>,
    pub installed_executable: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
}

impl LauncherPaths {
    pub fn detect() -> Self {
        Self {
            previous_installation: app_dirs::previous_installation_dir(),
            installed_executable: app_dirs::installed_executable_path(),
            download_dir: app_dirs::download_dir(),
        }
    }
}

/// Backend that downloads with reqwest and runs installers as child processes
pub struct NativeBackend {
    client: reqwest::Client,
    install_mode: InstallMode,
    paths: LauncherPaths,
    events: OrchestratorHandle,
    host: Arc<dyn WindowHost>,
    kill_settle: Duration,
}

impl NativeBackend {
    pub fn new(
        config: &BootstrapConfig,
        paths: LauncherPaths,
        events: OrchestratorHandle,
        host: Arc<dyn WindowHost>,
    ) -> Result<Self> {
        // No overall timeout: installers are large and the transfer may be slow
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.http_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            install_mode: config.install_mode,
            paths,
            events,
            host,
            kill_settle: KILL_SETTLE_DELAY,
        })
    }

    #[cfg(test)]
    fn with_kill_settle(mut self, delay: Duration) -> Self {
        self.kill_settle = delay;
        self
    }
}

#[async_trait]
impl Backend for NativeBackend {
    async fn check_previous_installation(&self) -> bool {
        self.paths
            .previous_installation
            .as_deref()
            .map(Path::is_dir)
            .unwrap_or(false)
    }

    async fn delete_previous_installation(&self) -> Result<()> {
        kill_launcher_process().await?;
        tokio::time::sleep(self.kill_settle).await;

        let dir = self
            .paths
            .previous_installation
            .as_ref()
            .ok_or_else(|| anyhow!("Failed to get home directory"))?;

        if dir.is_dir() {
            tokio::fs::remove_dir_all(dir)
                .await
                .with_context(|| format!("Failed to delete previous installation at {}", dir.display()))?;
            logger::log_info(
                &format!("Removed previous installation at {}", dir.display()),
                Some("backend"),
            );
        }
        Ok(())
    }

    async fn start_download(&self, url: &str) -> Result<()> {
        let download_dir = self
            .paths
            .download_dir
            .clone()
            .ok_or_else(|| anyhow!("Failed to get Downloads directory"))?;
        let file_path = download_dir.join(app_dirs::installer_file_name(url));

        let job = DownloadJob {
            client: self.client.clone(),
            url: url.to_string(),
            file_path,
            install_mode: self.install_mode,
            events: self.events.clone(),
        };
        tokio::spawn(job.run());
        Ok(())
    }

    async fn run_installer(&self, installer_path: &str) -> Result<()> {
        Command::new(installer_path)
            .spawn()
            .with_context(|| format!("Failed to start installer {}", installer_path))?;
        logger::log_info(&format!("Installer started: {}", installer_path), Some("backend"));
        Ok(())
    }

    async fn launch_installed_app(&self) -> Result<()> {
        let exe = self
            .paths
            .installed_executable
            .as_ref()
            .ok_or_else(|| anyhow!("Failed to get home directory"))?;

        if !exe.exists() {
            return Err(anyhow!("Hydra executable not found at: {}", exe.display()));
        }

        Command::new(exe)
            .spawn()
            .with_context(|| format!("Failed to launch {}", exe.display()))?;
        logger::log_info("Launcher started", Some("backend"));
        Ok(())
    }

    async fn exit_process(&self) {
        logger::log_info("Exiting bootstrapper", Some("backend"));
        self.host.exit(0);
    }

    async fn show_main_window(&self) -> Result<()> {
        self.host.show_main_window()
    }
}

#[cfg(target_os = "windows")]
async fn kill_launcher_process() -> Result<()> {
    let output = Command::new("taskkill")
        .args(["/F", "/IM", app_dirs::LAUNCHER_EXECUTABLE, "/T"])
        .output()
        .await
        .context("Failed to execute taskkill")?;

    // 128: no such process
    if output.status.success() || output.status.code() == Some(128) {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("not found") || stderr.contains("not running") {
        Ok(())
    } else {
        Err(anyhow!("Failed to stop the running launcher: {}", stderr.trim()))
    }
}

#[cfg(not(target_os = "windows"))]
async fn kill_launcher_process() -> Result<()> {
    crate::log_debug!("Process termination skipped on this platform", "backend");
    Ok(())
}

/// A single transfer, run on its own task, reporting through events
struct DownloadJob {
    client: reqwest::Client,
    url: String,
    file_path: PathBuf,
    install_mode: InstallMode,
    events: OrchestratorHandle,
}

impl DownloadJob {
    async fn run(self) {
        logger::log_info(
            &format!("Downloading {} -> {}", self.url, self.file_path.display()),
            Some("download"),
        );

        let total = match self.transfer().await {
            Ok(total) => total,
            Err(e) => {
                let message = format!("{:#}", e);
                logger::log_error(&message, Some("download"));
                self.events.emit(BackendEvent::DownloadError { message });
                return;
            }
        };

        let installer_path = self.file_path.to_string_lossy().to_string();
        self.events.emit(BackendEvent::DownloadComplete {
            installer_path: Some(installer_path.clone()),
            total_bytes: total,
        });

        if self.install_mode == InstallMode::Managed {
            match run_silent_installer(&installer_path).await {
                Ok(()) => {
                    logger::log_info("Installer finished", Some("download"));
                    self.events.emit(BackendEvent::InstallComplete);
                }
                Err(e) => {
                    let message = format!("{:#}", e);
                    logger::log_error(&message, Some("download"));
                    self.events.emit(BackendEvent::InstallError { message });
                }
            }
        }
    }

    /// Stream the body to disk. Returns the advertised content length.
    async fn transfer(&self) -> Result<Option<u64>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Failed to start download")?;

        if !response.status().is_success() {
            return Err(anyhow!("Download server returned status {}", response.status()));
        }

        let total_size = response.content_length();
        let mut stream = response.bytes_stream();
        let mut file = tokio::fs::File::create(&self.file_path)
            .await
            .with_context(|| format!("Failed to create file {}", self.file_path.display()))?;

        let start_time = Instant::now();
        let mut last_update = start_time;
        let mut downloaded: u64 = 0;

        while let Some(item) = stream.next().await {
            let chunk = item.context("Download error")?;
            file.write_all(&chunk).await.context("Write error")?;
            downloaded += chunk.len() as u64;

            let now = Instant::now();
            if now.duration_since(last_update) >= PROGRESS_INTERVAL {
                let elapsed = now.duration_since(start_time).as_secs_f64();
                self.events.emit(BackendEvent::DownloadProgress(progress_sample(
                    downloaded, total_size, elapsed,
                )));
                last_update = now;
            }
        }

        file.flush().await.context("Write error")?;
        drop(file);
        Ok(total_size)
    }
}

/// Progress figures for `downloaded` bytes after `elapsed` seconds.
///
/// Percentage is -1 while the total size is unknown.
fn progress_sample(downloaded: u64, total: Option<u64>, elapsed: f64) -> DownloadProgress {
    let speed = if elapsed > 0.0 {
        downloaded as f64 / elapsed
    } else {
        0.0
    };

    let percentage = match total {
        Some(total) if total > 0 => (downloaded as f64 / total as f64) * 100.0,
        _ => -1.0,
    };

    let eta = match total {
        Some(total) if speed > 0.0 && downloaded < total => Some((total - downloaded) as f64 / speed),
        _ => None,
    };

    DownloadProgress {
        downloaded_bytes: downloaded,
        total_bytes: total,
        percentage: Some(percentage),
        speed: Some(speed),
        eta,
    }
}

async fn run_silent_installer(installer_path: &str) -> Result<()> {
    let status = Command::new(installer_path)
        .args(SILENT_INSTALL_ARGS)
        .status()
        .await
        .context("Failed to start installer")?;

    if status.success() {
        Ok(())
    } else {
        Err(anyhow!("Installer exited with code: {:?}", status.code()))
    }
}
