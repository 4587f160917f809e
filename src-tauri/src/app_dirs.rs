//! Centralized path management
//!
//! Covers the bootstrapper's own data (logs) and the locations owned by the
//! Hydra launcher that the native backend inspects, purges or launches.

use std::path::{Path, PathBuf};

/// App identifier matching tauri.conf.json
pub const APP_IDENTIFIER: &str = "gg.hydralauncher.bootstrapper";

/// Roaming data folder name of the installed launcher
const LAUNCHER_DATA_DIR: &str = "hydralauncher";

/// Executable name of the installed launcher
pub const LAUNCHER_EXECUTABLE: &str = "Hydra.exe";

/// File name used when a download URL has no usable last segment
const FALLBACK_INSTALLER_NAME: &str = "installer.exe";

/// Get the app data directory for the bootstrapper's own files
///
/// - Windows: %LOCALAPPDATA%\gg.hydralauncher.bootstrapper
/// - macOS: ~/Library/Application Support/gg.hydralauncher.bootstrapper
/// - Linux: $XDG_DATA_HOME or ~/.local/share
pub fn get_app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_IDENTIFIER)
}

/// Get the logs directory
pub fn get_logs_dir() -> PathBuf {
    get_app_data_dir().join("logs")
}

/// Get the log file path
pub fn get_log_file_path() -> PathBuf {
    get_logs_dir().join("bootstrapper.log")
}

/// Data directory of a previous launcher installation (%APPDATA%\hydralauncher)
pub fn previous_installation_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| previous_installation_dir_in(&home))
}

fn previous_installation_dir_in(home: &Path) -> PathBuf {
    home.join("AppData").join("Roaming").join(LAUNCHER_DATA_DIR)
}

/// Installed launcher executable (%LOCALAPPDATA%\Programs\Hydra\Hydra.exe)
pub fn installed_executable_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| installed_executable_path_in(&home))
}

fn installed_executable_path_in(home: &Path) -> PathBuf {
    home.join("AppData")
        .join("Local")
        .join("Programs")
        .join("Hydra")
        .join(LAUNCHER_EXECUTABLE)
}

/// Directory installers are downloaded into
pub fn download_dir() -> Option<PathBuf> {
    dirs::download_dir()
}

/// Derive the installer file name from the last path segment of its URL.
///
/// Query strings and fragments are stripped. A URL without a path after the
/// authority gets the fallback name.
pub fn installer_file_name(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or("");
    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => without_query,
    };
    let name = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    if name.is_empty() || name.contains(':') {
        FALLBACK_INSTALLER_NAME.to_string()
    } else {
        name.to_string()
    }
}
