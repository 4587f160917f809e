use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failures of a bootstrap attempt.
///
/// Every variant but `Backend` is terminal for the current attempt; a new
/// `Start` command is the only way forward. `LaunchFailed` is raised after the
/// installation succeeded, so its message says so. `Backend` covers best-effort
/// commands (showing the window) that are logged and never reach `Error`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("Failed to remove the previous installation: {0}")]
    PurgeFailed(String),
    #[error("Version lookup failed: {0}")]
    MetadataFetchFailed(String),
    #[error("Version lookup failed: no installer asset matching '{0}' in the latest release")]
    AssetNotFound(String),
    #[error("{0}")]
    DownloadFailed(String),
    #[error("{0}")]
    InstallFailed(String),
    #[error("Installation completed, but the application could not be launched: {0}")]
    LaunchFailed(String),
    #[error("Backend command failed: {0}")]
    Backend(String),
}

/// Structured error codes for API responses
/// These allow the frontend to distinguish between different error types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorCode {
    /// Previous installation could not be removed
    PurgeFailed,
    /// Release metadata service unreachable or returned garbage
    NetworkError,
    /// Release has no installer asset
    NotFound,
    /// Download stream or file write failed
    DownloadFailed,
    /// Installer could not run or exited non-zero
    InstallFailed,
    /// Installed application could not be started
    LaunchFailed,
    /// Permission denied (file access, admin rights, etc.)
    PermissionDenied,
    /// Operation timeout
    Timeout,
    /// Command rejected in the current phase
    InvalidState,
    /// Internal error (unexpected condition)
    Internal,
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorCode::PurgeFailed => write!(f, "purge_failed"),
            ApiErrorCode::NetworkError => write!(f, "network_error"),
            ApiErrorCode::NotFound => write!(f, "not_found"),
            ApiErrorCode::DownloadFailed => write!(f, "download_failed"),
            ApiErrorCode::InstallFailed => write!(f, "install_failed"),
            ApiErrorCode::LaunchFailed => write!(f, "launch_failed"),
            ApiErrorCode::PermissionDenied => write!(f, "permission_denied"),
            ApiErrorCode::Timeout => write!(f, "timeout"),
            ApiErrorCode::InvalidState => write!(f, "invalid_state"),
            ApiErrorCode::Internal => write!(f, "internal"),
        }
    }
}

/// Structured API error with code, message, and optional details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling
    pub code: ApiErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (URL, path, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        code: ApiErrorCode,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details: Some(details.into()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::Internal, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

impl From<BootstrapError> for ApiError {
    fn from(err: BootstrapError) -> Self {
        let code = match err {
            BootstrapError::PurgeFailed(_) => ApiErrorCode::PurgeFailed,
            BootstrapError::MetadataFetchFailed(_) => ApiErrorCode::NetworkError,
            BootstrapError::AssetNotFound(_) => ApiErrorCode::NotFound,
            BootstrapError::DownloadFailed(_) => ApiErrorCode::DownloadFailed,
            BootstrapError::InstallFailed(_) => ApiErrorCode::InstallFailed,
            BootstrapError::LaunchFailed(_) => ApiErrorCode::LaunchFailed,
            BootstrapError::Backend(_) => ApiErrorCode::Internal,
        };
        ApiError::new(code, err.to_string())
    }
}

fn io_error_code(kind: std::io::ErrorKind) -> ApiErrorCode {
    match kind {
        std::io::ErrorKind::NotFound => ApiErrorCode::NotFound,
        std::io::ErrorKind::PermissionDenied => ApiErrorCode::PermissionDenied,
        std::io::ErrorKind::TimedOut => ApiErrorCode::Timeout,
        _ => ApiErrorCode::Internal,
    }
}

/// Convert from std::io::Error to ApiError
impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::new(io_error_code(err.kind()), err.to_string())
    }
}

/// Convert from anyhow::Error to ApiError
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(bootstrap) = err.downcast_ref::<BootstrapError>() {
            return bootstrap.clone().into();
        }
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return ApiError::new(io_error_code(io.kind()), err.to_string());
        }
        ApiError::internal(err.to_string())
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Extension trait to convert ApiResult<T> to Result<T, String> for Tauri commands
pub trait ToTauriError<T> {
    /// Convert to Tauri-compatible Result with string error
    fn to_tauri_error(self) -> std::result::Result<T, String>;
}

impl<T> ToTauriError<T> for ApiResult<T> {
    fn to_tauri_error(self) -> std::result::Result<T, String> {
        self.map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_failure_mentions_success() {
        let err = BootstrapError::LaunchFailed("file missing".to_string());
        let text = err.to_string();
        assert!(text.contains("Installation completed"));
        assert!(text.contains("file missing"));
    }

    #[test]
    fn test_download_failure_is_verbatim() {
        let err = BootstrapError::DownloadFailed("disk full".to_string());
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn test_asset_not_found_distinct_code() {
        let not_found: ApiError = BootstrapError::AssetNotFound(".exe".into()).into();
        let network: ApiError = BootstrapError::MetadataFetchFailed("offline".into()).into();
        assert_eq!(not_found.code, ApiErrorCode::NotFound);
        assert_eq!(network.code, ApiErrorCode::NetworkError);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let api_err: ApiError = io_err.into();
        assert_eq!(api_err.code, ApiErrorCode::PermissionDenied);
    }

    #[test]
    fn test_backend_failure_is_internal() {
        let api_err: ApiError = BootstrapError::Backend("show main window: gone".into()).into();
        assert_eq!(api_err.code, ApiErrorCode::Internal);
        assert!(api_err.message.starts_with("Backend command failed"));
    }

    #[test]
    fn test_anyhow_io_keeps_permission_code() {
        let err = anyhow::Error::new(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"))
            .context("Failed to create file");
        let api_err: ApiError = err.into();
        assert_eq!(api_err.code, ApiErrorCode::PermissionDenied);
    }

    #[test]
    fn test_anyhow_keeps_bootstrap_code() {
        let err = anyhow::Error::new(BootstrapError::PurgeFailed("locked".into()));
        let api_err: ApiError = err.into();
        assert_eq!(api_err.code, ApiErrorCode::PurgeFailed);
    }

    #[test]
    fn test_serialization() {
        let err = ApiError::new(ApiErrorCode::InvalidState, "busy");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("invalid_state"));
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_to_tauri_error() {
        let err_result: ApiResult<i32> = Err(ApiError::with_details(
            ApiErrorCode::Timeout,
            "slow",
            "https://example.com",
        ));
        let tauri_err = err_result.to_tauri_error().unwrap_err();
        assert!(tauri_err.contains("timeout"));
        assert!(tauri_err.contains("(https://example.com)"));
    }
}
