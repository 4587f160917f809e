use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::logger;

const DEFAULT_RELEASE_API_URL: &str =
    "https://api.github.com/repos/hydralauncher/hydra/releases/latest";

/// Who runs the installer once the download has finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMode {
    /// The backend runs the installer and reports `install-complete`
    Managed,
    /// The front end runs the installer from the reported path, then exits
    Handoff,
}

impl InstallMode {
    fn parse(value: &str) -> Option<InstallMode> {
        match value.trim().to_lowercase().as_str() {
            "managed" => Some(InstallMode::Managed),
            "handoff" => Some(InstallMode::Handoff),
            _ => None,
        }
    }
}

/// Bootstrapper settings, fixed for the lifetime of the process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BootstrapConfig {
    pub install_mode: InstallMode,
    pub release_api_url: String,
    /// Suffix that identifies the installer among the release assets
    pub asset_suffix: String,
    /// Used when the release lookup fails
    pub fallback_download_url: Option<String>,
    pub launch_grace_millis: u64,
    pub http_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            install_mode: InstallMode::Managed,
            release_api_url: DEFAULT_RELEASE_API_URL.to_string(),
            asset_suffix: ".exe".to_string(),
            fallback_download_url: None,
            launch_grace_millis: 1000,
            http_timeout_secs: 10,
            user_agent: "Hydra Bootstrapper".to_string(),
        }
    }
}

impl BootstrapConfig {
    /// Defaults overridden by `BOOTSTRAP_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Invalid values are logged and ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("BOOTSTRAP_INSTALL_MODE") {
            match InstallMode::parse(&mode) {
                Some(mode) => self.install_mode = mode,
                None => logger::log_error(
                    &format!("Ignoring unknown install mode '{}'", mode),
                    Some("config"),
                ),
            }
        }
        if let Some(url) = lookup("BOOTSTRAP_RELEASE_API_URL").filter(|v| !v.trim().is_empty()) {
            self.release_api_url = url.trim().to_string();
        }
        if let Some(suffix) = lookup("BOOTSTRAP_ASSET_SUFFIX").filter(|v| !v.trim().is_empty()) {
            self.asset_suffix = suffix.trim().to_string();
        }
        if let Some(url) = lookup("BOOTSTRAP_FALLBACK_URL").filter(|v| !v.trim().is_empty()) {
            self.fallback_download_url = Some(url.trim().to_string());
        }
        if let Some(raw) = lookup("BOOTSTRAP_LAUNCH_GRACE_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.launch_grace_millis = ms,
                Err(_) => logger::log_error(
                    &format!("Ignoring invalid launch grace '{}'", raw),
                    Some("config"),
                ),
            }
        }
        self
    }

    pub fn launch_grace(&self) -> Duration {
        Duration::from_millis(self.launch_grace_millis)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BootstrapConfig::default();
        assert_eq!(config.install_mode, InstallMode::Managed);
        assert_eq!(config.asset_suffix, ".exe");
        assert!(config.fallback_download_url.is_none());
        assert_eq!(config.launch_grace(), Duration::from_secs(1));
    }

    #[test]
    fn test_overrides() {
        let config = BootstrapConfig::default().with_overrides(lookup_from(&[
            ("BOOTSTRAP_INSTALL_MODE", "Handoff"),
            ("BOOTSTRAP_FALLBACK_URL", " https://cdn.example.com/setup.exe "),
            ("BOOTSTRAP_LAUNCH_GRACE_MS", "250"),
            ("BOOTSTRAP_ASSET_SUFFIX", "-setup.exe"),
        ]));
        assert_eq!(config.install_mode, InstallMode::Handoff);
        assert_eq!(
            config.fallback_download_url.as_deref(),
            Some("https://cdn.example.com/setup.exe")
        );
        assert_eq!(config.launch_grace_millis, 250);
        assert_eq!(config.asset_suffix, "-setup.exe");
    }

    #[test]
    fn test_invalid_overrides_are_ignored() {
        let config = BootstrapConfig::default().with_overrides(lookup_from(&[
            ("BOOTSTRAP_INSTALL_MODE", "sideways"),
            ("BOOTSTRAP_LAUNCH_GRACE_MS", "soon"),
            ("BOOTSTRAP_RELEASE_API_URL", "   "),
        ]));
        assert_eq!(config.install_mode, InstallMode::Managed);
        assert_eq!(config.launch_grace_millis, 1000);
        assert_eq!(config.release_api_url, DEFAULT_RELEASE_API_URL);
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: BootstrapConfig =
            serde_json::from_str(r#"{ "installMode": "handoff", "launchGraceMillis": 0 }"#).unwrap();
        assert_eq!(config.install_mode, InstallMode::Handoff);
        assert_eq!(config.launch_grace(), Duration::ZERO);
        assert_eq!(config.http_timeout_secs, 10);
    }
}
