use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::BootstrapConfig;
use crate::error::BootstrapError;
use crate::logger;

/// Latest release as far as the bootstrapper cares
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseMetadata {
    pub version_tag: String,
    pub download_url: String,
}

impl ReleaseMetadata {
    /// Semantic version of the tag, with any leading 'v' removed
    pub fn version(&self) -> Option<semver::Version> {
        semver::Version::parse(self.version_tag.trim_start_matches('v')).ok()
    }
}

/// Remote release API response structure
#[derive(Debug, Deserialize)]
struct RemoteRelease {
    tag_name: String,
    #[serde(default)]
    assets: Vec<RemoteAsset>,
}

#[derive(Debug, Deserialize)]
struct RemoteAsset {
    name: String,
    browser_download_url: String,
}

/// Anything that can answer "what is the latest installer?"
///
/// No retry or caching happens behind this trait; callers own that policy.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn fetch(&self) -> Result<ReleaseMetadata, BootstrapError>;
}

/// Pick the installer asset by file-name suffix (case-insensitive)
fn select_installer(release: RemoteRelease, suffix: &str) -> Result<ReleaseMetadata, BootstrapError> {
    let suffix_lower = suffix.to_lowercase();
    let asset = release
        .assets
        .into_iter()
        .find(|asset| asset.name.to_lowercase().ends_with(&suffix_lower))
        .ok_or_else(|| BootstrapError::AssetNotFound(suffix.to_string()))?;

    Ok(ReleaseMetadata {
        version_tag: release.tag_name,
        download_url: asset.browser_download_url,
    })
}

/// Release lookup over HTTP (GitHub "latest release" document shape)
pub struct HttpReleaseClient {
    client: reqwest::Client,
    api_url: String,
    asset_suffix: String,
}

impl HttpReleaseClient {
    pub fn new(config: &BootstrapConfig) -> Result<Self, BootstrapError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| {
                BootstrapError::MetadataFetchFailed(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_url: config.release_api_url.clone(),
            asset_suffix: config.asset_suffix.clone(),
        })
    }

    async fn fetch_release(&self) -> Result<RemoteRelease, BootstrapError> {
        crate::log_debug!(&format!("Fetching release metadata from {}", self.api_url), "release");

        let response = self
            .client
            .get(&self.api_url)
            .send()
            .await
            .map_err(|e| {
                BootstrapError::MetadataFetchFailed(format!("Failed to fetch release metadata: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BootstrapError::MetadataFetchFailed(format!(
                "Release API returned status: {} ({})",
                status, error_text
            )));
        }

        response.json::<RemoteRelease>().await.map_err(|e| {
            BootstrapError::MetadataFetchFailed(format!("Failed to parse release metadata: {}", e))
        })
    }
}

#[async_trait]
impl ReleaseSource for HttpReleaseClient {
    async fn fetch(&self) -> Result<ReleaseMetadata, BootstrapError> {
        let release = self.fetch_release().await?;
        let tag = release.tag_name.clone();

        match select_installer(release, &self.asset_suffix) {
            Ok(metadata) => {
                logger::log_info(
                    &format!("Latest release {} -> {}", metadata.version_tag, metadata.download_url),
                    Some("release"),
                );
                Ok(metadata)
            }
            Err(e) => {
                logger::log_error(
                    &format!("Release {} has no asset ending in '{}'", tag, self.asset_suffix),
                    Some("release"),
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const RELEASE_JSON: &str = r#"{
        "tag_name": "v3.4.1",
        "name": "Hydra 3.4.1",
        "assets": [
            { "name": "hydralauncher-3.4.1.AppImage", "browser_download_url": "https://dl.example.com/hydralauncher-3.4.1.AppImage" },
            { "name": "hydralauncher-3.4.1-setup.EXE", "browser_download_url": "https://dl.example.com/hydralauncher-3.4.1-setup.exe" },
            { "name": "latest.yml", "browser_download_url": "https://dl.example.com/latest.yml" }
        ]
    }"#;

    /// One-shot HTTP server answering every connection with `status` and `body`
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/releases/latest", addr)
    }

    fn client_for(url: String, suffix: &str) -> HttpReleaseClient {
        let config = BootstrapConfig {
            release_api_url: url,
            asset_suffix: suffix.to_string(),
            ..BootstrapConfig::default()
        };
        HttpReleaseClient::new(&config).unwrap()
    }

    #[test]
    fn test_select_installer_by_suffix() {
        let release: RemoteRelease = serde_json::from_str(RELEASE_JSON).unwrap();
        let metadata = select_installer(release, ".exe").unwrap();
        assert_eq!(metadata.version_tag, "v3.4.1");
        assert_eq!(
            metadata.download_url,
            "https://dl.example.com/hydralauncher-3.4.1-setup.exe"
        );
        assert_eq!(metadata.version(), Some(semver::Version::new(3, 4, 1)));
    }

    #[test]
    fn test_select_installer_missing_asset() {
        let release: RemoteRelease = serde_json::from_str(RELEASE_JSON).unwrap();
        let err = select_installer(release, ".msi").unwrap_err();
        assert_eq!(err, BootstrapError::AssetNotFound(".msi".to_string()));
    }

    #[test]
    fn test_release_without_assets_field() {
        let release: RemoteRelease = serde_json::from_str(r#"{ "tag_name": "v1.0.0" }"#).unwrap();
        assert!(matches!(
            select_installer(release, ".exe"),
            Err(BootstrapError::AssetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_over_http() {
        let url = serve_once("200 OK", RELEASE_JSON).await;
        let metadata = client_for(url, ".exe").fetch().await.unwrap();
        assert_eq!(metadata.version_tag, "v3.4.1");
    }

    #[tokio::test]
    async fn test_fetch_asset_not_found_is_distinct() {
        let url = serve_once("200 OK", RELEASE_JSON).await;
        let err = client_for(url, ".dmg").fetch().await.unwrap_err();
        assert!(matches!(err, BootstrapError::AssetNotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_http_error_status() {
        let url = serve_once("503 Service Unavailable", "{}").await;
        let err = client_for(url, ".exe").fetch().await.unwrap_err();
        match err {
            BootstrapError::MetadataFetchFailed(message) => assert!(message.contains("503")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client_for(format!("http://{}/", addr), ".exe")
            .fetch()
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::MetadataFetchFailed(_)));
    }
}
