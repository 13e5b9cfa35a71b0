//! Release registry client.
//!
//! Queries the GitHub-compatible releases API and maps the newest entry into
//! a [`Release`]. The registry returns releases newest-first, so the first
//! element is taken as latest without sorting. No retries happen here; the
//! caller decides when to ask again.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::error::UpdateError;

/// Default registry API host.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A release as advertised by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    /// Version tag, e.g. `v1.2.0`.
    pub version: String,
    /// Human-readable release title.
    pub name: String,
    /// Publication time; `None` for unpublished drafts.
    pub published_at: Option<DateTime<Utc>>,
    /// Location of the zip archive carrying the new tree.
    pub download_url: String,
    /// Raw asset descriptors, passed through untouched.
    pub assets: Vec<serde_json::Value>,
}

/// Wire shape of one element of `/repos/{owner}/{repo}/releases`.
#[derive(Debug, Deserialize)]
struct RegistryRelease {
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    zipball_url: Option<String>,
    #[serde(default)]
    assets: Vec<serde_json::Value>,
}

impl RegistryRelease {
    fn into_release(self) -> Result<Release, UpdateError> {
        let download_url = self
            .zipball_url
            .filter(|url| !url.is_empty())
            .or_else(|| zip_asset_url(&self.assets))
            .ok_or_else(|| {
                UpdateError::MalformedResponse(format!(
                    "release {} has no archive url",
                    self.tag_name
                ))
            })?;

        Ok(Release {
            name: self
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| self.tag_name.clone()),
            version: self.tag_name,
            published_at: self.published_at,
            download_url,
            assets: self.assets,
        })
    }
}

/// First asset whose download URL points at a zip archive.
fn zip_asset_url(assets: &[serde_json::Value]) -> Option<String> {
    assets
        .iter()
        .filter_map(|a| a["browser_download_url"].as_str())
        .find(|url| url.ends_with(".zip"))
        .map(str::to_owned)
}

/// Parse a registry response body into the latest release.
///
/// # Errors
///
/// [`UpdateError::MalformedResponse`] when the body is not a JSON array of
/// release objects, [`UpdateError::EmptyReleaseList`] when the array is empty.
pub fn parse_latest(body: &str) -> Result<Release, UpdateError> {
    let releases: Vec<RegistryRelease> = serde_json::from_str(body)
        .map_err(|e| UpdateError::MalformedResponse(format!("cannot parse releases: {e}")))?;

    releases
        .into_iter()
        .next()
        .ok_or(UpdateError::EmptyReleaseList)?
        .into_release()
}

/// HTTP client for a release registry.
#[derive(Debug, Clone)]
pub struct ReleaseClient {
    http: reqwest::Client,
    api_base: String,
}

impl ReleaseClient {
    /// Client for the public GitHub API.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Network`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, UpdateError> {
        Self::with_api_base(DEFAULT_API_BASE)
    }

    /// Client for a registry at `api_base` (scheme and host, no trailing path).
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Network`] if the HTTP client cannot be built.
    pub fn with_api_base(api_base: impl Into<String>) -> Result<Self, UpdateError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("zio-booster/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| UpdateError::Network(format!("cannot create HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_owned(),
        })
    }

    /// Registry base URL this client talks to.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Releases endpoint for `owner/repo`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::InvalidRepository`] for malformed slugs.
    pub fn releases_url(&self, owner_repo: &str) -> Result<String, UpdateError> {
        let valid = owner_repo
            .split_once('/')
            .is_some_and(|(owner, repo)| {
                !owner.is_empty() && !repo.is_empty() && !repo.contains('/')
            });
        if !valid {
            return Err(UpdateError::InvalidRepository(owner_repo.to_owned()));
        }
        Ok(format!("{}/repos/{owner_repo}/releases", self.api_base))
    }

    /// Fetch the newest release of `owner_repo`.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::Network`] on transport failure or non-2xx status
    /// - [`UpdateError::MalformedResponse`] when the body has the wrong shape
    /// - [`UpdateError::EmptyReleaseList`] when nothing is published
    pub async fn latest_release(&self, owner_repo: &str) -> Result<Release, UpdateError> {
        let url = self.releases_url(owner_repo)?;
        debug!("fetching releases from {url}");

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| UpdateError::Network(format!("cannot reach {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Network(format!(
                "registry returned {status} for {url}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpdateError::Network(format!("cannot read registry response: {e}")))?;

        let release = parse_latest(&body)?;
        debug!(
            version = %release.version,
            url = %release.download_url,
            "latest release resolved"
        );
        Ok(release)
    }
}
