//! Attaching the built database to a published release.
//!
//! GitHub flow: resolve the release by tag, drop any asset already carrying the
//! target name (re-runs of the same release), then upload the file to the
//! release's upload URL.

use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::defaults::{HttpConfig, ReleaseConfig};
use crate::paths;
use crate::{Error, Result};

const GITHUB_ACCEPT: &str = "application/vnd.github+json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    pub fn parse(value: &str) -> Result<Self> {
        let pattern = Regex::new(r"^([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)$")
            .map_err(|e| Error::internal_unexpected(e.to_string()))?;

        let captures = pattern.captures(value.trim()).ok_or_else(|| {
            Error::validation_invalid_argument(
                "repo",
                format!("'{}' is not an owner/name repository slug", value),
                None,
                Some(vec!["octo-org/marketplace".to_string()]),
            )
        })?;

        Ok(Self {
            owner: captures[1].to_string(),
            name: captures[2].to_string(),
        })
    }
}

impl std::fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseTarget {
    pub repo: RepoSlug,
    pub tag: String,
    pub asset_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub repo: String,
    pub tag: String,
    pub asset_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    pub replaced_existing: bool,
}

/// Destination the pipeline's upload step publishes through.
pub trait AssetPublisher {
    fn publish(&self, target: &ReleaseTarget, content: Vec<u8>) -> Result<UploadResult>;
}

/// Read the database file and hand it to `publisher`.
pub fn upload(
    target: &ReleaseTarget,
    db_path: &Path,
    publisher: &dyn AssetPublisher,
) -> Result<UploadResult> {
    let display = paths::display(db_path);
    if !db_path.is_file() {
        return Err(Error::database_not_found(&display));
    }

    let content = fs::read(db_path)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("read {}", display))))?;
    log_status!(
        "upload",
        "Uploading {} ({} bytes) to {} release {}",
        target.asset_name,
        content.len(),
        target.repo,
        target.tag
    );

    publisher.publish(target, content)
}

#[derive(Deserialize)]
struct GitHubRelease {
    upload_url: String,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

#[derive(Deserialize)]
struct GitHubAsset {
    id: u64,
    name: String,
    #[serde(default)]
    browser_download_url: Option<String>,
}

pub struct GitHubPublisher {
    client: Client,
    api_base: String,
    token: String,
    content_type: String,
}

impl GitHubPublisher {
    /// Build a publisher; the token is read from the configured environment variable.
    pub fn new(http: &HttpConfig, release: &ReleaseConfig) -> Result<Self> {
        let token = std::env::var(&release.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::release_auth_missing(&release.token_env))?;

        Self::with_token(http, release, token)
    }

    pub fn with_token(
        http: &HttpConfig,
        release: &ReleaseConfig,
        token: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(http.user_agent.clone())
            .timeout(Duration::from_secs(release.upload_timeout_secs))
            .build()
            .map_err(|e| {
                Error::internal_io(e.to_string(), Some("create HTTP client".to_string()))
            })?;

        Ok(Self {
            client,
            api_base: release.api_base.trim_end_matches('/').to_string(),
            token: token.into(),
            content_type: release.content_type.clone(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, GITHUB_ACCEPT)
    }

    fn send(&self, target: &ReleaseTarget, request: RequestBuilder) -> Result<Response> {
        self.authorized(request).send().map_err(|e| {
            Error::release_upload_failed(
                target.repo.to_string(),
                &target.tag,
                None,
                Some(e.to_string()),
            )
        })
    }

    fn find_release(&self, target: &ReleaseTarget) -> Result<GitHubRelease> {
        let url = format!(
            "{}/repos/{}/{}/releases/tags/{}",
            self.api_base, target.repo.owner, target.repo.name, target.tag
        );
        let response = self.send(target, self.client.get(&url))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(Error::release_not_found(target.repo.to_string(), &target.tag));
        }
        if !status.is_success() {
            return Err(rejected(target, response));
        }

        response.json().map_err(|e| {
            Error::internal_json(e.to_string(), Some("parse GitHub release response".to_string()))
        })
    }

    fn delete_asset(&self, target: &ReleaseTarget, asset_id: u64) -> Result<()> {
        let url = format!(
            "{}/repos/{}/{}/releases/assets/{}",
            self.api_base, target.repo.owner, target.repo.name, asset_id
        );
        let response = self.send(target, self.client.delete(&url))?;

        if !response.status().is_success() {
            return Err(rejected(target, response));
        }
        Ok(())
    }
}

impl AssetPublisher for GitHubPublisher {
    fn publish(&self, target: &ReleaseTarget, content: Vec<u8>) -> Result<UploadResult> {
        let release = self.find_release(target)?;

        let existing = release
            .assets
            .iter()
            .find(|asset| asset.name == target.asset_name)
            .map(|asset| asset.id);
        if let Some(asset_id) = existing {
            log_status!("upload", "Replacing existing asset {}", target.asset_name);
            self.delete_asset(target, asset_id)?;
        }

        let size_bytes = content.len() as u64;
        let request = self
            .client
            .post(upload_endpoint(&release.upload_url))
            .query(&[("name", target.asset_name.as_str())])
            .header(CONTENT_TYPE, self.content_type.as_str())
            .body(content);
        let response = self.send(target, request)?;

        if !response.status().is_success() {
            return Err(rejected(target, response));
        }

        let asset: GitHubAsset = response.json().map_err(|e| {
            Error::internal_json(e.to_string(), Some("parse GitHub asset response".to_string()))
        })?;
        log_status!("upload", "Uploaded asset {} (id {})", asset.name, asset.id);

        Ok(UploadResult {
            repo: target.repo.to_string(),
            tag: target.tag.clone(),
            asset_name: asset.name,
            content_type: self.content_type.clone(),
            size_bytes,
            asset_id: Some(asset.id),
            download_url: asset.browser_download_url,
            replaced_existing: existing.is_some(),
        })
    }
}

fn rejected(target: &ReleaseTarget, response: Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().ok();
    Error::release_upload_failed(target.repo.to_string(), &target.tag, Some(status), body)
}

/// Release `upload_url` values carry an RFC 6570 suffix (`{?name,label}`); drop it.
fn upload_endpoint(template: &str) -> &str {
    match template.find('{') {
        Some(idx) => &template[..idx],
        None => template,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct RecordingPublisher {
        received: RefCell<Vec<usize>>,
    }

    impl AssetPublisher for RecordingPublisher {
        fn publish(&self, target: &ReleaseTarget, content: Vec<u8>) -> Result<UploadResult> {
            self.received.borrow_mut().push(content.len());
            Ok(UploadResult {
                repo: target.repo.to_string(),
                tag: target.tag.clone(),
                asset_name: target.asset_name.clone(),
                content_type: "application/vnd.sqlite3".to_string(),
                size_bytes: content.len() as u64,
                asset_id: None,
                download_url: None,
                replaced_existing: false,
            })
        }
    }

    fn target() -> ReleaseTarget {
        ReleaseTarget {
            repo: RepoSlug::parse("octo-org/marketplace").unwrap(),
            tag: "v1.0.0".to_string(),
            asset_name: "marketplace.db".to_string(),
        }
    }

    #[test]
    fn repo_slug_requires_owner_and_name() {
        let slug = RepoSlug::parse("octo-org/marketplace").unwrap();
        assert_eq!(slug.owner, "octo-org");
        assert_eq!(slug.to_string(), "octo-org/marketplace");

        assert!(RepoSlug::parse("marketplace").is_err());
        assert!(RepoSlug::parse("a/b/c").is_err());
        assert!(RepoSlug::parse("/b").is_err());
    }

    #[test]
    fn upload_endpoint_strips_uri_template() {
        assert_eq!(
            upload_endpoint("https://uploads.github.com/repos/o/r/releases/1/assets{?name,label}"),
            "https://uploads.github.com/repos/o/r/releases/1/assets"
        );
        assert_eq!(upload_endpoint("https://x/assets"), "https://x/assets");
    }

    #[test]
    fn upload_reads_file_and_delegates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("marketplace.db");
        fs::write(&path, b"sqlite bytes").unwrap();
        let publisher = RecordingPublisher {
            received: RefCell::new(Vec::new()),
        };

        let result = upload(&target(), &path, &publisher).unwrap();

        assert_eq!(result.size_bytes, 12);
        assert_eq!(*publisher.received.borrow(), vec![12]);
    }

    #[test]
    fn upload_rejects_missing_file() {
        let dir = TempDir::new().unwrap();
        let publisher = RecordingPublisher {
            received: RefCell::new(Vec::new()),
        };

        let err = upload(&target(), &dir.path().join("missing.db"), &publisher).unwrap_err();
        assert_eq!(err.code.as_str(), "database.not_found");
        assert!(publisher.received.borrow().is_empty());
    }

    #[test]
    fn publisher_requires_token_variable() {
        let defaults = crate::defaults::builtin_defaults();
        let mut release = defaults.release.clone();
        release.token_env = "MARKETPLACE_TEST_TOKEN_THAT_IS_NEVER_SET".to_string();

        let err = match GitHubPublisher::new(&defaults.http, &release) {
            Ok(_) => panic!("expected missing token error"),
            Err(err) => err,
        };
        assert_eq!(err.code.as_str(), "release.auth_missing");
    }
}
