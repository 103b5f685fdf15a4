//! RemoteStore implementation over the Yandex Disk resources API.
//!
//! The API offers no atomic update: objects are created through a
//! resolved upload link and replaced by delete-then-upload, which is why
//! the engine models overwrite as a composite action.
//!
//! Every request carries a bounded timeout so a hung request cannot stall
//! a tick indefinitely.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use mirror_core::store::{RemoteStore, Result, StoreError, UploadTarget};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;

pub const DEFAULT_API_URL: &str = "https://cloud-api.yandex.net/v1/disk/resources";

/// The API reports `modified` in the account's local clock; adding this
/// fixed offset yields a UTC value comparable with local mtimes.
pub const DEFAULT_CLOCK_OFFSET_HOURS: i64 = 3;

const REQUEST_TIMEOUT_SECS: u64 = 15;
const LIST_LIMIT: u32 = 10_000;

#[derive(Debug, Deserialize)]
struct ResourceMeta {
    modified: Option<String>,
    #[serde(rename = "_embedded")]
    embedded: Option<Embedded>,
}

#[derive(Debug, Deserialize)]
struct Embedded {
    items: Vec<ResourceItem>,
}

#[derive(Debug, Deserialize)]
struct ResourceItem {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct UploadLink {
    href: Option<String>,
}

/// RemoteStore implementation for the daemon.
pub struct DiskClient {
    http: reqwest::Client,
    base_url: String,
    folder: String,
    clock_offset: Duration,
}

impl DiskClient {
    pub fn new(token: &str, folder: &str) -> anyhow::Result<Self> {
        Self::with_api_url(token, folder, DEFAULT_API_URL)
    }

    pub fn with_api_url(token: &str, folder: &str, api_url: &str) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("OAuth {token}"))
            .context("auth token is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: api_url.trim_end_matches('/').to_string(),
            folder: folder.to_string(),
            clock_offset: Duration::hours(DEFAULT_CLOCK_OFFSET_HOURS),
        })
    }

    fn remote_path(&self, name: &str) -> String {
        format!("{}/{}", self.folder, name)
    }

    fn transport(e: reqwest::Error) -> StoreError {
        StoreError::Transport(e.to_string())
    }

    fn unexpected_status(what: &str, status: StatusCode) -> StoreError {
        StoreError::Transport(format!("{what} returned {status}"))
    }

    /// Normalize the API's `modified` string to UTC at second resolution.
    fn normalize_modified(&self, raw: &str) -> Result<DateTime<Utc>> {
        // "2024-05-01T10:20:30+00:00" - the offset suffix is ignored, the
        // fixed correction is applied instead.
        let naive = raw
            .get(..19)
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok())
            .ok_or_else(|| StoreError::Transport(format!("unparseable modified time: {raw}")))?;
        Ok((naive + self.clock_offset).and_utc())
    }

    async fn fetch_meta(&self, path: &str) -> Result<ResourceMeta> {
        let limit = LIST_LIMIT.to_string();
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("path", path), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(Self::transport)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(path.to_string())),
            status if status.is_success() => response.json().await.map_err(Self::transport),
            status => Err(Self::unexpected_status("metadata fetch", status)),
        }
    }
}

#[async_trait]
impl RemoteStore for DiskClient {
    async fn list_files(&self) -> Result<Vec<String>> {
        let meta = self.fetch_meta(&self.folder).await?;
        let items = meta.embedded.map(|e| e.items).unwrap_or_default();
        Ok(items
            .into_iter()
            .filter(|item| item.kind == "file")
            .map(|item| item.name)
            .collect())
    }

    async fn resolve_upload_target(&self, name: &str) -> Result<Option<UploadTarget>> {
        let response = self
            .http
            .get(format!("{}/upload", self.base_url))
            .query(&[
                ("path", self.remote_path(name).as_str()),
                ("overwrite", "false"),
            ])
            .send()
            .await
            .map_err(Self::transport)?;

        match response.status() {
            // The object already exists.
            StatusCode::CONFLICT => Ok(None),
            status if status.is_success() => {
                let link: UploadLink = response.json().await.map_err(Self::transport)?;
                // A success response without a link is treated the same
                // as an existing object.
                Ok(link.href.map(UploadTarget))
            }
            status => Err(Self::unexpected_status("upload link request", status)),
        }
    }

    async fn upload(&self, target: &UploadTarget, bytes: Vec<u8>) -> Result<()> {
        let response = self
            .http
            .put(&target.0)
            .body(bytes)
            .send()
            .await
            .map_err(Self::transport)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::unexpected_status("upload", response.status()))
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let response = self
            .http
            .delete(&self.base_url)
            .query(&[
                ("path", self.remote_path(name).as_str()),
                ("permanently", "true"),
            ])
            .send()
            .await
            .map_err(Self::transport)?;

        match response.status() {
            // Already absent: delete is idempotent.
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(Self::unexpected_status("delete", status)),
        }
    }

    async fn modified_time(&self, name: &str) -> Result<DateTime<Utc>> {
        let path = self.remote_path(name);
        let meta = self.fetch_meta(&path).await?;
        let raw = meta
            .modified
            .ok_or_else(|| StoreError::Transport(format!("no modified time for {path}")))?;
        self.normalize_modified(&raw)
    }

    async fn ensure_folder(&self) -> Result<()> {
        match self.fetch_meta(&self.folder).await {
            Ok(_) => return Ok(()),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let response = self
            .http
            .put(&self.base_url)
            .query(&[("path", self.folder.as_str())])
            .send()
            .await
            .map_err(Self::transport)?;

        match response.status() {
            // Created concurrently is fine.
            StatusCode::CONFLICT => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(Self::unexpected_status("folder create", status)),
        }
    }
}
