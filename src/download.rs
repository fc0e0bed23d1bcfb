//! PDF downloader.
//!
//! Existing files are never overwritten, and only bodies that are actually
//! PDFs reach the disk.

use crate::cookies::{cookie_header_for, Cookie};
use crate::error::{HarvestError, Result};
use crate::resolve::BROWSER_USER_AGENT;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// What happened to a download request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// File written, with its size in bytes
    Saved(u64),
    /// Target already existed; nothing was fetched
    Skipped,
    /// Server answered with something other than a PDF
    NotPdf { content_type: String },
}

/// Sequential PDF downloader
pub struct Downloader {
    client: reqwest::Client,
    cookies: Vec<Cookie>,
}

impl Downloader {
    pub fn new(cookies: Vec<Cookie>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(Duration::from_secs(60))
            .cookie_store(true)
            .build()
            .map_err(|e| HarvestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, cookies })
    }

    /// Download `url` to `path` unless `path` already exists.
    pub async fn download(&self, url: &str, path: &Path) -> Result<DownloadOutcome> {
        if path.exists() {
            debug!(path = ?path, "Already downloaded");
            return Ok(DownloadOutcome::Skipped);
        }

        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/pdf,*/*;q=0.8");

        let cookie_header = cookie_header_for(&self.cookies, url);
        if !cookie_header.is_empty() {
            request = request.header("Cookie", cookie_header);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::from_status("Download", status));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let body = response.bytes().await?;
        if !is_pdf_payload(&content_type, &body) {
            return Ok(DownloadOutcome::NotPdf { content_type });
        }

        write_atomically(path, &body)?;
        info!(path = ?path, bytes = body.len(), "Saved PDF");
        Ok(DownloadOutcome::Saved(body.len() as u64))
    }
}

/// A PDF either says so in its content type or starts with the `%PDF-` magic.
pub fn is_pdf_payload(content_type: &str, body: &[u8]) -> bool {
    if body.is_empty() {
        return false;
    }
    content_type.to_lowercase().contains("pdf") || body.starts_with(b"%PDF-")
}

/// Write to `<path>.part`, then rename into place.
fn write_atomically(path: &Path, body: &[u8]) -> Result<()> {
    let mut part = PathBuf::from(path);
    part.as_mut_os_string().push(".part");

    let written = std::fs::write(&part, body).and_then(|()| std::fs::rename(&part, path));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&part);
        return Err(e.into());
    }
    Ok(())
}
