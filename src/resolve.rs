//! Open-access fallbacks for records without a direct PDF link.
//!
//! Two strategies, tried in order:
//! 1. Unpaywall lookup by DOI (needs a contact email).
//! 2. The `citation_pdf_url` meta tag on the record's landing page.

use crate::cookies::{cookie_header_for, Cookie};
use crate::error::{HarvestError, Result};
use crate::record::LiteratureRecord;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::cmp::Ordering;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Unpaywall API base URL
pub const UNPAYWALL_API_URL: &str = "https://api.unpaywall.org/v2";

/// Browser-like user agent for landing pages
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize)]
struct UnpaywallResponse {
    #[serde(default)]
    oa_locations: Vec<OaLocation>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    url_for_pdf: Option<String>,
    #[serde(default)]
    version: Option<Version>,
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
enum Version {
    #[serde(rename = "submittedVersion")]
    Submitted,
    #[serde(rename = "acceptedVersion")]
    Accepted,
    #[serde(rename = "publishedVersion")]
    Published,
}

impl Version {
    fn rank(self) -> u8 {
        match self {
            Version::Submitted => 0,
            Version::Accepted => 1,
            Version::Published => 2,
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Finds fallback PDF URLs
pub struct OaResolver {
    client: reqwest::Client,
    unpaywall_url: String,
    email: Option<String>,
    resolve_landing: bool,
    cookies: Vec<Cookie>,
}

impl OaResolver {
    pub fn new(email: Option<String>, resolve_landing: bool, cookies: Vec<Cookie>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HarvestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            unpaywall_url: UNPAYWALL_API_URL.to_string(),
            email,
            resolve_landing,
            cookies,
        })
    }

    /// Point Unpaywall lookups at a different endpoint (tests).
    pub fn with_unpaywall_url(mut self, url: impl Into<String>) -> Self {
        self.unpaywall_url = url.into();
        self
    }

    /// Whether any strategy is enabled at all.
    pub fn is_enabled(&self) -> bool {
        self.email.is_some() || self.resolve_landing
    }

    /// Try every enabled strategy; `None` if none produced a URL.
    pub async fn resolve(&self, record: &LiteratureRecord) -> Option<String> {
        if let (Some(email), Some(doi)) = (&self.email, &record.doi) {
            match self.unpaywall(doi, email).await {
                Ok(Some(url)) => return Some(url),
                Ok(None) => debug!(doi = %doi, "No open access PDF on Unpaywall"),
                Err(e) => warn!(doi = %doi, error = %e, "Unpaywall lookup failed"),
            }
        }

        if self.resolve_landing && !record.url.is_empty() {
            match self.landing_page_pdf(&record.url).await {
                Ok(Some(url)) => return Some(url),
                Ok(None) => debug!(url = %record.url, "No citation_pdf_url on landing page"),
                Err(e) => warn!(url = %record.url, error = %e, "Landing page fetch failed"),
            }
        }

        None
    }

    async fn unpaywall(&self, doi: &str, email: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(unpaywall_url(&self.unpaywall_url, doi)?)
            .header("Accept", "application/json; charset=utf-8")
            .query(&[("email", email)])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(HarvestError::from_status("Unpaywall", response.status()));
        }

        let data: UnpaywallResponse = response.json().await?;
        Ok(best_pdf_url(data))
    }

    async fn landing_page_pdf(&self, url: &str) -> Result<Option<String>> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8");

        let cookie_header = cookie_header_for(&self.cookies, url);
        if !cookie_header.is_empty() {
            request = request.header("Cookie", cookie_header);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(HarvestError::from_status("Landing page", response.status()));
        }

        // Redirects (doi.org -> publisher) change the base for relative links.
        let final_url = response.url().clone();
        let html = response.text().await?;
        citation_pdf_url(&html, &final_url)
    }
}

/// `<base>/<doi>`, with each part of the DOI percent-encoded as a path segment.
fn unpaywall_url(base: &str, doi: &str) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| HarvestError::Config(format!("Invalid Unpaywall URL {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|()| HarvestError::Config(format!("Invalid Unpaywall URL {}", base)))?
        .pop_if_empty()
        .extend(doi.trim().split('/'));
    Ok(url)
}

/// Best OA location with a PDF: published > accepted > submitted.
fn best_pdf_url(data: UnpaywallResponse) -> Option<String> {
    data.oa_locations
        .into_iter()
        .filter(|loc| loc.url_for_pdf.is_some())
        .max_by_key(|loc| loc.version)
        .and_then(|loc| loc.url_for_pdf)
}

/// Read `<meta name="citation_pdf_url">` and resolve it against `base`.
fn citation_pdf_url(html: &str, base: &Url) -> Result<Option<String>> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"meta[name="citation_pdf_url"]"#)
        .map_err(|e| HarvestError::Parse(e.to_string()))?;

    let content = document
        .select(&selector)
        .filter_map(|meta| meta.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty());

    Ok(content.and_then(|c| base.join(c).ok()).map(|u| u.to_string()))
}
