//! Bibliographic sources and the query dispatcher.
//!
//! Every source implements [`Source`]; [`search_all`] queries them in order
//! and turns individual failures into empty result lists.

pub mod crossref;
pub mod pubmed;

use crate::error::{HarvestError, Result};
use crate::record::{LiteratureRecord, SourceKind};
use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use crossref::CrossrefSource;
pub use pubmed::PubmedSource;

/// Attempts per request when an API answers 429
const MAX_RETRIES: u32 = 3;

/// A searchable bibliographic source.
#[async_trait]
pub trait Source: Send + Sync {
    /// Which source this is, for logging and record provenance
    fn kind(&self) -> SourceKind;

    /// Search for `query`, returning at most `max_results` normalized records.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<LiteratureRecord>>;
}

/// Query one source, logging and swallowing any failure.
pub async fn search_or_empty(
    source: &dyn Source,
    query: &str,
    max_results: usize,
) -> Vec<LiteratureRecord> {
    match source.search(query, max_results).await {
        Ok(records) => {
            info!(source = %source.kind(), count = records.len(), "Source query complete");
            records
        }
        Err(e) => {
            warn!(source = %source.kind(), error = %e, "Source query failed, continuing without it");
            Vec::new()
        }
    }
}

/// Query every source in order and concatenate their records.
pub async fn search_all(
    sources: &[Box<dyn Source>],
    query: &str,
    max_results: usize,
) -> Vec<LiteratureRecord> {
    let mut all = Vec::new();
    for source in sources {
        all.extend(search_or_empty(source.as_ref(), query, max_results).await);
    }
    all
}

/// GET a JSON document, retrying with exponential backoff on 429.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    params: &[(&str, String)],
    service: &str,
) -> Result<T> {
    let mut retries = 0;

    loop {
        debug!(url = url, service = service, "GET");
        let response = client.get(url).query(params).send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            return serde_json::from_str(&body).map_err(|e| {
                HarvestError::Parse(format!("Failed to parse {} response: {}", service, e))
            });
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if retries < MAX_RETRIES {
                let backoff = Duration::from_secs(2u64.pow(retries));
                warn!(
                    service = service,
                    retries = retries,
                    backoff_secs = backoff.as_secs(),
                    "Rate limited, backing off"
                );
                tokio::time::sleep(backoff).await;
                retries += 1;
                continue;
            }
            return Err(HarvestError::RateLimited(60));
        }

        return Err(HarvestError::from_status(service, status));
    }
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"))
}

/// Strip HTML/JATS tags and collapse runs of whitespace.
pub(crate) fn strip_markup(text: &str) -> String {
    let stripped = tag_re().replace_all(text, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
