//! Run configuration.
//!
//! All settings come from the command line; [`HarvestConfig::in_dir`] lays
//! out the default file names under one base directory.

use crate::error::{HarvestError, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Sources the dispatcher knows how to query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceName {
    Crossref,
    Pubmed,
}

impl FromStr for SourceName {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "crossref" => Ok(SourceName::Crossref),
            "pubmed" => Ok(SourceName::Pubmed),
            other => Err(HarvestError::Config(format!("Unknown source: {}", other))),
        }
    }
}

/// Parse a comma-separated source list, e.g. `"crossref,pubmed"`.
pub fn parse_sources(list: &str) -> Result<Vec<SourceName>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SourceName::from_str)
        .collect()
}

/// Everything a harvest run needs to know
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub keywords_file: PathBuf,
    pub urls_file: PathBuf,
    pub metadata_file: PathBuf,
    pub summary_file: PathBuf,
    pub download_dir: PathBuf,
    /// Keyword section heading (`None` = whole file)
    pub section: Option<String>,
    /// Language tag written to the metadata table
    pub language: String,
    /// Maximum records fetched per source and processed per run
    pub max_results: usize,
    /// Number of keywords joined into the query
    pub max_keywords: usize,
    pub sources: Vec<SourceName>,
    /// Page size for paginated sources
    pub rows_per_page: usize,
    pub max_pages: usize,
    pub page_delay: Duration,
    pub record_delay: Duration,
    /// Contact email for polite API pools and Unpaywall
    pub mailto: Option<String>,
    pub resolve_landing: bool,
    pub download: bool,
    pub skip_existing: bool,
    pub cookie_file: Option<PathBuf>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self::in_dir(Path::new("."))
    }
}

impl HarvestConfig {
    /// Default settings with every file placed under `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            keywords_file: dir.join("keywords.md"),
            urls_file: dir.join("urls.txt"),
            metadata_file: dir.join("metadata.csv"),
            summary_file: dir.join("summary.csv"),
            download_dir: dir.join("References"),
            section: None,
            language: String::new(),
            max_results: 200,
            max_keywords: 12,
            sources: vec![SourceName::Crossref, SourceName::Pubmed],
            rows_per_page: 50,
            max_pages: 10,
            page_delay: Duration::from_secs(1),
            record_delay: Duration::from_millis(800),
            mailto: None,
            resolve_landing: false,
            download: true,
            skip_existing: false,
            cookie_file: None,
        }
    }

    /// Reject settings that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            return Err(HarvestError::Config("--max must be at least 1".to_string()));
        }
        if self.max_keywords == 0 {
            return Err(HarvestError::Config(
                "--max-keywords must be at least 1".to_string(),
            ));
        }
        if self.rows_per_page == 0 || self.max_pages == 0 {
            return Err(HarvestError::Config(
                "--rows and --max-pages must be at least 1".to_string(),
            ));
        }
        if self.sources.is_empty() {
            return Err(HarvestError::Config("No sources enabled".to_string()));
        }
        if let Some(mail) = &self.mailto {
            if !mail.contains('@') {
                return Err(HarvestError::Validation(format!(
                    "Not an email address: {}",
                    mail
                )));
            }
        }
        Ok(())
    }

    /// Query text: the first `max_keywords` keywords joined by spaces.
    pub fn build_query(&self, keywords: &[String]) -> String {
        keywords
            .iter()
            .take(self.max_keywords)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
