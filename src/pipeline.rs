//! The harvest pipeline.
//!
//! keywords → query → sources (in order) → per record: dedup, persist,
//! resolve a PDF URL, download. Everything runs one step at a time; failures
//! of a single source or record are logged and the run goes on.

use crate::config::{HarvestConfig, SourceName};
use crate::cookies::{Cookie, CookieManager};
use crate::download::{DownloadOutcome, Downloader};
use crate::error::Result;
use crate::persist::OutputStore;
use crate::record::LiteratureRecord;
use crate::resolve::OaResolver;
use crate::sources::{search_all, CrossrefSource, PubmedSource, Source};
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::fmt;
use tracing::{info, warn};

/// Counters reported at the end of a run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub query: String,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    /// Records returned by all sources together
    pub fetched: usize,
    pub persisted: usize,
    pub persist_failed: usize,
    /// Skipped because the file name was already seen
    pub duplicates: usize,
    pub downloaded: usize,
    pub already_present: usize,
    pub not_pdf: usize,
    pub download_failed: usize,
    pub no_pdf_url: usize,
}

impl RunSummary {
    fn start(query: String) -> Self {
        Self {
            query,
            started_at: Local::now(),
            finished_at: None,
            fetched: 0,
            persisted: 0,
            persist_failed: 0,
            duplicates: 0,
            downloaded: 0,
            already_present: 0,
            not_pdf: 0,
            download_failed: 0,
            no_pdf_url: 0,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Query:            {}", self.query)?;
        writeln!(f, "Fetched:          {}", self.fetched)?;
        writeln!(f, "Persisted:        {}", self.persisted)?;
        writeln!(f, "Duplicates:       {}", self.duplicates)?;
        writeln!(f, "Downloaded:       {}", self.downloaded)?;
        writeln!(f, "Already present:  {}", self.already_present)?;
        writeln!(f, "Not a PDF:        {}", self.not_pdf)?;
        writeln!(f, "Download failed:  {}", self.download_failed)?;
        write!(f, "No PDF URL:       {}", self.no_pdf_url)?;
        if self.persist_failed > 0 {
            write!(f, "\nPersist failed:   {}", self.persist_failed)?;
        }
        Ok(())
    }
}

/// Build the configured sources, in configured order.
pub fn build_sources(config: &HarvestConfig) -> Result<Vec<Box<dyn Source>>> {
    config
        .sources
        .iter()
        .map(|name| -> Result<Box<dyn Source>> {
            let source: Box<dyn Source> = match name {
                SourceName::Crossref => Box::new(CrossrefSource::new(config)?),
                SourceName::Pubmed => Box::new(PubmedSource::new(config)?),
            };
            Ok(source)
        })
        .collect()
}

/// One configured harvest
pub struct Pipeline {
    config: HarvestConfig,
    sources: Vec<Box<dyn Source>>,
    store: OutputStore,
    downloader: Option<Downloader>,
    resolver: OaResolver,
}

impl Pipeline {
    /// Wire up sources, output files and downloader from `config`.
    pub fn from_config(config: HarvestConfig) -> Result<Self> {
        config.validate()?;

        let cookies: Vec<Cookie> = config
            .cookie_file
            .as_ref()
            .map(|path| CookieManager::with_path(path.clone()).load())
            .unwrap_or_default();

        let downloader = if config.download {
            std::fs::create_dir_all(&config.download_dir)?;
            Some(Downloader::new(cookies.clone())?)
        } else {
            None
        };

        let resolver = OaResolver::new(config.mailto.clone(), config.resolve_landing, cookies)?;
        let sources = build_sources(&config)?;

        Ok(Self::new(config, sources, downloader, resolver))
    }

    /// Assemble a pipeline from parts.
    pub fn new(
        config: HarvestConfig,
        sources: Vec<Box<dyn Source>>,
        downloader: Option<Downloader>,
        resolver: OaResolver,
    ) -> Self {
        let store = OutputStore::new(
            config.urls_file.clone(),
            config.metadata_file.clone(),
            config.summary_file.clone(),
        );
        Self {
            config,
            sources,
            store,
            downloader,
            resolver,
        }
    }

    /// Run the whole harvest for `keywords`.
    pub async fn run(&self, keywords: &[String]) -> RunSummary {
        let query = self.config.build_query(keywords);
        let mut summary = RunSummary::start(query.clone());
        info!(query = %query, sources = self.sources.len(), "Starting harvest");

        let records = search_all(&self.sources, &query, self.config.max_results).await;
        summary.fetched = records.len();

        let mut seen = if self.config.skip_existing {
            self.store.existing_filenames().unwrap_or_else(|e| {
                warn!(error = %e, "Could not read existing metadata, not skipping");
                HashSet::new()
            })
        } else {
            HashSet::new()
        };

        let mut processed = 0;
        for record in &records {
            if processed >= self.config.max_results {
                info!(max = self.config.max_results, "Result cap reached");
                break;
            }

            if !seen.insert(record.filename.clone()) {
                info!(filename = %record.filename, "Duplicate record, skipping");
                summary.duplicates += 1;
                continue;
            }

            if processed > 0 {
                tokio::time::sleep(self.config.record_delay).await;
            }
            processed += 1;

            self.process(record, &mut summary).await;
        }

        summary.finished_at = Some(Local::now());
        info!(
            fetched = summary.fetched,
            persisted = summary.persisted,
            downloaded = summary.downloaded,
            "Harvest complete"
        );
        summary
    }

    async fn process(&self, record: &LiteratureRecord, summary: &mut RunSummary) {
        match self.store.append(record) {
            Ok(()) => summary.persisted += 1,
            Err(e) => {
                warn!(filename = %record.filename, error = %e, "Failed to persist record");
                summary.persist_failed += 1;
            }
        }

        let Some(downloader) = &self.downloader else {
            return;
        };

        let path = self.config.download_dir.join(&record.filename);
        if path.exists() {
            info!(filename = %record.filename, "Already downloaded");
            summary.already_present += 1;
            return;
        }

        let url = match &record.pdf_url {
            Some(url) => Some(url.clone()),
            None if self.resolver.is_enabled() => self.resolver.resolve(record).await,
            None => None,
        };
        let Some(url) = url else {
            summary.no_pdf_url += 1;
            return;
        };

        let title: String = record.title.chars().take(80).collect();
        info!(title = %title, url = %url, "Downloading PDF");

        match downloader.download(&url, &path).await {
            Ok(DownloadOutcome::Saved(_)) => summary.downloaded += 1,
            Ok(DownloadOutcome::Skipped) => summary.already_present += 1,
            Ok(DownloadOutcome::NotPdf { content_type }) => {
                warn!(url = %url, content_type = %content_type, "Response is not a PDF, not saved");
                summary.not_pdf += 1;
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Download failed");
                summary.download_failed += 1;
            }
        }
    }
}
