//! # litharvest
//!
//! Keyword-driven literature harvester: queries Crossref and PubMed, appends
//! normalized records to flat files and downloads open PDFs.
//!
//! ## Modules
//!
//! - [`keywords`] - Keyword sections from a markdown file
//! - [`sources`] - Crossref / PubMed clients and the query dispatcher
//! - [`record`] - Common record shape
//! - [`filename`] - Filesystem-safe record file names
//! - [`persist`] - URL list, metadata and summary tables
//! - [`download`] - PDF downloader
//! - [`resolve`] - Open-access fallback URLs (Unpaywall, landing pages)
//! - [`cookies`] - Cookie persistence for institutional proxies
//! - [`pipeline`] - The sequential harvest run
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use litharvest::{config::HarvestConfig, keywords, pipeline::Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = HarvestConfig::default();
//!     let kws = keywords::load_keywords(&config.keywords_file, Some("English"))?;
//!     let summary = Pipeline::from_config(config)?.run(&kws).await;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cookies;
pub mod download;
pub mod error;
pub mod filename;
pub mod keywords;
pub mod persist;
pub mod pipeline;
pub mod record;
pub mod resolve;
pub mod sources;

#[cfg(test)]
mod test_support;

pub use error::{HarvestError, Result};
