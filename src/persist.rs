//! Flat-file output: URL list, metadata table, summary table.
//!
//! Each append opens its file in append mode. Table headers are written only
//! when the file is empty, so repeated runs extend the same files.

use crate::error::Result;
use crate::record::{LiteratureRecord, METADATA_COLUMNS, SUMMARY_COLUMNS};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The three output files of a harvest
#[derive(Debug, Clone)]
pub struct OutputStore {
    urls_path: PathBuf,
    metadata_path: PathBuf,
    summary_path: PathBuf,
}

impl OutputStore {
    pub fn new(urls_path: PathBuf, metadata_path: PathBuf, summary_path: PathBuf) -> Self {
        Self {
            urls_path,
            metadata_path,
            summary_path,
        }
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    /// Append one record to all three files.
    pub fn append(&self, record: &LiteratureRecord) -> Result<()> {
        self.append_url(record)?;
        append_csv_row(&self.metadata_path, METADATA_COLUMNS, &record.metadata_row())?;
        append_csv_row(&self.summary_path, SUMMARY_COLUMNS, &record.summary_row())?;
        debug!(filename = %record.filename, "Persisted record");
        Ok(())
    }

    /// `url<TAB>filename`, only for records that have a URL at all.
    fn append_url(&self, record: &LiteratureRecord) -> Result<()> {
        let url = record.preferred_url();
        if url.is_empty() {
            return Ok(());
        }
        let mut file = open_append(&self.urls_path)?;
        writeln!(file, "{}\t{}", url, record.filename)?;
        Ok(())
    }

    /// File names already recorded in the metadata table.
    pub fn existing_filenames(&self) -> Result<HashSet<String>> {
        if !is_empty_file(&self.metadata_path)? {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .from_path(&self.metadata_path)?;

            let mut names = HashSet::new();
            for row in reader.records() {
                if let Some(name) = row?.get(0) {
                    names.insert(name.to_string());
                }
            }
            return Ok(names);
        }
        Ok(HashSet::new())
    }
}

fn open_append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Missing files count as empty.
fn is_empty_file(path: &Path) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len() == 0),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e.into()),
    }
}

fn append_csv_row(path: &Path, header: &[&str], row: &[String]) -> Result<()> {
    let write_header = is_empty_file(path)?;
    let file = open_append(path)?;

    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if write_header {
        wtr.write_record(header)?;
    }
    wtr.write_record(row)?;
    wtr.flush()?;
    Ok(())
}
