//! PubMed E-utilities source.
//!
//! Endpoints used:
//!   esearch: https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi
//!   esummary: https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esummary.fcgi
//!
//! Both are requested with `retmode=json`. Summaries carry no abstract.

use super::{get_json, strip_markup, Source};
use crate::config::HarvestConfig;
use crate::error::{HarvestError, Result};
use crate::record::{Author, LiteratureRecord, RecordFields, SourceKind};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// E-utilities base URL
pub const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// PMIDs per esummary request
const SUMMARY_BATCH: usize = 200;

/// PubMed search client
pub struct PubmedSource {
    client: reqwest::Client,
    base_url: String,
    page_delay: Duration,
    email: Option<String>,
    language: String,
}

impl PubmedSource {
    /// Create a client from the run configuration.
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("litharvest/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HarvestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: EUTILS_BASE.to_string(),
            page_delay: config.page_delay,
            email: config.mailto.clone(),
            language: config.language.clone(),
        })
    }

    /// Point the client at a different E-utilities root (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn base_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("retmode", "json".to_string()),
            ("tool", "litharvest".to_string()),
        ];
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }
        params
    }

    /// Search PubMed and return a list of PMIDs.
    async fn esearch(&self, query: &str, max: usize) -> Result<Vec<String>> {
        let mut params = self.base_params();
        params.push(("term", query.to_string()));
        params.push(("retmax", max.to_string()));

        let url = format!("{}/esearch.fcgi", self.base_url);
        let resp: EsearchResponse = get_json(&self.client, &url, &params, "PubMed esearch").await?;

        debug!(count = resp.esearchresult.idlist.len(), "PubMed esearch returned PMIDs");
        Ok(resp.esearchresult.idlist)
    }

    /// Fetch document summaries for `pmids`, in PMID order.
    async fn esummary(&self, pmids: &[String]) -> Result<Vec<PubmedSummary>> {
        let mut params = self.base_params();
        params.push(("id", pmids.join(",")));

        let url = format!("{}/esummary.fcgi", self.base_url);
        let resp: EsummaryResponse = get_json(&self.client, &url, &params, "PubMed esummary").await?;
        Ok(resp.into_summaries())
    }
}

#[async_trait]
impl Source for PubmedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Pubmed
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<LiteratureRecord>> {
        info!(query = query, max = max_results, "Starting PubMed query");

        let pmids = self.esearch(query, max_results).await?;
        let mut records = Vec::with_capacity(pmids.len());

        for (idx, chunk) in pmids.chunks(SUMMARY_BATCH).enumerate() {
            tokio::time::sleep(self.page_delay).await;

            match self.esummary(chunk).await {
                Ok(summaries) => records.extend(
                    summaries
                        .into_iter()
                        .filter_map(|s| parse_summary(s, &self.language)),
                ),
                Err(e) if idx == 0 => return Err(e),
                Err(e) => {
                    warn!(batch = idx + 1, error = %e, "PubMed summary batch failed, keeping earlier batches");
                    break;
                }
            }
        }

        info!(pmids = pmids.len(), records = records.len(), "PubMed query complete");
        Ok(records)
    }
}

// === E-utilities Response Types ===

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

/// `result` maps each PMID to its summary, plus a `uids` list giving order.
#[derive(Debug, Deserialize)]
struct EsummaryResponse {
    #[serde(default)]
    result: HashMap<String, serde_json::Value>,
}

impl EsummaryResponse {
    fn into_summaries(mut self) -> Vec<PubmedSummary> {
        let uids: Vec<String> = self
            .result
            .remove("uids")
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        uids.iter()
            .filter_map(|uid| self.result.remove(uid))
            .filter_map(|value| match serde_json::from_value::<PubmedSummary>(value) {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed PubMed summary");
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
struct PubmedSummary {
    #[serde(default)]
    uid: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<PubmedAuthor>,
    #[serde(default)]
    pubdate: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    articleids: Vec<PubmedArticleId>,
    #[serde(default)]
    elocationid: String,
    #[serde(default)]
    lang: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PubmedAuthor {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PubmedArticleId {
    #[serde(default)]
    idtype: String,
    #[serde(default)]
    value: String,
}

impl PubmedSummary {
    fn article_id(&self, idtype: &str) -> Option<String> {
        self.articleids
            .iter()
            .find(|id| id.idtype == idtype && !id.value.is_empty())
            .map(|id| id.value.clone())
    }
}

/// PubMed names are "Family Initials", e.g. "Smith JA".
fn split_pubmed_name(name: &str) -> Author {
    let name = name.trim();
    match name.rsplit_once(' ') {
        Some((family, initials))
            if !initials.is_empty() && initials.chars().all(|c| c.is_uppercase()) =>
        {
            Author::new(initials, family)
        }
        _ => Author::new("", name),
    }
}

/// Map MEDLINE three-letter language codes onto two-letter tags.
fn language_tag(code: &str) -> String {
    match code {
        "eng" => "en",
        "fre" => "fr",
        "ger" => "de",
        "spa" => "es",
        "ita" => "it",
        "por" => "pt",
        "chi" => "zh",
        "jpn" => "ja",
        other => other,
    }
    .to_string()
}

fn parse_summary(summary: PubmedSummary, language: &str) -> Option<LiteratureRecord> {
    let title = strip_markup(&summary.title);
    if title.is_empty() {
        return None;
    }

    let doi = summary.article_id("doi").or_else(|| {
        summary
            .elocationid
            .split_whitespace()
            .skip_while(|t| *t != "doi:")
            .nth(1)
            .map(str::to_string)
    });

    let pdf_url = summary
        .article_id("pmc")
        .map(|pmc| format!("https://www.ncbi.nlm.nih.gov/pmc/articles/{}/pdf/", pmc));

    let year = summary
        .pubdate
        .get(..4)
        .and_then(|y| y.parse::<i32>().ok());

    let language = if language.is_empty() {
        summary.lang.first().map(|l| language_tag(l)).unwrap_or_default()
    } else {
        language.to_string()
    };

    let url = if summary.uid.is_empty() {
        String::new()
    } else {
        format!("https://pubmed.ncbi.nlm.nih.gov/{}/", summary.uid)
    };

    Some(LiteratureRecord::new(
        SourceKind::Pubmed,
        RecordFields {
            title,
            authors: summary
                .authors
                .iter()
                .map(|a| split_pubmed_name(&a.name))
                .collect(),
            year,
            journal: summary.source,
            doi,
            url,
            pdf_url,
            abstract_text: String::new(),
            language,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::search_or_empty;

    const SUMMARY_JSON: &str = r#"{
        "header": {"type": "esummary", "version": "0.3"},
        "result": {
            "uids": ["222", "111"],
            "111": {
                "uid": "111",
                "title": "Ochratoxin A in <i>liquorice</i> root.",
                "authors": [{"name": "Smith JA", "authtype": "Author"}],
                "pubdate": "2019 Mar",
                "source": "Food Chem",
                "articleids": [{"idtype": "pubmed", "value": "111"}],
                "elocationid": "doi: 10.1016/j.foodchem.2019.01.001",
                "lang": ["eng"]
            },
            "222": {
                "uid": "222",
                "title": "Aflatoxins in ginseng",
                "authors": [{"name": "World Health Organization"}],
                "pubdate": "2021",
                "source": "Toxins (Basel)",
                "articleids": [
                    {"idtype": "doi", "value": "10.3390/toxins13010001"},
                    {"idtype": "pmc", "value": "PMC7820000"}
                ],
                "lang": ["fre"]
            }
        }
    }"#;

    #[test]
    fn test_summaries_follow_uid_order() {
        let resp: EsummaryResponse = serde_json::from_str(SUMMARY_JSON).expect("esummary json");
        let summaries = resp.into_summaries();
        let uids: Vec<_> = summaries.iter().map(|s| s.uid.as_str()).collect();
        assert_eq!(uids, vec!["222", "111"]);
    }

    #[test]
    fn test_parse_summary() {
        let resp: EsummaryResponse = serde_json::from_str(SUMMARY_JSON).expect("esummary json");
        let records: Vec<_> = resp
            .into_summaries()
            .into_iter()
            .filter_map(|s| parse_summary(s, ""))
            .collect();

        let second = &records[1];
        assert_eq!(second.title, "Ochratoxin A in liquorice root.");
        assert_eq!(second.authors[0].family, "Smith");
        assert_eq!(second.year, Some(2019));
        assert_eq!(second.doi.as_deref(), Some("10.1016/j.foodchem.2019.01.001"));
        assert_eq!(second.url, "https://pubmed.ncbi.nlm.nih.gov/111/");
        assert_eq!(second.language, "en");
        assert_eq!(second.filename, "2019_Smith_Ochratoxin_A_in_liquorice_root_.pdf");
        assert!(second.pdf_url.is_none());

        let first = &records[0];
        assert_eq!(first.doi.as_deref(), Some("10.3390/toxins13010001"));
        assert_eq!(
            first.pdf_url.as_deref(),
            Some("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC7820000/pdf/")
        );
        assert_eq!(first.authors[0].surname(), "World Health Organization");
        assert_eq!(first.language, "fr");
    }

    #[test]
    fn test_split_pubmed_name() {
        assert_eq!(split_pubmed_name("van der Berg H"), Author::new("H", "van der Berg"));
        assert_eq!(split_pubmed_name("Consortium"), Author::new("", "Consortium"));
    }

    #[test]
    fn test_esearch_response() {
        let json = r#"{"esearchresult": {"count": "2", "idlist": ["1", "2"]}}"#;
        let resp: EsearchResponse = serde_json::from_str(json).expect("esearch json");
        assert_eq!(resp.esearchresult.idlist, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_network_failure_yields_empty_list() -> Result<()> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        drop(listener);

        let source = PubmedSource::new(&HarvestConfig::default())?
            .with_base_url(format!("http://127.0.0.1:{}", port));
        assert!(search_or_empty(&source, "ginseng", 5).await.is_empty());
        Ok(())
    }
}
