//! Crossref API source.
//!
//! Searches `/works` with the joined keyword query, paging with
//! `rows`/`offset` until a short page, the result cap or the page cap.

use super::{get_json, strip_markup, Source};
use crate::config::HarvestConfig;
use crate::error::{HarvestError, Result};
use crate::record::{Author, LiteratureRecord, RecordFields, SourceKind};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Crossref API base URL
pub const CROSSREF_API_URL: &str = "https://api.crossref.org/works";

/// Crossref search client
pub struct CrossrefSource {
    client: reqwest::Client,
    base_url: String,
    rows_per_page: usize,
    max_pages: usize,
    page_delay: Duration,
    mailto: Option<String>,
    language: String,
}

impl CrossrefSource {
    /// Create a client from the run configuration.
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        let user_agent = match &config.mailto {
            Some(mail) => format!("litharvest/{} (mailto:{})", env!("CARGO_PKG_VERSION"), mail),
            None => format!("litharvest/{}", env!("CARGO_PKG_VERSION")),
        };

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HarvestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: CROSSREF_API_URL.to_string(),
            rows_per_page: config.rows_per_page,
            max_pages: config.max_pages,
            page_delay: config.page_delay,
            mailto: config.mailto.clone(),
            language: config.language.clone(),
        })
    }

    /// Point the client at a different endpoint (mirrors, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_page(&self, query: &str, rows: usize, offset: usize) -> Result<Vec<CrossrefItem>> {
        let mut params = vec![
            ("query", query.to_string()),
            ("rows", rows.to_string()),
            ("offset", offset.to_string()),
            ("sort", "relevance".to_string()),
            ("order", "desc".to_string()),
        ];
        if let Some(mail) = &self.mailto {
            params.push(("mailto", mail.clone()));
        }

        let data: CrossrefResponse =
            get_json(&self.client, &self.base_url, &params, "Crossref API").await?;
        Ok(data.message.into_items())
    }
}

#[async_trait]
impl Source for CrossrefSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Crossref
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<LiteratureRecord>> {
        info!(query = query, max = max_results, "Starting Crossref query");

        let mut records = Vec::new();
        let mut fetched = 0;

        for page in 0..self.max_pages {
            let remaining = max_results.saturating_sub(fetched);
            if remaining == 0 {
                break;
            }
            let rows = self.rows_per_page.min(remaining);

            if page > 0 {
                tokio::time::sleep(self.page_delay).await;
            }

            debug!(page = page + 1, offset = fetched, rows = rows, "Fetching Crossref page");

            let items = match self.fetch_page(query, rows, fetched).await {
                Ok(items) => items,
                // Nothing collected yet: let the dispatcher report it.
                Err(e) if page == 0 => return Err(e),
                Err(e) => {
                    warn!(page = page + 1, error = %e, "Crossref page failed, keeping earlier pages");
                    break;
                }
            };

            let count = items.len();
            fetched += count;
            records.extend(
                items
                    .into_iter()
                    .filter_map(|item| parse_crossref_item(item, &self.language)),
            );

            if count < rows {
                break;
            }
        }

        info!(fetched = fetched, records = records.len(), "Crossref query complete");
        Ok(records)
    }
}

// === Crossref API Response Types ===

#[derive(Debug, Deserialize)]
struct CrossrefResponse {
    message: CrossrefMessage,
}

#[derive(Debug, Deserialize)]
struct CrossrefMessage {
    #[serde(default, deserialize_with = "null_as_default")]
    items: Vec<serde_json::Value>,
}

impl CrossrefMessage {
    /// Items are decoded one at a time so a malformed entry costs only itself.
    fn into_items(self) -> Vec<CrossrefItem> {
        self.items
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<CrossrefItem>(value) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed Crossref item");
                    None
                }
            })
            .collect()
    }
}

/// Treat an explicit `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
struct CrossrefItem {
    #[serde(rename = "DOI", default, deserialize_with = "null_as_default")]
    doi: String,
    #[serde(default, deserialize_with = "null_as_default")]
    title: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    author: Vec<CrossrefAuthor>,
    #[serde(rename = "container-title", default, deserialize_with = "null_as_default")]
    container_title: Vec<String>,
    #[serde(default)]
    issued: Option<CrossrefDate>,
    #[serde(rename = "published-print", default)]
    published_print: Option<CrossrefDate>,
    #[serde(rename = "published-online", default)]
    published_online: Option<CrossrefDate>,
    #[serde(default)]
    published: Option<CrossrefDate>,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
    #[serde(rename = "URL", default, deserialize_with = "null_as_default")]
    url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    link: Vec<CrossrefLink>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CrossrefAuthor {
    #[serde(default, deserialize_with = "null_as_default")]
    given: String,
    #[serde(default, deserialize_with = "null_as_default")]
    family: String,
    /// Organisational authors carry only a name
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct CrossrefDate {
    #[serde(rename = "date-parts", default, deserialize_with = "null_as_default")]
    date_parts: Vec<Vec<Option<i32>>>,
}

impl CrossrefDate {
    fn year(&self) -> Option<i32> {
        self.date_parts.first().and_then(|p| p.first().copied().flatten())
    }
}

#[derive(Debug, Default, Deserialize)]
struct CrossrefLink {
    #[serde(rename = "URL", default, deserialize_with = "null_as_default")]
    url: String,
    #[serde(rename = "content-type", default, deserialize_with = "null_as_default")]
    content_type: String,
}

/// Normalize a Crossref item; items without a title are dropped.
fn parse_crossref_item(item: CrossrefItem, language: &str) -> Option<LiteratureRecord> {
    let title = item.title.join(" ").trim().to_string();
    if title.is_empty() {
        return None;
    }

    let authors = item
        .author
        .iter()
        .map(|a| {
            if a.family.is_empty() && a.given.is_empty() {
                // Organisations have no family name; the surname comes from
                // the last word of the name.
                Author::new(a.name.clone(), "")
            } else {
                Author::new(a.given.clone(), a.family.clone())
            }
        })
        .collect();

    let year = [
        &item.issued,
        &item.published_print,
        &item.published_online,
        &item.published,
    ]
    .into_iter()
    .flatten()
    .find_map(CrossrefDate::year);

    let pdf_url = item
        .link
        .iter()
        .filter(|l| !l.url.is_empty())
        .find(|l| {
            l.content_type.to_lowercase().contains("pdf") || l.url.to_lowercase().ends_with(".pdf")
        })
        .map(|l| l.url.clone());

    let language = if language.is_empty() {
        item.language.unwrap_or_default()
    } else {
        language.to_string()
    };

    Some(LiteratureRecord::new(
        SourceKind::Crossref,
        RecordFields {
            title,
            authors,
            year,
            journal: item.container_title.into_iter().next().unwrap_or_default(),
            doi: Some(item.doi),
            url: item.url,
            pdf_url,
            abstract_text: item
                .abstract_text
                .map(|s| strip_markup(&s))
                .unwrap_or_default(),
            language,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::search_or_empty;
    use crate::test_support::{Canned, TestServer};
    use serde_json::json;

    const ITEM_JSON: &str = r#"{
        "DOI": "10.1234/foo",
        "title": ["Foo Bar"],
        "author": [
            {"given": "Jane", "family": "Smith"},
            {"name": "WHO Working Group"}
        ],
        "container-title": ["Toxins"],
        "issued": {"date-parts": [[2020, 5, 1]]},
        "abstract": "<jats:p>Mould   in herbs.</jats:p>",
        "URL": "https://doi.org/10.1234/foo",
        "link": [
            {"URL": "https://example.org/foo.xml", "content-type": "text/xml"},
            {"URL": "https://example.org/foo", "content-type": "application/pdf"}
        ],
        "language": "en"
    }"#;

    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);
        format!("http://127.0.0.1:{}/works", port)
    }

    #[test]
    fn test_parse_crossref_item() {
        let item: CrossrefItem = serde_json::from_str(ITEM_JSON).expect("item json");
        let record = parse_crossref_item(item, "").expect("record");

        assert_eq!(record.filename, "2020_Smith_Foo_Bar.pdf");
        assert_eq!(record.doi.as_deref(), Some("10.1234/foo"));
        assert_eq!(record.authors_joined(), "Jane Smith; WHO Working Group");
        assert_eq!(record.journal, "Toxins");
        assert_eq!(record.abstract_text, "Mould in herbs.");
        assert_eq!(record.pdf_url.as_deref(), Some("https://example.org/foo"));
        assert_eq!(record.language, "en");
    }

    #[test]
    fn test_year_fallback_and_null_parts() {
        let json = r#"{
            "title": ["T"],
            "issued": {"date-parts": [[null]]},
            "published-online": {"date-parts": [[2018, 2]]}
        }"#;
        let item: CrossrefItem = serde_json::from_str(json).expect("item json");
        let record = parse_crossref_item(item, "fr").expect("record");
        assert_eq!(record.year, Some(2018));
        assert_eq!(record.doi, None);
        assert_eq!(record.language, "fr");
        assert_eq!(record.filename, "2018_anon_T.pdf");
    }

    #[test]
    fn test_item_without_title_is_dropped() {
        let item: CrossrefItem = serde_json::from_str(r#"{"DOI": "10.1/x"}"#).expect("item json");
        assert!(parse_crossref_item(item, "").is_none());
    }

    #[test]
    fn test_response_without_items() {
        let data: CrossrefResponse =
            serde_json::from_str(r#"{"status": "ok", "message": {}}"#).expect("response json");
        assert!(data.message.items.is_empty());
    }

    #[test]
    fn test_null_fields_do_not_spoil_the_page() {
        let json = r#"{"message": {"items": [
            {"title": ["Good Paper"], "author": [{"given": "A", "family": "Berg"}]},
            {"title": ["Other"], "DOI": null, "URL": null, "author": [{"given": "C", "family": null}]},
            {"title": "not a list"}
        ]}}"#;
        let data: CrossrefResponse = serde_json::from_str(json).expect("response json");
        let records: Vec<_> = data
            .message
            .into_items()
            .into_iter()
            .filter_map(|item| parse_crossref_item(item, ""))
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Good Paper");
        assert_eq!(records[1].title, "Other");
        assert_eq!(records[1].doi, None);
        assert_eq!(records[1].url, "");
        assert_eq!(records[1].authors_joined(), "C");
    }

    #[test]
    fn test_organisation_surname_is_last_word() {
        let json = r#"{
            "title": ["Global Burden"],
            "author": [{"name": "WHO Working Group"}],
            "issued": {"date-parts": [[2020]]}
        }"#;
        let item: CrossrefItem = serde_json::from_str(json).expect("item json");
        let record = parse_crossref_item(item, "").expect("record");
        assert_eq!(record.filename, "2020_Group_Global_Burden.pdf");
        assert_eq!(record.authors_joined(), "WHO Working Group");
    }

    fn page(titles: &[&str]) -> Canned {
        let items: Vec<_> = titles.iter().map(|t| json!({"title": [t]})).collect();
        Canned::json(json!({"status": "ok", "message": {"items": items}}))
    }

    fn paged_source(server: &TestServer, rows: usize, max_pages: usize) -> Result<CrossrefSource> {
        let config = HarvestConfig {
            rows_per_page: rows,
            max_pages,
            page_delay: Duration::ZERO,
            ..HarvestConfig::default()
        };
        Ok(CrossrefSource::new(&config)?.with_base_url(format!("{}/works", server.base_url)))
    }

    #[tokio::test]
    async fn test_pagination_shrinks_last_page_to_result_cap() -> Result<()> {
        let server =
            TestServer::start(vec![page(&["a", "b"]), page(&["c", "d"]), page(&["e"])]).await;
        let source = paged_source(&server, 2, 10)?;

        let records = source.search("mycotoxins", 5).await?;
        assert_eq!(records.len(), 5);

        let requests = server.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].contains("rows=2&offset=0"));
        assert!(requests[1].contains("rows=2&offset=2"));
        assert!(requests[2].contains("rows=1&offset=4"));
        Ok(())
    }

    #[tokio::test]
    async fn test_pagination_stops_on_short_page() -> Result<()> {
        let server =
            TestServer::start(vec![page(&["a", "b"]), page(&["c"]), page(&["x", "y"])]).await;
        let source = paged_source(&server, 2, 10)?;

        let records = source.search("mycotoxins", 50).await?;
        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
        assert_eq!(server.requests().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_pagination_stops_at_page_cap() -> Result<()> {
        let server = TestServer::start(vec![
            page(&["a", "b"]),
            page(&["c", "d"]),
            page(&["e", "f"]),
        ])
        .await;
        let source = paged_source(&server, 2, 2)?;

        let records = source.search("mycotoxins", 50).await?;
        assert_eq!(records.len(), 4);
        assert_eq!(server.requests().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_later_page_failure_keeps_earlier_pages() -> Result<()> {
        let server = TestServer::start(vec![
            page(&["a", "b"]),
            Canned::new(500, "text/plain", "oops"),
        ])
        .await;
        let source = paged_source(&server, 2, 10)?;

        let records = source.search("mycotoxins", 50).await?;
        assert_eq!(records.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_network_failure_yields_empty_list() -> Result<()> {
        let source = CrossrefSource::new(&HarvestConfig::default())?.with_base_url(closed_port_url());
        assert!(source.search("mycotoxins", 10).await.is_err());
        assert!(search_or_empty(&source, "mycotoxins", 10).await.is_empty());
        Ok(())
    }
}
