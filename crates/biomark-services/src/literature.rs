//! Literature search adapters (NCBI Entrez E-utilities).

use std::sync::Arc;

use async_trait::async_trait;
use biomark_protocol::{Citation, LiteratureSearch, ServiceError};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, instrument};

const SERVICE: &str = "pubmed";

#[derive(Debug, Clone)]
pub struct EntrezConfig {
    pub base_url: String,
    /// Client identifier passed as the `tool` parameter, per E-utilities
    /// usage policy.
    pub tool: String,
}

impl Default for EntrezConfig {
    fn default() -> Self {
        Self {
            base_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_owned(),
            tool: "biomark".to_owned(),
        }
    }
}

/// E-utilities client: `esearch` for ids, then `esummary` for citation
/// metadata.
pub struct EntrezClient {
    config: EntrezConfig,
    client: reqwest::Client,
}

impl EntrezClient {
    pub fn new(config: EntrezConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| ServiceError::request(SERVICE, error))?;
        Ok(Self { config, client })
    }

    async fn get_json(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, ServiceError> {
        let url = format!("{}/{endpoint}", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("retmode", "json"), ("tool", self.config.tool.as_str())])
            .query(params)
            .send()
            .await
            .map_err(|error| ServiceError::request(SERVICE, error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::response(SERVICE, format!("status {status}")));
        }
        response
            .json()
            .await
            .map_err(|error| ServiceError::response(SERVICE, error))
    }
}

pub(crate) fn parse_id_list(body: &Value) -> Result<Vec<String>, ServiceError> {
    body.get("esearchresult")
        .and_then(|result| result.get("idlist"))
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .ok_or_else(|| ServiceError::response(SERVICE, "missing esearchresult.idlist"))
}

pub(crate) fn parse_summaries(body: &Value) -> Result<Vec<Citation>, ServiceError> {
    let result = body
        .get("result")
        .ok_or_else(|| ServiceError::response(SERVICE, "missing result"))?;
    let uids = result
        .get("uids")
        .and_then(Value::as_array)
        .ok_or_else(|| ServiceError::response(SERVICE, "missing result.uids"))?;

    let mut citations = Vec::with_capacity(uids.len());
    for uid in uids.iter().filter_map(Value::as_str) {
        let Some(entry) = result.get(uid) else {
            continue;
        };
        let authors = entry
            .get("authors")
            .and_then(Value::as_array)
            .map(|authors| {
                authors
                    .iter()
                    .filter_map(|author| author.get("name").and_then(Value::as_str))
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        citations.push(Citation {
            id: uid.to_owned(),
            title: entry
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            journal: entry
                .get("fulljournalname")
                .and_then(Value::as_str)
                .map(str::to_owned),
            published: entry
                .get("pubdate")
                .and_then(Value::as_str)
                .map(str::to_owned),
            authors,
        });
    }
    Ok(citations)
}

#[async_trait]
impl LiteratureSearch for EntrezClient {
    #[instrument(skip(self))]
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<Citation>, ServiceError> {
        let retmax = max_results.to_string();
        let search = self
            .get_json("esearch.fcgi", &[
                ("db", "pubmed"),
                ("term", query),
                ("retmax", retmax.as_str()),
                ("sort", "relevance"),
            ])
            .await?;
        let ids = parse_id_list(&search)?;
        debug!(hits = ids.len(), "literature ids retrieved");
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let joined = ids.join(",");
        let summaries = self
            .get_json("esummary.fcgi", &[("db", "pubmed"), ("id", joined.as_str())])
            .await?;
        parse_summaries(&summaries)
    }
}

/// Canned search results for tests and offline gateway runs.
#[derive(Debug, Clone, Default)]
pub struct StaticLiteratureSearch {
    citations: Arc<Mutex<Vec<Citation>>>,
}

impl StaticLiteratureSearch {
    pub fn new(citations: Vec<Citation>) -> Self {
        Self {
            citations: Arc::new(Mutex::new(citations)),
        }
    }
}

#[async_trait]
impl LiteratureSearch for StaticLiteratureSearch {
    async fn search(
        &self,
        _query: &str,
        max_results: usize,
    ) -> Result<Vec<Citation>, ServiceError> {
        let citations = self.citations.lock();
        Ok(citations.iter().take(max_results).cloned().collect())
    }
}
