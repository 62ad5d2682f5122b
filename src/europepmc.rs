//! EuropePMC REST client
//!
//! API docs: https://europepmc.org/RestfulWebService
//! No API key. Requests are blocking and never retried here; pacing belongs to
//! the caller.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::article::{ArticleRecord, CitationEdge, Pmid};
use crate::bibliographic::{Bibliographic, EdgeFetch, EdgeKind};
use crate::settings::Settings;

/// Largest `pageSize` the references/citations endpoints accept.
pub const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Error)]
pub enum EpmcError {
    #[error("no EuropePMC record for PMID {0}")]
    NotFound(Pmid),
    /// The record exists but lacks a field scoring needs; it will not appear later
    #[error("EuropePMC record for PMID {pmid} has no usable {field}")]
    Incomplete { pmid: Pmid, field: &'static str },
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("EuropePMC returned status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("EuropePMC error {code}: {message}")]
    Service { code: String, message: String },
    #[error("failed to parse EuropePMC response: {0}")]
    Decode(String),
    #[error("invalid base URL {0:?}")]
    InvalidBaseUrl(String),
}

impl EpmcError {
    /// Faults are worth retrying later; missing or incomplete records never are.
    pub fn is_fault(&self) -> bool {
        !matches!(self, EpmcError::NotFound(_) | EpmcError::Incomplete { .. })
    }
}

impl From<url::ParseError> for EpmcError {
    fn from(e: url::ParseError) -> Self {
        EpmcError::InvalidBaseUrl(e.to_string())
    }
}

/// Any payload may carry an error pair instead of data
#[derive(Debug, Deserialize)]
struct ErrorProbe {
    #[serde(rename = "errCode", default)]
    err_code: Option<serde_json::Value>,
    #[serde(rename = "errMsg", default)]
    err_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "hitCount", default)]
    hit_count: u64,
    #[serde(rename = "resultList", default)]
    result_list: Option<ResultList>,
}

#[derive(Debug, Deserialize)]
struct ResultList {
    #[serde(default)]
    result: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    source: Option<String>,
    #[serde(rename = "firstPublicationDate")]
    first_publication_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EdgeResponse {
    #[serde(rename = "hitCount")]
    hit_count: u64,
    #[serde(rename = "referenceList", default)]
    reference_list: Option<ReferenceList>,
    #[serde(rename = "citationList", default)]
    citation_list: Option<CitationList>,
}

#[derive(Debug, Deserialize)]
struct ReferenceList {
    #[serde(default)]
    reference: Vec<CitationEdge>,
}

#[derive(Debug, Deserialize)]
struct CitationList {
    #[serde(default)]
    citation: Vec<CitationEdge>,
}

impl EdgeResponse {
    fn into_edges(self, kind: EdgeKind) -> Vec<CitationEdge> {
        match kind {
            EdgeKind::References => self.reference_list.map(|l| l.reference),
            EdgeKind::Citations => self.citation_list.map(|l| l.citation),
        }
        .unwrap_or_default()
    }
}

/// Blocking EuropePMC client
pub struct EuropePmcClient {
    client: Client,
    base_url: Url,
    page_size: u32,
}

impl EuropePmcClient {
    pub fn new(settings: &Settings) -> Result<Self, EpmcError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.as_str())
            .build()?;

        let base_url = Url::parse(&settings.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(EpmcError::InvalidBaseUrl(settings.base_url.clone()));
        }

        Ok(Self {
            client,
            base_url,
            page_size: settings.page_size.clamp(1, MAX_PAGE_SIZE),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new(), so this always succeeds
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, EpmcError> {
        debug!(%url, "GET");
        let response = self
            .client
            .get(url.clone())
            .header("Accept", "application/json")
            .send()?;
        let status = response.status();
        let body = response.text()?;

        // errCode takes precedence over the HTTP status
        if let Ok(ErrorProbe { err_code: Some(code), err_msg }) = serde_json::from_str::<ErrorProbe>(&body) {
            let code = match code {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            return Err(EpmcError::Service {
                code,
                message: err_msg.unwrap_or_default(),
            });
        }

        if !status.is_success() {
            return Err(EpmcError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        serde_json::from_str(&body).map_err(|e| EpmcError::Decode(format!("{}: {}", url, e)))
    }
}

impl Bibliographic for EuropePmcClient {
    fn lookup_article(&self, pmid: Pmid) -> Result<ArticleRecord, EpmcError> {
        let mut url = self.endpoint(&["search"]);
        url.query_pairs_mut()
            .append_pair("query", &format!("EXT_ID:{}", pmid))
            .append_pair("resultType", "core")
            .append_pair("format", "json");

        let response: SearchResponse = self.get_json(url)?;
        let results = response.result_list.map(|l| l.result).unwrap_or_default();
        if response.hit_count == 0 || results.is_empty() {
            return Err(EpmcError::NotFound(pmid));
        }

        // EXT_ID also matches same-numbered records in other collections
        let hit = results
            .iter()
            .position(|r| r.source.as_deref() == Some("MED"))
            .unwrap_or(0);
        let raw = results
            .into_iter()
            .nth(hit)
            .ok_or(EpmcError::NotFound(pmid))?;

        let source = raw
            .source
            .filter(|s| !s.is_empty())
            .ok_or(EpmcError::Incomplete { pmid, field: "source" })?;
        let first_publication_date = raw
            .first_publication_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .ok_or_else(|| {
                debug!(pmid = %pmid, date = ?raw.first_publication_date, "unusable publication date");
                EpmcError::Incomplete { pmid, field: "firstPublicationDate" }
            })?;

        Ok(ArticleRecord {
            pmid,
            first_publication_date,
            source,
        })
    }

    fn fetch_edges(&self, pmid: Pmid, source: &str, kind: EdgeKind) -> Result<EdgeFetch, EpmcError> {
        let id = pmid.to_string();
        let mut collected: Vec<CitationEdge> = Vec::new();
        let mut page = 1u32;

        loop {
            let mut url = self.endpoint(&[source, &id, kind.as_str()]);
            url.query_pairs_mut()
                .append_pair("page", &page.to_string())
                .append_pair("pageSize", &self.page_size.to_string())
                .append_pair("format", "json");

            let response: EdgeResponse = self.get_json(url)?;
            let hit_count = response.hit_count;
            if hit_count == 0 {
                if page == 1 {
                    debug!(pmid = %pmid, kind = kind.as_str(), "no hits");
                    return Ok(EdgeFetch::NoData);
                }
                break;
            }

            let edges = response.into_edges(kind);
            let exhausted = edges.is_empty();
            collected.extend(edges);
            if exhausted || collected.len() as u64 >= hit_count {
                break;
            }
            page += 1;
        }

        debug!(pmid = %pmid, kind = kind.as_str(), edges = collected.len(), pages = page, "fetched");
        Ok(EdgeFetch::Hits(collected))
    }
}
