//! The seam between the CDI engine and the bibliographic service.
//!
//! Implementors only provide the raw lookups; resolving a missing source tag or
//! publication year and applying the citation window happen here so every
//! backend (the live EuropePMC client, the in-memory fixtures used in tests)
//! shares the same filtering.

use chrono::Datelike;
use chrono::NaiveDate;

use crate::article::{ArticleRecord, CitationEdge, Pmid};
use crate::europepmc::EpmcError;

/// Years after first publication during which references and citations count.
pub const CITATION_WINDOW_YEARS: i32 = 5;

/// Which edge list to fetch for an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Articles the identifier cites
    References,
    /// Articles citing the identifier
    Citations,
}

impl EdgeKind {
    /// Path segment of the EuropePMC endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::References => "references",
            EdgeKind::Citations => "citations",
        }
    }
}

/// Outcome of a successful edge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeFetch {
    Hits(Vec<CitationEdge>),
    /// The service reported `hitCount == 0`
    NoData,
}

impl EdgeFetch {
    pub fn into_hits(self) -> Option<Vec<CitationEdge>> {
        match self {
            EdgeFetch::Hits(edges) => Some(edges),
            EdgeFetch::NoData => None,
        }
    }
}

/// Optional overrides for an edge fetch. Whatever is left `None` is resolved
/// through an article lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeQuery {
    pub source: Option<String>,
    /// Year the citation window is anchored on
    pub publication_year: Option<i32>,
}

impl EdgeQuery {
    /// Query anchored on an explicit source tag and publication date.
    pub fn anchored(source: impl Into<String>, published: NaiveDate) -> Self {
        Self {
            source: Some(source.into()),
            publication_year: Some(published.year()),
        }
    }

    pub fn for_article(article: &ArticleRecord) -> Self {
        Self::anchored(article.source.clone(), article.first_publication_date)
    }
}

/// Read-only access to a bibliographic service.
pub trait Bibliographic {
    /// Metadata for a PMID. Zero hits is `EpmcError::NotFound`.
    fn lookup_article(&self, pmid: Pmid) -> Result<ArticleRecord, EpmcError>;

    /// The complete, unfiltered edge list for an article in `source`.
    fn fetch_edges(&self, pmid: Pmid, source: &str, kind: EdgeKind) -> Result<EdgeFetch, EpmcError>;

    /// Articles `pmid` cites, restricted to the citation window.
    fn references_of(&self, pmid: Pmid, query: &EdgeQuery) -> Result<EdgeFetch, EpmcError> {
        windowed_edges(self, pmid, query, EdgeKind::References)
    }

    /// Articles citing `pmid`, restricted to the citation window.
    fn citations_to(&self, pmid: Pmid, query: &EdgeQuery) -> Result<EdgeFetch, EpmcError> {
        windowed_edges(self, pmid, query, EdgeKind::Citations)
    }
}

impl<B: Bibliographic + ?Sized> Bibliographic for &B {
    fn lookup_article(&self, pmid: Pmid) -> Result<ArticleRecord, EpmcError> {
        (**self).lookup_article(pmid)
    }

    fn fetch_edges(&self, pmid: Pmid, source: &str, kind: EdgeKind) -> Result<EdgeFetch, EpmcError> {
        (**self).fetch_edges(pmid, source, kind)
    }
}

fn windowed_edges<B: Bibliographic + ?Sized>(
    service: &B,
    pmid: Pmid,
    query: &EdgeQuery,
    kind: EdgeKind,
) -> Result<EdgeFetch, EpmcError> {
    let (source, year) = match (&query.source, query.publication_year) {
        (Some(source), Some(year)) => (source.clone(), year),
        (source, year) => {
            let article = service.lookup_article(pmid)?;
            (
                source.clone().unwrap_or(article.source.clone()),
                year.unwrap_or(article.publication_year()),
            )
        }
    };

    Ok(match service.fetch_edges(pmid, &source, kind)? {
        EdgeFetch::Hits(edges) => EdgeFetch::Hits(within_window(edges, year)),
        EdgeFetch::NoData => EdgeFetch::NoData,
    })
}

/// Keep edges published no later than `publication_year + CITATION_WINDOW_YEARS`.
/// Edges without a year cannot be placed in the window and are dropped.
pub fn within_window(edges: Vec<CitationEdge>, publication_year: i32) -> Vec<CitationEdge> {
    let cutoff = publication_year + CITATION_WINDOW_YEARS;
    edges
        .into_iter()
        .filter(|e| e.pub_year.is_some_and(|y| y <= cutoff))
        .collect()
}
