//! Consolidation-Disruption Index
//!
//! For a focal article F, every article C that cites F inside the citation
//! window contributes `f - 2fb`, where `f = 1` (C cites F) and `b = 1` when C
//! also cites one of F's own references. Citers that build on F's sources
//! consolidate (-1); citers that do not, disrupt (+1). The index is the mean
//! contribution, rounded to two decimals.
//!
//! Park, Leahey & Funk, Nature 613, 138-144 (2023).

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::article::{retain_numeric, ArticleRecord, CitationEdge, Pmid};
use crate::bibliographic::{Bibliographic, EdgeQuery};
use crate::europepmc::EpmcError;

/// Why a computation finished without a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unscorable {
    /// The service has no record for the PMID
    UnknownArticle,
    /// The record lacks a source tag or a usable publication date
    IncompleteRecord,
    /// The focal article has no reference list
    NoReferences,
    /// Nothing cites the focal article inside the window
    NoCitations,
    /// Every citer was skipped
    NoScorableCiters,
}

impl Unscorable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unscorable::UnknownArticle => "unknown article",
            Unscorable::IncompleteRecord => "incomplete record",
            Unscorable::NoReferences => "no references",
            Unscorable::NoCitations => "no citations",
            Unscorable::NoScorableCiters => "no scorable citers",
        }
    }
}

/// Result of scoring one focal article.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CdiReport {
    pub pmid: Pmid,
    /// Mean contribution rounded to 2 dp; `None` when `unscorable` is set
    pub score: Option<f64>,
    pub unscorable: Option<Unscorable>,
    /// Focal first publication date, when the lookup succeeded
    pub publication_date: Option<NaiveDate>,
    /// Distinct numeric references of the focal article
    pub references: usize,
    /// Distinct numeric citers inside the window
    pub citers: usize,
    pub disruptive: usize,
    pub consolidating: usize,
    /// Citers whose references could not be fetched
    pub skipped: usize,
}

impl CdiReport {
    fn new(pmid: Pmid, focal: Option<&ArticleRecord>) -> Self {
        Self {
            pmid,
            score: None,
            unscorable: None,
            publication_date: focal.map(|a| a.first_publication_date),
            references: 0,
            citers: 0,
            disruptive: 0,
            consolidating: 0,
            skipped: 0,
        }
    }

    fn unscorable(mut self, reason: Unscorable) -> Self {
        info!(pmid = %self.pmid, reason = reason.as_str(), "CDI unscorable");
        self.score = None;
        self.unscorable = Some(reason);
        self
    }
}

/// A fetch for the focal article failed. The whole computation is void.
#[derive(Debug, Error)]
pub enum CdiError {
    #[error("looking up PMID {pmid}: {source}")]
    Lookup { pmid: Pmid, source: EpmcError },
    #[error("fetching references of PMID {pmid}: {source}")]
    References { pmid: Pmid, source: EpmcError },
    #[error("fetching citations to PMID {pmid}: {source}")]
    Citations { pmid: Pmid, source: EpmcError },
}

impl CdiError {
    pub fn pmid(&self) -> Pmid {
        match self {
            CdiError::Lookup { pmid, .. }
            | CdiError::References { pmid, .. }
            | CdiError::Citations { pmid, .. } => *pmid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Contribution {
    Disruptive,
    Consolidating,
}

impl Contribution {
    fn from_overlap(shares_reference: bool) -> Self {
        if shares_reference {
            Contribution::Consolidating
        } else {
            Contribution::Disruptive
        }
    }

    /// `f - 2fb` with `f = 1`
    fn value(self) -> i32 {
        let f = 1;
        let b = i32::from(self == Contribution::Consolidating);
        f - 2 * f * b
    }
}

/// Compute the CDI of `pmid`.
///
/// `Ok` with `score: None` means the data needed for a score does not exist.
/// `Err` means a request for the focal article failed and the caller may retry.
pub fn compute_cdi<B: Bibliographic + ?Sized>(service: &B, pmid: Pmid) -> Result<CdiReport, CdiError> {
    let focal = match service.lookup_article(pmid) {
        Ok(article) => article,
        Err(source) if source.is_fault() => return Err(CdiError::Lookup { pmid, source }),
        Err(EpmcError::Incomplete { .. }) => {
            return Ok(CdiReport::new(pmid, None).unscorable(Unscorable::IncompleteRecord));
        }
        Err(_) => {
            return Ok(CdiReport::new(pmid, None).unscorable(Unscorable::UnknownArticle));
        }
    };
    let query = EdgeQuery::for_article(&focal);
    let mut report = CdiReport::new(pmid, Some(&focal));

    let references = service
        .references_of(pmid, &query)
        .map_err(|source| CdiError::References { pmid, source })?;
    let Some(references) = references.into_hits() else {
        return Ok(report.unscorable(Unscorable::NoReferences));
    };
    let ref_ids: HashSet<String> = retain_numeric(references)
        .into_iter()
        .filter_map(|e| e.id)
        .collect();
    report.references = ref_ids.len();

    let citations = service
        .citations_to(pmid, &query)
        .map_err(|source| CdiError::Citations { pmid, source })?;
    let citers = distinct_citers(citations.into_hits().unwrap_or_default());
    report.citers = citers.len();
    if citers.is_empty() {
        return Ok(report.unscorable(Unscorable::NoCitations));
    }

    let mut contributions = Vec::with_capacity(citers.len());
    for citer in &citers {
        match citer_contribution(service, citer, &ref_ids) {
            Ok(Some(contribution)) => {
                match contribution {
                    Contribution::Disruptive => report.disruptive += 1,
                    Contribution::Consolidating => report.consolidating += 1,
                }
                contributions.push(contribution.value());
            }
            Ok(None) => report.skipped += 1,
            Err(e) => {
                warn!(pmid = %pmid, citer = ?citer.id, "skipping citer: {}", e);
                report.skipped += 1;
            }
        }
    }

    match mean_rounded(&contributions) {
        Some(score) => {
            report.score = Some(score);
            info!(
                pmid = %pmid,
                score,
                citers = report.citers,
                skipped = report.skipped,
                "CDI computed"
            );
            Ok(report)
        }
        None => Ok(report.unscorable(Unscorable::NoScorableCiters)),
    }
}

/// Numeric citers in first-seen order, each once.
fn distinct_citers(edges: Vec<CitationEdge>) -> Vec<CitationEdge> {
    let mut seen = HashSet::new();
    retain_numeric(edges)
        .into_iter()
        .filter(|e| e.id.as_ref().is_some_and(|id| seen.insert(id.clone())))
        .collect()
}

/// `Ok(None)` when the citer has no reference list.
fn citer_contribution<B: Bibliographic + ?Sized>(
    service: &B,
    citer: &CitationEdge,
    ref_ids: &HashSet<String>,
) -> Result<Option<Contribution>, EpmcError> {
    let Some(pmid) = citer.numeric_id().and_then(|id| id.parse::<Pmid>().ok()) else {
        return Ok(None);
    };
    let query = EdgeQuery {
        source: citer.source.clone(),
        publication_year: citer.pub_year,
    };

    let Some(subrefs) = service.references_of(pmid, &query)?.into_hits() else {
        debug!(citer = %pmid, "citer has no references");
        return Ok(None);
    };
    let shares_reference = subrefs
        .iter()
        .filter_map(|e| e.id.as_deref())
        .any(|id| ref_ids.contains(id));

    Ok(Some(Contribution::from_overlap(shares_reference)))
}

/// Mean rounded to 2 dp, half to even. `None` for an empty slice.
fn mean_rounded(values: &[i32]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: i64 = values.iter().map(|&v| i64::from(v)).sum();
    let mean = sum as f64 / values.len() as f64;
    Some((mean * 100.0).round_ties_even() / 100.0)
}
