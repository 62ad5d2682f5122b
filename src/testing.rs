//! In-memory bibliographic service for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::article::{ArticleRecord, CitationEdge, Pmid};
use crate::bibliographic::{Bibliographic, EdgeFetch, EdgeKind};
use crate::europepmc::EpmcError;

#[derive(Default)]
pub(crate) struct FakeLibrary {
    articles: HashMap<u64, ArticleRecord>,
    edges: HashMap<(u64, EdgeKind), Vec<CitationEdge>>,
    edge_faults: HashSet<(u64, EdgeKind)>,
    lookup_faults: HashSet<u64>,
    incomplete: HashSet<u64>,
    lookups: Cell<usize>,
    fetches: RefCell<Vec<(u64, EdgeKind)>>,
}

impl FakeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn article(&mut self, pmid: u64, date: &str, source: &str) {
        let record = ArticleRecord {
            pmid: Pmid::new(pmid).unwrap(),
            first_publication_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            source: source.to_string(),
        };
        self.articles.insert(pmid, record);
    }

    /// `(cited pmid, pubYear)` pairs.
    pub fn references(&mut self, pmid: u64, refs: &[(u64, i32)]) {
        self.raw_edges(pmid, EdgeKind::References, med_edges(refs));
    }

    /// `(citing pmid, pubYear)` pairs.
    pub fn citations(&mut self, pmid: u64, cites: &[(u64, i32)]) {
        self.raw_edges(pmid, EdgeKind::Citations, med_edges(cites));
    }

    pub fn raw_edges(&mut self, pmid: u64, kind: EdgeKind, edges: Vec<CitationEdge>) {
        self.edges.insert((pmid, kind), edges);
    }

    pub fn fail_edges(&mut self, pmid: u64, kind: EdgeKind) {
        self.edge_faults.insert((pmid, kind));
    }

    pub fn fail_lookup(&mut self, pmid: u64) {
        self.lookup_faults.insert(pmid);
    }

    /// Lookups find the record but without a usable publication date.
    pub fn incomplete(&mut self, pmid: u64) {
        self.incomplete.insert(pmid);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.get()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.borrow().len()
    }
}

fn med_edges(pairs: &[(u64, i32)]) -> Vec<CitationEdge> {
    pairs
        .iter()
        .map(|(id, year)| CitationEdge {
            id: Some(id.to_string()),
            source: Some("MED".to_string()),
            pub_year: Some(*year),
        })
        .collect()
}

fn simulated_fault() -> EpmcError {
    EpmcError::Service {
        code: "500".to_string(),
        message: "simulated outage".to_string(),
    }
}

impl Bibliographic for FakeLibrary {
    fn lookup_article(&self, pmid: Pmid) -> Result<ArticleRecord, EpmcError> {
        self.lookups.set(self.lookups.get() + 1);
        if self.lookup_faults.contains(&pmid.get()) {
            return Err(simulated_fault());
        }
        if self.incomplete.contains(&pmid.get()) {
            return Err(EpmcError::Incomplete { pmid, field: "firstPublicationDate" });
        }
        self.articles
            .get(&pmid.get())
            .cloned()
            .ok_or(EpmcError::NotFound(pmid))
    }

    fn fetch_edges(&self, pmid: Pmid, _source: &str, kind: EdgeKind) -> Result<EdgeFetch, EpmcError> {
        self.fetches.borrow_mut().push((pmid.get(), kind));
        if self.edge_faults.contains(&(pmid.get(), kind)) {
            return Err(simulated_fault());
        }
        Ok(match self.edges.get(&(pmid.get(), kind)) {
            Some(edges) if !edges.is_empty() => EdgeFetch::Hits(edges.clone()),
            _ => EdgeFetch::NoData,
        })
    }
}
