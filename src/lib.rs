pub mod article;
pub mod batch;
pub mod bibliographic;
pub mod cdi;
pub mod europepmc;
pub mod settings;
pub mod table;

#[cfg(test)]
mod testing;

pub use article::{ArticleRecord, CitationEdge, Pmid};
pub use batch::{run_batch, BatchError, BatchOptions, BatchSummary};
pub use bibliographic::{Bibliographic, EdgeFetch, EdgeKind, EdgeQuery};
pub use cdi::{compute_cdi, CdiError, CdiReport, Unscorable};
pub use europepmc::{EpmcError, EuropePmcClient};
pub use settings::Settings;
pub use table::{ArticleTable, CdiStatus, TableError};
