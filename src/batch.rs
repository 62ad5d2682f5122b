//! Batch CDI scoring over an article table
//!
//! Scores every row that still needs a CDI, checkpointing the working table as
//! it goes so an interrupted run loses at most `checkpoint_every` articles,
//! then back-fills missing publication dates and writes the output table with
//! year/month columns.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::bibliographic::Bibliographic;
use crate::cdi::compute_cdi;
use crate::settings::Settings;
use crate::table::{ArticleTable, CdiStatus, TableError};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Working table; read at start, overwritten at each checkpoint
    pub input: PathBuf,
    pub output: PathBuf,
    pub checkpoint_every: usize,
    pub date_fill_delay: Duration,
    /// Score every row with a PMID, including already scored ones
    pub recompute: bool,
}

impl BatchOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            input: settings.input_path.clone(),
            output: settings.output_path.clone(),
            checkpoint_every: settings.checkpoint_every,
            date_fill_delay: Duration::from_millis(settings.date_fill_delay_ms),
            recompute: false,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub attempted: usize,
    pub scored: usize,
    pub unscorable: usize,
    pub faults: usize,
    pub dates_filled: usize,
    pub date_failures: usize,
    pub checkpoints: usize,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Articles attempted: {}", self.attempted)?;
        writeln!(f, "  scored:     {}", self.scored)?;
        writeln!(f, "  unscorable: {}", self.unscorable)?;
        writeln!(f, "  faults:     {}", self.faults)?;
        writeln!(f, "Dates filled: {} ({} failed)", self.dates_filled, self.date_failures)?;
        write!(f, "Checkpoints:  {}", self.checkpoints)
    }
}

/// Run the whole batch: score, back-fill dates, derive columns, write output.
pub fn run_batch<B: Bibliographic + ?Sized>(
    service: &B,
    options: &BatchOptions,
) -> Result<BatchSummary, BatchError> {
    let start = Instant::now();
    info!(path = %options.input.display(), "reading table");
    let mut table = ArticleTable::load(&options.input)?;
    let mut summary = BatchSummary::default();
    if table.is_empty() {
        warn!(path = %options.input.display(), "table has no rows");
    }

    score_pending(service, &mut table, options, &mut summary)?;
    fill_missing_dates(service, &mut table, options, &mut summary);

    table.derive_date_fields();
    table.save(&options.output)?;
    info!(
        path = %options.output.display(),
        elapsed_secs = start.elapsed().as_secs_f64(),
        "batch complete"
    );
    Ok(summary)
}

fn score_pending<B: Bibliographic + ?Sized>(
    service: &B,
    table: &mut ArticleTable,
    options: &BatchOptions,
    summary: &mut BatchSummary,
) -> Result<(), BatchError> {
    let pending = table.pending_cdi(options.recompute);
    info!(articles = pending.len(), "starting CDI search");
    let every = options.checkpoint_every.max(1);

    for (counter, row) in pending.into_iter().enumerate() {
        let Some(pmid) = table.pmid(row) else { continue };
        summary.attempted += 1;

        match compute_cdi(service, pmid) {
            Ok(report) => {
                table.set_cdi(row, report.score);
                if let Some(date) = report.publication_date {
                    table.set_date(row, date);
                }
                if report.score.is_some() {
                    table.set_status(row, CdiStatus::Scored);
                    summary.scored += 1;
                } else {
                    table.set_status(row, CdiStatus::Unscorable);
                    summary.unscorable += 1;
                }
            }
            Err(e) => {
                // leave the score empty so the next run retries this row
                error!(pmid = %pmid, "{}", e);
                table.set_status(row, CdiStatus::Fault);
                summary.faults += 1;
            }
        }

        if counter % every == 0 {
            info!(counter, "saving checkpoint");
            table.save(&options.input)?;
            summary.checkpoints += 1;
        }
    }

    if summary.attempted > 0 {
        table.save(&options.input)?;
        summary.checkpoints += 1;
    }
    Ok(())
}

fn fill_missing_dates<B: Bibliographic + ?Sized>(
    service: &B,
    table: &mut ArticleTable,
    options: &BatchOptions,
    summary: &mut BatchSummary,
) {
    let rows = table.missing_dates();
    if rows.is_empty() {
        return;
    }
    info!(articles = rows.len(), "filling missing dates");

    for (i, &row) in rows.iter().enumerate() {
        let Some(pmid) = table.pmid(row) else { continue };
        match service.lookup_article(pmid) {
            Ok(article) => {
                table.set_date(row, article.first_publication_date);
                summary.dates_filled += 1;
            }
            Err(e) if e.is_fault() => {
                warn!(pmid = %pmid, "date lookup failed: {}", e);
                summary.date_failures += 1;
            }
            Err(e) => {
                debug!(pmid = %pmid, "no date available: {}", e);
                summary.date_failures += 1;
            }
        }
        if i + 1 < rows.len() && !options.date_fill_delay.is_zero() {
            std::thread::sleep(options.date_fill_delay);
        }
    }
}
