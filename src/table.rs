//! CSV-backed article table
//!
//! One row per article. The columns this crate manages are added on load if
//! missing; every other column is carried through untouched.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;

use crate::article::Pmid;

pub const PMID_COLUMN: &str = "pmid";
pub const CDI_COLUMN: &str = "CDI";
pub const DATE_COLUMN: &str = "date";
pub const YEAR_COLUMN: &str = "year";
pub const MONTH_COLUMN: &str = "month";
pub const YEARMONTH_COLUMN: &str = "yearmonth";
pub const STATUS_COLUMN: &str = "cdi_status";

#[derive(Debug, Error)]
pub enum TableError {
    #[error("table not found: {0}")]
    NotFound(PathBuf),
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("CSV error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("{path} line {line}: expected at most {expected} fields, found {found}")]
    TooManyFields {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },
}

/// Outcome recorded for a row by the batch driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdiStatus {
    Scored,
    /// Data for a score does not exist; not retried
    Unscorable,
    /// A request failed; retried on the next run
    Fault,
}

impl CdiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CdiStatus::Scored => "scored",
            CdiStatus::Unscorable => "unscorable",
            CdiStatus::Fault => "fault",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scored" => Some(CdiStatus::Scored),
            "unscorable" => Some(CdiStatus::Unscorable),
            "fault" => Some(CdiStatus::Fault),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    pmid: usize,
    cdi: usize,
    date: usize,
    year: usize,
    month: usize,
    yearmonth: usize,
    status: usize,
}

#[derive(Debug, Clone)]
pub struct ArticleTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    cols: Columns,
}

impl ArticleTable {
    pub fn load(path: &Path) -> Result<Self, TableError> {
        if !path.exists() {
            return Err(TableError::NotFound(path.to_path_buf()));
        }
        let csv_err = |source| TableError::Csv { path: path.to_path_buf(), source };

        let file = File::open(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(BufReader::new(file));

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| h.to_string())
            .collect();
        // short rows are padded later; long rows have nowhere to go
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            if record.len() > headers.len() {
                return Err(TableError::TooManyFields {
                    path: path.to_path_buf(),
                    line: record.position().map_or(0, |p| p.line()),
                    expected: headers.len(),
                    found: record.len(),
                });
            }
            rows.push(record.iter().map(|v| v.to_string()).collect());
        }

        Ok(Self::from_parts(headers, rows))
    }

    /// Build a table from raw cells, adding any managed column that is missing.
    pub fn from_parts(mut headers: Vec<String>, mut rows: Vec<Vec<String>>) -> Self {
        let mut column = |name: &str| match headers.iter().position(|h| h == name) {
            Some(i) => i,
            None => {
                headers.push(name.to_string());
                headers.len() - 1
            }
        };
        let cols = Columns {
            pmid: column(PMID_COLUMN),
            cdi: column(CDI_COLUMN),
            date: column(DATE_COLUMN),
            year: column(YEAR_COLUMN),
            month: column(MONTH_COLUMN),
            yearmonth: column(YEARMONTH_COLUMN),
            status: column(STATUS_COLUMN),
        };
        for row in &mut rows {
            row.resize(headers.len(), String::new());
        }
        Self { headers, rows, cols }
    }

    /// Write the table, replacing `path` only once the new file is complete.
    pub fn save(&self, path: &Path) -> Result<(), TableError> {
        let io_err = |source| TableError::Io { path: path.to_path_buf(), source };
        let csv_err = |source| TableError::Csv { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp).map_err(csv_err)?;
            writer.write_record(&self.headers).map_err(csv_err)?;
            for row in &self.rows {
                writer.write_record(row).map_err(csv_err)?;
            }
            writer.flush().map_err(io_err)?;
        }
        fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Raw cell by column name.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.headers.iter().position(|h| h == column)?;
        self.rows.get(row).map(|r| r[col].as_str())
    }

    fn value(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .map(|r| r[col].trim())
            .filter(|v| !is_missing(v))
    }

    pub fn pmid(&self, row: usize) -> Option<Pmid> {
        self.value(row, self.cols.pmid)?.parse().ok()
    }

    pub fn cdi(&self, row: usize) -> Option<f64> {
        self.value(row, self.cols.cdi)?.parse().ok()
    }

    pub fn date(&self, row: usize) -> Option<&str> {
        self.value(row, self.cols.date)
    }

    pub fn status(&self, row: usize) -> Option<CdiStatus> {
        CdiStatus::parse(self.value(row, self.cols.status)?)
    }

    pub fn set_cdi(&mut self, row: usize, score: Option<f64>) {
        let cell = score.map(|s| format!("{:.2}", s)).unwrap_or_default();
        self.rows[row][self.cols.cdi] = cell;
    }

    pub fn set_date(&mut self, row: usize, date: NaiveDate) {
        self.rows[row][self.cols.date] = date.format("%Y-%m-%d").to_string();
    }

    pub fn set_status(&mut self, row: usize, status: CdiStatus) {
        self.rows[row][self.cols.status] = status.as_str().to_string();
    }

    /// Rows that still need a CDI: a PMID, no score, no date, and not already
    /// found unscorable. With `recompute`, every row with a PMID.
    pub fn pending_cdi(&self, recompute: bool) -> Vec<usize> {
        (0..self.rows.len())
            .filter(|&i| self.pmid(i).is_some())
            .filter(|&i| {
                recompute
                    || (self.cdi(i).is_none()
                        && self.date(i).is_none()
                        && self.status(i) != Some(CdiStatus::Unscorable))
            })
            .collect()
    }

    /// Scored rows with a PMID but no publication date.
    pub fn missing_dates(&self) -> Vec<usize> {
        (0..self.rows.len())
            .filter(|&i| self.pmid(i).is_some() && self.cdi(i).is_some() && self.date(i).is_none())
            .collect()
    }

    /// Fill year (`date[0..4]`), month (`date[5..7]`) and `year-month`.
    /// A year without a month still gets `year-`.
    pub fn derive_date_fields(&mut self) {
        let cols = self.cols;
        for row in &mut self.rows {
            let date = row[cols.date].trim().to_string();
            let year = date.get(0..4).filter(|_| !is_missing(&date)).unwrap_or("");
            let month = date.get(5..7).unwrap_or("");
            row[cols.year] = year.to_string();
            row[cols.month] = month.to_string();
            row[cols.yearmonth] = if year.is_empty() {
                String::new()
            } else {
                format!("{}-{}", year, month)
            };
        }
    }
}

/// Empty cells and the markers spreadsheet tools write for missing values.
fn is_missing(value: &str) -> bool {
    matches!(value, "" | "NaN" | "nan" | "NA" | "<NA>")
}
