//! Article identifiers, metadata records and citation edges as returned by EuropePMC.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// PubMed identifier. Always a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Pmid(u64);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("not a PMID: {0:?}")]
pub struct InvalidPmid(pub String);

impl Pmid {
    pub fn new(value: u64) -> Result<Self, InvalidPmid> {
        if value == 0 {
            return Err(InvalidPmid(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl FromStr for Pmid {
    type Err = InvalidPmid;

    /// Accepts `12345` and the `12345.0` form spreadsheets write for integer columns.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = match trimmed.split_once('.') {
            Some((int, frac)) if !frac.is_empty() && frac.bytes().all(|b| b == b'0') => int,
            Some(_) => return Err(InvalidPmid(s.to_string())),
            None => trimmed,
        };
        if !is_numeric_id(digits) {
            return Err(InvalidPmid(s.to_string()));
        }
        digits
            .parse::<u64>()
            .map_err(|_| InvalidPmid(s.to_string()))
            .and_then(Pmid::new)
    }
}

impl fmt::Display for Pmid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata for a single article, taken from a `resultType=core` search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleRecord {
    pub pmid: Pmid,
    pub first_publication_date: NaiveDate,
    /// Sub-database holding the record (`MED`, `PMC`, `PPR`, ...)
    pub source: String,
}

impl ArticleRecord {
    pub fn publication_year(&self) -> i32 {
        self.first_publication_date.year()
    }
}

/// One entry of a `referenceList` or `citationList`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CitationEdge {
    #[serde(default, deserialize_with = "loose_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(rename = "pubYear", default, deserialize_with = "loose_year")]
    pub pub_year: Option<i32>,
}

impl CitationEdge {
    /// The edge id when it is a plain PMID (preprints, patents and agricola ids are not).
    pub fn numeric_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| is_numeric_id(id))
    }
}

/// True for a non-empty all-digit identifier.
pub fn is_numeric_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Keep only edges whose id is present and numeric.
pub fn retain_numeric(edges: Vec<CitationEdge>) -> Vec<CitationEdge> {
    edges.into_iter().filter(|e| e.numeric_id().is_some()).collect()
}

// EuropePMC is not consistent about quoting: ids and years show up both as
// JSON strings and JSON numbers depending on the endpoint.
fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn loose_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pmid_parse() {
        assert_eq!("12345".parse::<Pmid>().unwrap().get(), 12345);
        assert_eq!(" 12345 ".parse::<Pmid>().unwrap().get(), 12345);
        assert_eq!("12345.0".parse::<Pmid>().unwrap().get(), 12345);
    }

    #[test]
    fn test_pmid_rejects_garbage() {
        assert!("".parse::<Pmid>().is_err());
        assert!("0".parse::<Pmid>().is_err());
        assert!("PMC8901234".parse::<Pmid>().is_err());
        assert!("12345.5".parse::<Pmid>().is_err());
        assert!("-7".parse::<Pmid>().is_err());
        assert!("nan".parse::<Pmid>().is_err());
    }

    #[test]
    fn test_edge_deserialization_loose_types() {
        let json = r#"[
            {"id": "31452104", "source": "MED", "pubYear": 2019},
            {"id": 2800001, "source": "MED", "pubYear": "2001"},
            {"source": "AGR", "pubYear": 1998},
            {"id": "PPR123", "source": "PPR"}
        ]"#;
        let edges: Vec<CitationEdge> = serde_json::from_str(json).unwrap();
        assert_eq!(edges[0].id.as_deref(), Some("31452104"));
        assert_eq!(edges[0].pub_year, Some(2019));
        assert_eq!(edges[1].id.as_deref(), Some("2800001"));
        assert_eq!(edges[1].pub_year, Some(2001));
        assert_eq!(edges[2].id, None);
        assert_eq!(edges[3].pub_year, None);
    }

    #[test]
    fn test_retain_numeric_drops_preprints() {
        let edge = |id: Option<&str>| CitationEdge {
            id: id.map(str::to_string),
            source: None,
            pub_year: Some(2020),
        };
        let kept = retain_numeric(vec![
            edge(Some("123")),
            edge(Some("PPR4567")),
            edge(None),
            edge(Some("10.1101/2020.01.01.123456")),
            edge(Some("")),
            edge(Some("456")),
        ]);
        let ids: Vec<_> = kept.iter().filter_map(|e| e.id.as_deref()).collect();
        assert_eq!(ids, vec!["123", "456"]);
    }

    proptest! {
        #[test]
        fn prop_only_numeric_ids_survive(
            ids in prop::collection::vec(
                prop_oneof![
                    "[0-9]{1,9}",
                    "PPR[0-9]{1,7}",
                    "10\\.[0-9]{4}/[a-z0-9.]{1,12}",
                    "[A-Za-z]{1,6}",
                ],
                0..40,
            )
        ) {
            let edges: Vec<CitationEdge> = ids
                .iter()
                .map(|id| CitationEdge { id: Some(id.clone()), source: None, pub_year: None })
                .collect();
            let expected = ids.iter().filter(|id| id.chars().all(|c| c.is_ascii_digit())).count();
            let kept = retain_numeric(edges);
            prop_assert_eq!(kept.len(), expected);
            for edge in &kept {
                let id = edge.id.as_deref().unwrap();
                prop_assert!(id.starts_with(|c: char| c.is_ascii_digit()));
            }
        }
    }
}
