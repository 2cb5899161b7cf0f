//! Database access for bidaudit-server
//!
//! Plain `sqlx::query` calls over the shared MySQL pool; rows are mapped by
//! hand into the models from `bidaudit_common::db`.

pub mod fields;
pub mod files;
pub mod projects;
pub mod risks;
pub mod rules;

use bidaudit_common::normalizer::Evidence;
use bidaudit_common::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::Row;
use std::str::FromStr;

/// Read a DATETIME column as UTC
pub(crate) fn timestamp(row: &MySqlRow, column: &str) -> Result<DateTime<Utc>> {
    let value: NaiveDateTime = row.try_get(column)?;
    Ok(value.and_utc())
}

/// Parse a status column, naming the column in the error
pub(crate) fn parse_column<T: FromStr<Err = Error>>(row: &MySqlRow, column: &str) -> Result<T> {
    let text: String = row.try_get(column)?;
    text.parse()
}

/// Read a TINYINT(1) flag
pub(crate) fn flag(row: &MySqlRow, column: &str) -> Result<bool> {
    let value: i8 = row.try_get(column)?;
    Ok(value != 0)
}

/// Evidence columns (`evidence_page`, `evidence_snippet`, `evidence_bbox`)
pub(crate) fn evidence(row: &MySqlRow) -> Result<Option<Evidence>> {
    let page: Option<i64> = row.try_get("evidence_page")?;
    let snippet: Option<String> = row.try_get("evidence_snippet")?;
    let bbox: Option<String> = row.try_get("evidence_bbox")?;

    let evidence = Evidence {
        page,
        snippet,
        bbox: bbox.and_then(|text| serde_json::from_str(&text).ok()),
    };
    Ok((!evidence.is_empty()).then_some(evidence))
}

/// Split evidence into the three column values
pub(crate) fn evidence_columns(
    evidence: Option<&Evidence>,
) -> (Option<i64>, Option<String>, Option<String>) {
    match evidence {
        Some(e) => (
            e.page,
            e.snippet.clone(),
            e.bbox.as_ref().and_then(|b| serde_json::to_string(b).ok()),
        ),
        None => (None, None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evidence_columns() {
        let evidence = Evidence {
            page: Some(3),
            snippet: Some("预算金额".into()),
            bbox: Some(vec![1.0, 2.5]),
        };
        let (page, snippet, bbox) = evidence_columns(Some(&evidence));
        assert_eq!(page, Some(3));
        assert_eq!(snippet.as_deref(), Some("预算金额"));
        assert_eq!(bbox.as_deref(), Some("[1.0,2.5]"));

        assert_eq!(evidence_columns(None), (None, None, None));
    }

    #[test]
    fn test_large_page_numbers_kept() {
        let evidence = Evidence {
            page: Some(5_000_000_000),
            ..Default::default()
        };
        assert_eq!(evidence_columns(Some(&evidence)).0, Some(5_000_000_000));
    }
}
