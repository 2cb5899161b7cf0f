//! Extracted field persistence (project-level and file-level)
//!
//! Both tables are keyed by `(owner, field_code)`; writes are upserts so
//! re-running an extraction never duplicates rows.

use bidaudit_common::db::{FieldStatus, FieldValueInput, FileField, ProjectField};
use bidaudit_common::{Error, Result};
use serde::Serialize;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

use super::{evidence, evidence_columns, parse_column, timestamp};

/// Outcome of a batch save: rows are written one by one, so a failing item
/// does not stop its siblings.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub saved: usize,
    pub failed: Vec<FieldFailure>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldFailure {
    pub field_code: String,
    pub error: String,
}

/// Status stored when the caller did not choose one
fn effective_status(input: &FieldValueInput) -> FieldStatus {
    match input.status {
        Some(status) => status,
        None if input.field_value.is_none() => FieldStatus::Missing,
        None => FieldStatus::Auto,
    }
}

fn validate(input: &FieldValueInput) -> Result<()> {
    if input.field_code.trim().is_empty() {
        return Err(Error::InvalidInput("fieldCode is required".to_string()));
    }
    Ok(())
}

fn row_to_project_field(row: &MySqlRow) -> Result<ProjectField> {
    Ok(ProjectField {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        field_code: row.try_get("field_code")?,
        field_name: row.try_get("field_name")?,
        field_value: row.try_get("field_value")?,
        status: parse_column(row, "status")?,
        evidence: evidence(row)?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn row_to_file_field(row: &MySqlRow) -> Result<FileField> {
    Ok(FileField {
        id: row.try_get("id")?,
        file_id: row.try_get("file_id")?,
        project_id: row.try_get("project_id")?,
        field_code: row.try_get("field_code")?,
        field_name: row.try_get("field_name")?,
        field_value: row.try_get("field_value")?,
        status: parse_column(row, "status")?,
        evidence: evidence(row)?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub async fn list_project_fields(pool: &MySqlPool, project_id: &str) -> Result<Vec<ProjectField>> {
    let rows = sqlx::query(
        r#"
        SELECT id, project_id, field_code, field_name, field_value, status,
               evidence_page, evidence_snippet, evidence_bbox, updated_at
        FROM project_fields
        WHERE project_id = ?
        ORDER BY id
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_project_field).collect()
}

pub async fn get_project_field(
    pool: &MySqlPool,
    project_id: &str,
    field_code: &str,
) -> Result<Option<ProjectField>> {
    let row = sqlx::query(
        r#"
        SELECT id, project_id, field_code, field_name, field_value, status,
               evidence_page, evidence_snippet, evidence_bbox, updated_at
        FROM project_fields
        WHERE project_id = ? AND field_code = ?
        "#,
    )
    .bind(project_id)
    .bind(field_code)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_project_field).transpose()
}

/// Insert or update one project field. An empty `field_name` keeps the
/// stored name.
pub async fn upsert_project_field(
    pool: &MySqlPool,
    project_id: &str,
    input: &FieldValueInput,
) -> Result<()> {
    validate(input)?;
    let (page, snippet, bbox) = evidence_columns(input.evidence.as_ref());

    sqlx::query(
        r#"
        INSERT INTO project_fields
            (project_id, field_code, field_name, field_value, status,
             evidence_page, evidence_snippet, evidence_bbox)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            field_name = IF(VALUES(field_name) = '', field_name, VALUES(field_name)),
            field_value = VALUES(field_value),
            status = VALUES(status),
            evidence_page = VALUES(evidence_page),
            evidence_snippet = VALUES(evidence_snippet),
            evidence_bbox = VALUES(evidence_bbox),
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(project_id)
    .bind(input.field_code.trim())
    .bind(&input.field_name)
    .bind(input.field_value.as_deref())
    .bind(effective_status(input).as_str())
    .bind(page)
    .bind(snippet)
    .bind(bbox)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_project_fields(
    pool: &MySqlPool,
    project_id: &str,
    inputs: &[FieldValueInput],
) -> BatchReport {
    let mut report = BatchReport::default();
    for input in inputs {
        match upsert_project_field(pool, project_id, input).await {
            Ok(()) => report.saved += 1,
            Err(e) => {
                tracing::warn!(project_id, field_code = %input.field_code, error = %e, "Field save failed");
                report.failed.push(FieldFailure {
                    field_code: input.field_code.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    report
}

pub async fn list_file_fields(pool: &MySqlPool, file_id: &str) -> Result<Vec<FileField>> {
    let rows = sqlx::query(
        r#"
        SELECT id, file_id, project_id, field_code, field_name, field_value, status,
               evidence_page, evidence_snippet, evidence_bbox, updated_at
        FROM file_fields
        WHERE file_id = ?
        ORDER BY id
        "#,
    )
    .bind(file_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_file_field).collect()
}

/// Every file field of a project, paired with the owning file's name
pub async fn list_file_fields_by_project(
    pool: &MySqlPool,
    project_id: &str,
) -> Result<Vec<(String, FileField)>> {
    let rows = sqlx::query(
        r#"
        SELECT ff.id, ff.file_id, ff.project_id, ff.field_code, ff.field_name, ff.field_value,
               ff.status, ff.evidence_page, ff.evidence_snippet, ff.evidence_bbox, ff.updated_at,
               pf.file_name
        FROM file_fields ff
        JOIN project_files pf ON pf.id = ff.file_id
        WHERE ff.project_id = ?
        ORDER BY pf.created_at, ff.id
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| Ok((row.try_get("file_name")?, row_to_file_field(row)?)))
        .collect()
}

pub async fn upsert_file_field(
    pool: &MySqlPool,
    project_id: &str,
    file_id: &str,
    input: &FieldValueInput,
) -> Result<()> {
    validate(input)?;
    let (page, snippet, bbox) = evidence_columns(input.evidence.as_ref());

    sqlx::query(
        r#"
        INSERT INTO file_fields
            (file_id, project_id, field_code, field_name, field_value, status,
             evidence_page, evidence_snippet, evidence_bbox)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            field_name = IF(VALUES(field_name) = '', field_name, VALUES(field_name)),
            field_value = VALUES(field_value),
            status = VALUES(status),
            evidence_page = VALUES(evidence_page),
            evidence_snippet = VALUES(evidence_snippet),
            evidence_bbox = VALUES(evidence_bbox),
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(file_id)
    .bind(project_id)
    .bind(input.field_code.trim())
    .bind(&input.field_name)
    .bind(input.field_value.as_deref())
    .bind(effective_status(input).as_str())
    .bind(page)
    .bind(snippet)
    .bind(bbox)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_file_fields(
    pool: &MySqlPool,
    project_id: &str,
    file_id: &str,
    inputs: &[FieldValueInput],
) -> BatchReport {
    let mut report = BatchReport::default();
    for input in inputs {
        match upsert_file_field(pool, project_id, file_id, input).await {
            Ok(()) => report.saved += 1,
            Err(e) => {
                tracing::warn!(file_id, field_code = %input.field_code, error = %e, "Field save failed");
                report.failed.push(FieldFailure {
                    field_code: input.field_code.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(value: Option<&str>, status: Option<FieldStatus>) -> FieldValueInput {
        FieldValueInput {
            field_code: "budget_amount".into(),
            field_name: "预算金额".into(),
            field_value: value.map(str::to_string),
            status,
            evidence: None,
        }
    }

    #[test]
    fn test_effective_status() {
        assert_eq!(effective_status(&input(Some("100万"), None)), FieldStatus::Auto);
        assert_eq!(effective_status(&input(None, None)), FieldStatus::Missing);
        assert_eq!(
            effective_status(&input(Some("x"), Some(FieldStatus::Confirmed))),
            FieldStatus::Confirmed
        );
    }

    #[test]
    fn test_blank_code_rejected() {
        let mut bad = input(Some("x"), None);
        bad.field_code = "  ".into();
        assert!(matches!(validate(&bad), Err(Error::InvalidInput(_))));
    }
}
