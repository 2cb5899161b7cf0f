//! Audit risk persistence

use bidaudit_common::db::{AuditRisk, NewAuditRisk, RiskSeverity, RiskStatus};
use bidaudit_common::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

use super::{parse_column, timestamp};

const RISK_COLUMNS: &str = "id, project_id, rule_code, rule_name, severity, description, \
     suggestion, evidence, status, created_at, updated_at";

/// PUT /projects/:id/risks/:riskId body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskUpdate {
    pub severity: Option<RiskSeverity>,
    pub description: Option<String>,
    pub suggestion: Option<String>,
    pub status: Option<RiskStatus>,
}

fn row_to_risk(row: &MySqlRow) -> Result<AuditRisk> {
    let evidence: Option<String> = row.try_get("evidence")?;

    Ok(AuditRisk {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        rule_code: row.try_get("rule_code")?,
        rule_name: row.try_get("rule_name")?,
        severity: parse_column(row, "severity")?,
        description: row.try_get("description")?,
        suggestion: row.try_get("suggestion")?,
        // Free-form column: unparseable text is surfaced as a JSON string
        evidence: evidence.map(|text| serde_json::from_str(&text).unwrap_or(Value::String(text))),
        status: parse_column(row, "status")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub async fn list_risks(pool: &MySqlPool, project_id: &str) -> Result<Vec<AuditRisk>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM audit_risks WHERE project_id = ? ORDER BY created_at, id",
        RISK_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_risk).collect()
}

pub async fn get_risk(pool: &MySqlPool, project_id: &str, risk_id: i64) -> Result<Option<AuditRisk>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM audit_risks WHERE id = ? AND project_id = ?",
        RISK_COLUMNS
    ))
    .bind(risk_id)
    .bind(project_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_risk).transpose()
}

pub async fn create_risk(pool: &MySqlPool, project_id: &str, new: &NewAuditRisk) -> Result<AuditRisk> {
    if new.rule_code.trim().is_empty() || new.rule_name.trim().is_empty() {
        return Err(Error::InvalidInput("ruleCode and ruleName are required".to_string()));
    }
    let evidence = new.evidence.as_ref().map(serde_json::to_string).transpose()?;

    let result = sqlx::query(
        r#"
        INSERT INTO audit_risks
            (project_id, rule_code, rule_name, severity, description, suggestion, evidence, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(project_id)
    .bind(&new.rule_code)
    .bind(&new.rule_name)
    .bind(new.severity.as_str())
    .bind(new.description.as_deref())
    .bind(new.suggestion.as_deref())
    .bind(evidence)
    .bind(new.status.unwrap_or(RiskStatus::Pending).as_str())
    .execute(pool)
    .await?;

    let id = result.last_insert_id() as i64;
    tracing::info!(project_id, risk_id = id, rule_code = %new.rule_code, "Audit risk recorded");

    get_risk(pool, project_id, id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Risk {} vanished after insert", id)))
}

pub async fn update_risk(
    pool: &MySqlPool,
    project_id: &str,
    risk_id: i64,
    update: &RiskUpdate,
) -> Result<Option<AuditRisk>> {
    sqlx::query(
        r#"
        UPDATE audit_risks
        SET severity = COALESCE(?, severity),
            description = COALESCE(?, description),
            suggestion = COALESCE(?, suggestion),
            status = COALESCE(?, status),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND project_id = ?
        "#,
    )
    .bind(update.severity.map(|s| s.as_str()))
    .bind(update.description.as_deref())
    .bind(update.suggestion.as_deref())
    .bind(update.status.map(|s| s.as_str()))
    .bind(risk_id)
    .bind(project_id)
    .execute(pool)
    .await?;

    get_risk(pool, project_id, risk_id).await
}

pub async fn delete_risk(pool: &MySqlPool, project_id: &str, risk_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM audit_risks WHERE id = ? AND project_id = ?")
        .bind(risk_id)
        .bind(project_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
