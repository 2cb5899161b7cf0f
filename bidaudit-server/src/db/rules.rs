//! Audit rule persistence

use bidaudit_common::db::{AuditRule, NewAuditRule};
use bidaudit_common::{Error, Result};
use serde::Deserialize;
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, Row, Transaction};

use super::{flag, timestamp};

const RULE_COLUMNS: &str = "id, source_id, rule_code, rule_name, description, category, stage, \
     is_enabled, created_at, updated_at";

/// PUT /audit-rules/:id body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    pub rule_code: Option<String>,
    pub rule_name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub stage: Option<String>,
    pub is_enabled: Option<bool>,
}

fn row_to_rule(row: &MySqlRow) -> Result<AuditRule> {
    Ok(AuditRule {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        rule_code: row.try_get("rule_code")?,
        rule_name: row.try_get("rule_name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        stage: row.try_get("stage")?,
        is_enabled: flag(row, "is_enabled")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

/// Report a duplicate `rule_code` as `AlreadyExists`
fn duplicate_aware(err: Error, rule_code: &str) -> Error {
    match err {
        Error::Database(db_err) => Error::from_db(db_err, &format!("Audit rule {}", rule_code)),
        other => other,
    }
}

fn validate(rule: &NewAuditRule) -> Result<()> {
    if rule.rule_code.trim().is_empty() {
        return Err(Error::InvalidInput("ruleCode is required".to_string()));
    }
    if rule.rule_name.trim().is_empty() {
        return Err(Error::InvalidInput("ruleName is required".to_string()));
    }
    Ok(())
}

pub async fn list_rules(pool: &MySqlPool, enabled_only: bool) -> Result<Vec<AuditRule>> {
    let sql = if enabled_only {
        format!("SELECT {} FROM audit_rules WHERE is_enabled = 1 ORDER BY id", RULE_COLUMNS)
    } else {
        format!("SELECT {} FROM audit_rules ORDER BY id", RULE_COLUMNS)
    };
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    rows.iter().map(row_to_rule).collect()
}

pub async fn get_rule(pool: &MySqlPool, id: i64) -> Result<Option<AuditRule>> {
    let row = sqlx::query(&format!("SELECT {} FROM audit_rules WHERE id = ?", RULE_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_rule).transpose()
}

/// Rules with the given ids, in the order requested; unknown ids are skipped
pub async fn get_rules(pool: &MySqlPool, ids: &[i64]) -> Result<Vec<AuditRule>> {
    let mut rules = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(rule) = get_rule(pool, *id).await? {
            rules.push(rule);
        }
    }
    Ok(rules)
}

pub async fn create_rule(pool: &MySqlPool, rule: &NewAuditRule) -> Result<AuditRule> {
    validate(rule)?;

    let id = insert_rule(pool, rule)
        .await
        .map_err(|e| duplicate_aware(e, &rule.rule_code))? as i64;
    tracing::info!(rule_id = id, rule_code = %rule.rule_code, "Audit rule created");

    get_rule(pool, id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Rule {} vanished after insert", id)))
}

async fn insert_rule<'e, E>(executor: E, rule: &NewAuditRule) -> Result<u64>
where
    E: sqlx::Executor<'e, Database = MySql>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO audit_rules
            (source_id, rule_code, rule_name, description, category, stage, is_enabled)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(rule.source_id.as_deref())
    .bind(rule.rule_code.trim())
    .bind(rule.rule_name.trim())
    .bind(rule.description.as_deref())
    .bind(rule.category.as_deref())
    .bind(rule.stage.as_deref())
    .bind(rule.is_enabled)
    .execute(executor)
    .await?;

    Ok(result.last_insert_id())
}

pub async fn update_rule(pool: &MySqlPool, id: i64, update: &RuleUpdate) -> Result<Option<AuditRule>> {
    let blank = |v: &Option<String>| v.as_deref().is_some_and(|s| s.trim().is_empty());
    if blank(&update.rule_code) || blank(&update.rule_name) {
        return Err(Error::InvalidInput("ruleCode and ruleName must not be empty".to_string()));
    }

    sqlx::query(
        r#"
        UPDATE audit_rules
        SET rule_code = COALESCE(?, rule_code),
            rule_name = COALESCE(?, rule_name),
            description = COALESCE(?, description),
            category = COALESCE(?, category),
            stage = COALESCE(?, stage),
            is_enabled = COALESCE(?, is_enabled),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(update.rule_code.as_deref().map(str::trim))
    .bind(update.rule_name.as_deref().map(str::trim))
    .bind(update.description.as_deref())
    .bind(update.category.as_deref())
    .bind(update.stage.as_deref())
    .bind(update.is_enabled)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| {
        Error::from_db(e, &format!("Audit rule {}", update.rule_code.as_deref().unwrap_or_default()))
    })?;

    get_rule(pool, id).await
}

pub async fn delete_rule(pool: &MySqlPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM audit_rules WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Replace the whole rule table inside one transaction.
///
/// Rules arrive as mapping results so a malformed entry surfaces after the
/// delete has run; any error rolls the transaction back and the previous
/// rule set stays intact.
pub async fn replace_all<I>(pool: &MySqlPool, rules: I) -> Result<usize>
where
    I: IntoIterator<Item = Result<NewAuditRule>>,
{
    let mut tx: Transaction<'_, MySql> = pool.begin().await?;

    match replace_in(&mut tx, rules).await {
        Ok(inserted) => {
            tx.commit().await?;
            tracing::info!(inserted, "Audit rules replaced");
            Ok(inserted)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(error = %rollback_err, "Rule sync rollback failed");
            }
            tracing::warn!(error = %e, "Rule sync rolled back, previous rules kept");
            Err(e)
        }
    }
}

async fn replace_in<I>(tx: &mut Transaction<'_, MySql>, rules: I) -> Result<usize>
where
    I: IntoIterator<Item = Result<NewAuditRule>>,
{
    let deleted = sqlx::query("DELETE FROM audit_rules")
        .execute(&mut **tx)
        .await?
        .rows_affected();
    tracing::debug!(deleted, "Cleared audit rules");

    let mut inserted = 0;
    for rule in rules {
        let rule = rule?;
        validate(&rule)?;
        insert_rule(&mut **tx, &rule)
            .await
            .map_err(|e| duplicate_aware(e, &rule.rule_code))?;
        inserted += 1;
    }
    Ok(inserted)
}
