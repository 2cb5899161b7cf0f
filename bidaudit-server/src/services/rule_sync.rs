//! Audit rule synchronization from the data hub
//!
//! The remote list replaces the local table wholesale inside one
//! transaction. A rule that cannot be mapped aborts the sync and the
//! previous rules stay in place.

use bidaudit_common::db::NewAuditRule;
use bidaudit_common::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use sqlx::MySqlPool;

use crate::db;
use crate::error::ApiResult;
use crate::services::data_hub_client::DataHubClient;

const ENABLED_WORDS: &[&str] = &["1", "true", "enabled", "enable", "active", "启用", "有效"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub fetched: usize,
    pub inserted: usize,
}

fn text(rule: &Value, key: &str) -> Option<String> {
    match rule.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_enabled(status: Option<&Value>) -> bool {
    match status {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::String(s)) => {
            let lowered = s.trim().to_lowercase();
            ENABLED_WORDS.contains(&lowered.as_str())
        }
        _ => false,
    }
}

/// Map one data hub rule onto the local shape.
///
/// `id → source_id`, `ruleCode → rule_code`, `ruleName → rule_name`
/// (falling back to the code), `problemDesc → description`,
/// `auditType → category`, `phase → stage`, `status → is_enabled`.
pub fn map_rule(rule: &Value) -> Result<NewAuditRule> {
    let rule_code = text(rule, "ruleCode").ok_or_else(|| {
        Error::InvalidInput(format!("Data hub rule without ruleCode: {}", rule))
    })?;

    Ok(NewAuditRule {
        source_id: text(rule, "id"),
        rule_name: text(rule, "ruleName").unwrap_or_else(|| rule_code.clone()),
        rule_code,
        description: text(rule, "problemDesc"),
        category: text(rule, "auditType"),
        stage: text(rule, "phase"),
        is_enabled: is_enabled(rule.get("status")),
    })
}

/// Fetch the remote rule list and replace the local table with it
pub async fn sync_rules(pool: &MySqlPool, client: &DataHubClient) -> ApiResult<SyncSummary> {
    let remote = client.fetch_rules().await?;
    let fetched = remote.len();

    let inserted = db::rules::replace_all(pool, remote.iter().map(map_rule)).await?;
    tracing::info!(fetched, inserted, "Audit rules synchronized");

    Ok(SyncSummary { fetched, inserted })
}
