//! Audit rule endpoints, including data hub synchronization

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use bidaudit_common::db::{AuditRule, NewAuditRule};
use serde::Deserialize;

use super::{ok, ApiJson};
use crate::db;
use crate::db::rules::RuleUpdate;
use crate::error::ApiError;
use crate::services::data_hub_client::DataHubClient;
use crate::services::rule_sync::{sync_rules, SyncSummary};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleQuery {
    #[serde(default)]
    pub enabled_only: bool,
}

/// GET /audit-rules?enabledOnly=true
pub async fn list_rules(
    State(state): State<AppState>,
    Query(query): Query<RuleQuery>,
) -> ApiJson<Vec<AuditRule>> {
    ok(db::rules::list_rules(&state.db, query.enabled_only).await?)
}

/// POST /audit-rules (local rule; duplicate codes are rejected)
pub async fn create_rule(
    State(state): State<AppState>,
    Json(rule): Json<NewAuditRule>,
) -> ApiJson<AuditRule> {
    ok(db::rules::create_rule(&state.db, &rule).await?)
}

/// GET /audit-rules/:id
pub async fn get_rule(State(state): State<AppState>, Path(id): Path<i64>) -> ApiJson<AuditRule> {
    let rule = db::rules::get_rule(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Audit rule {} not found", id)))?;
    ok(rule)
}

/// PUT /audit-rules/:id
pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<RuleUpdate>,
) -> ApiJson<AuditRule> {
    let rule = db::rules::update_rule(&state.db, id, &update)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Audit rule {} not found", id)))?;
    ok(rule)
}

/// DELETE /audit-rules/:id
pub async fn delete_rule(State(state): State<AppState>, Path(id): Path<i64>) -> ApiJson<()> {
    if !db::rules::delete_rule(&state.db, id).await? {
        return Err(ApiError::NotFound(format!("Audit rule {} not found", id)));
    }
    ok(())
}

/// POST /audit-rules/sync: replace local rules with the data hub list.
///
/// The client is built per request so a missing host or token fails before
/// anything is fetched or deleted.
pub async fn sync(State(state): State<AppState>) -> ApiJson<SyncSummary> {
    let client = DataHubClient::new(&state.config.data_hub)?;
    let summary = sync_rules(&state.db, &client).await?;
    Ok(Json(bidaudit_common::api::ApiResponse::ok_with_message(
        summary,
        format!("Synchronized {} rules", summary.inserted),
    )))
}

pub fn audit_rule_routes() -> Router<AppState> {
    Router::new()
        .route("/audit-rules", get(list_rules).post(create_rule))
        .route("/audit-rules/sync", post(sync))
        .route(
            "/audit-rules/:id",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
}
