//! Audit risk endpoints

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use bidaudit_common::db::{AuditRisk, NewAuditRisk};

use super::{ok, require_project, ApiJson};
use crate::db;
use crate::db::risks::RiskUpdate;
use crate::error::ApiError;
use crate::AppState;

/// GET /projects/:id/risks
pub async fn list_risks(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiJson<Vec<AuditRisk>> {
    require_project(&state.db, &project_id).await?;
    ok(db::risks::list_risks(&state.db, &project_id).await?)
}

/// POST /projects/:id/risks
pub async fn create_risk(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(risk): Json<NewAuditRisk>,
) -> ApiJson<AuditRisk> {
    require_project(&state.db, &project_id).await?;
    ok(db::risks::create_risk(&state.db, &project_id, &risk).await?)
}

/// PUT /projects/:id/risks/:riskId
pub async fn update_risk(
    State(state): State<AppState>,
    Path((project_id, risk_id)): Path<(String, i64)>,
    Json(update): Json<RiskUpdate>,
) -> ApiJson<AuditRisk> {
    let risk = db::risks::update_risk(&state.db, &project_id, risk_id, &update)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Risk {} not found", risk_id)))?;
    ok(risk)
}

/// DELETE /projects/:id/risks/:riskId
pub async fn delete_risk(
    State(state): State<AppState>,
    Path((project_id, risk_id)): Path<(String, i64)>,
) -> ApiJson<()> {
    if !db::risks::delete_risk(&state.db, &project_id, risk_id).await? {
        return Err(ApiError::NotFound(format!("Risk {} not found", risk_id)));
    }
    ok(())
}

pub fn risk_routes() -> Router<AppState> {
    Router::new()
        .route("/projects/:id/risks", get(list_risks).post(create_risk))
        .route("/projects/:id/risks/:risk_id", put(update_risk).delete(delete_risk))
}
