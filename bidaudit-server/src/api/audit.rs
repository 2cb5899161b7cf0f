//! Audit session endpoints and the progress event stream

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use bidaudit_common::api::ApiResponse;
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use super::{ok, require_project, ApiJson};
use crate::db;
use crate::error::ApiError;
use crate::models::AuditSession;
use crate::services::audit_orchestrator::{
    collect_items, risk_from_verdict, run_project_audit, ConfirmOutcome,
};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAuditRequest {
    /// Rules to run; all enabled rules when absent or empty
    #[serde(default)]
    pub rule_ids: Vec<i64>,
    /// Other projects whose values are reviewed alongside this one
    #[serde(default)]
    pub related_project_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub rule_code: String,
}

/// POST /projects/:id/audit/start
///
/// Starting while a run is in progress returns the running session unchanged.
pub async fn start_audit(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    body: Option<Json<StartAuditRequest>>,
) -> ApiJson<Option<AuditSession>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    require_project(&state.db, &project_id).await?;

    if state.audit.is_running(&project_id).await {
        let session = state.audit.session(&project_id).await;
        return Ok(Json(ApiResponse::ok_with_message(session, "Audit already running")));
    }

    let rules = if request.rule_ids.is_empty() {
        db::rules::list_rules(&state.db, true).await?
    } else {
        db::rules::get_rules(&state.db, &request.rule_ids).await?
    };
    if rules.is_empty() {
        return Err(ApiError::BadRequest("No audit rules selected".to_string()));
    }
    let items = collect_items(&state.db, &project_id, &request.related_project_ids).await?;

    if state.audit.begin(&project_id, &rules).await {
        tracing::info!(
            project_id = %project_id,
            rules = rules.len(),
            items = items.len(),
            "Starting audit"
        );
        tokio::spawn(run_project_audit(
            state.db.clone(),
            state.audit.clone(),
            project_id.clone(),
            rules,
            items,
        ));
    }

    ok(state.audit.session(&project_id).await)
}

/// GET /projects/:id/audit/session
pub async fn get_session(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiJson<AuditSession> {
    let session = state
        .audit
        .session(&project_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No audit session for project {}", project_id)))?;
    ok(session)
}

/// POST /projects/:id/audit/confirm
pub async fn confirm(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(request): Json<ConfirmRequest>,
) -> ApiJson<ConfirmOutcome> {
    if request.rule_code.trim().is_empty() {
        return Err(ApiError::BadRequest("ruleCode is required".to_string()));
    }

    let pool = state.db.clone();
    let owner = project_id.clone();
    let outcome = state
        .audit
        .confirm(&project_id, &request.rule_code, move |verdict| async move {
            db::risks::create_risk(&pool, &owner, &risk_from_verdict(&verdict))
                .await
                .map(|_| ())
        })
        .await?;
    ok(outcome)
}

/// GET /projects/:id/audit/events: SSE stream of this project's audit events
pub async fn audit_event_stream(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!(project_id = %project_id, "SSE client connected to audit events");

    let mut rx = state.audit.subscribe();
    let snapshot = state.audit.session(&project_id).await;

    let stream = async_stream::stream! {
        // Current state first so late subscribers can render immediately
        if let Some(session) = snapshot {
            match serde_json::to_string(&session) {
                Ok(json) => yield Ok(Event::default().event("audit_session").data(json)),
                Err(e) => tracing::warn!("SSE: Failed to serialize session: {}", e),
            }
        }

        loop {
            match rx.recv().await {
                Ok(event) if event.project_id() == project_id => {
                    match serde_json::to_string(&event) {
                        Ok(json) => yield Ok(Event::default().event(event.event_type()).data(json)),
                        Err(e) => tracing::warn!("SSE: Failed to serialize event {}: {}", event.event_type(), e),
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "SSE: audit subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

pub fn audit_routes() -> Router<AppState> {
    Router::new()
        .route("/projects/:id/audit/start", post(start_audit))
        .route("/projects/:id/audit/session", get(get_session))
        .route("/projects/:id/audit/confirm", post(confirm))
        .route("/projects/:id/audit/events", get(audit_event_stream))
}
