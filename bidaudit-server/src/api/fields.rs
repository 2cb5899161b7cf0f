//! Project field endpoints and tender re-extraction

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use bidaudit_common::db::{FieldStatus, FieldValueInput, ProjectField};
use bidaudit_common::normalizer::Evidence;
use serde::Deserialize;

use super::{ok, require_project, ApiJson};
use crate::db;
use crate::db::fields::BatchReport;
use crate::error::ApiError;
use crate::models::{TaskKind, TaskRecord};
use crate::services::pipeline::{run_tender_reextraction, PipelineTarget};
use crate::AppState;

/// Batch body: `{"fields": [...]}` or a bare array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FieldBatch {
    Wrapped { fields: Vec<FieldValueInput> },
    Bare(Vec<FieldValueInput>),
}

impl FieldBatch {
    pub fn into_inputs(self) -> Vec<FieldValueInput> {
        match self {
            FieldBatch::Wrapped { fields } | FieldBatch::Bare(fields) => fields,
        }
    }
}

/// PUT /projects/:id/fields/:code body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldEdit {
    #[serde(default)]
    pub field_name: Option<String>,
    #[serde(default)]
    pub field_value: Option<String>,
    #[serde(default)]
    pub status: Option<FieldStatus>,
    #[serde(default)]
    pub evidence: Option<Evidence>,
}

/// Hand edits without an explicit status count as `modified`
pub(crate) fn as_user_edit(mut input: FieldValueInput) -> FieldValueInput {
    if input.status.is_none() && input.field_value.is_some() {
        input.status = Some(FieldStatus::Modified);
    }
    input
}

/// GET /projects/:id/fields
pub async fn list_fields(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiJson<Vec<ProjectField>> {
    require_project(&state.db, &project_id).await?;
    ok(db::fields::list_project_fields(&state.db, &project_id).await?)
}

/// PUT /projects/:id/fields (per-item failures are reported, not fatal)
pub async fn save_fields(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(batch): Json<FieldBatch>,
) -> ApiJson<BatchReport> {
    require_project(&state.db, &project_id).await?;
    let inputs: Vec<_> = batch.into_inputs().into_iter().map(as_user_edit).collect();

    let report = db::fields::upsert_project_fields(&state.db, &project_id, &inputs).await;
    tracing::info!(
        project_id = %project_id,
        saved = report.saved,
        failed = report.failed.len(),
        "Project fields saved"
    );
    ok(report)
}

/// PUT /projects/:id/fields/:code
pub async fn save_field(
    State(state): State<AppState>,
    Path((project_id, field_code)): Path<(String, String)>,
    Json(edit): Json<FieldEdit>,
) -> ApiJson<ProjectField> {
    require_project(&state.db, &project_id).await?;

    let input = as_user_edit(FieldValueInput {
        field_code: field_code.clone(),
        field_name: edit.field_name.unwrap_or_default(),
        field_value: edit.field_value,
        status: edit.status,
        evidence: edit.evidence,
    });
    db::fields::upsert_project_field(&state.db, &project_id, &input).await?;

    let field = db::fields::get_project_field(&state.db, &project_id, &field_code)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("Field {} vanished after save", field_code)))?;
    ok(field)
}

/// POST /projects/:id/extract: re-run tender extraction in the background
pub async fn extract_tender(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiJson<TaskRecord> {
    let project = require_project(&state.db, &project_id).await?;
    let tender = db::files::tender_file(&state.db, &project_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest(format!("Project {} has no tender file", project.name)))?;

    let task = state.tasks.create(
        TaskKind::TenderExtraction,
        &project_id,
        Some(&tender.id),
        &tender.file_name,
    );
    let target = PipelineTarget {
        task_id: task.id.clone(),
        project_id,
        file_id: tender.id,
    };
    tokio::spawn(run_tender_reextraction(state.clone(), target));

    ok(task)
}

pub fn field_routes() -> Router<AppState> {
    Router::new()
        .route("/projects/:id/fields", get(list_fields).put(save_fields))
        .route("/projects/:id/fields/:code", put(save_field))
        .route("/projects/:id/extract", post(extract_tender))
}
