//! Supporting file endpoints
//!
//! Uploading a file starts the classify-and-extract pipeline in the
//! background; the response carries the task to follow.

use axum::{
    extract::{Multipart, Path, State},
    routing::{get, post},
    Json, Router,
};
use bidaudit_common::db::{FileField, FileStatus, ProjectFile};
use serde::Serialize;

use super::fields::{as_user_edit, FieldBatch};
use super::{ok, read_upload, require_project, ApiJson};
use crate::db;
use crate::db::fields::BatchReport;
use crate::db::files::{FileUpdate, NewProjectFile};
use crate::error::{ApiError, ApiResult};
use crate::models::{TaskKind, TaskRecord};
use crate::services::pipeline::{run_file_reextraction, run_file_upload, PipelineTarget};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAccepted {
    pub file: ProjectFile,
    pub task: TaskRecord,
}

async fn require_file(state: &AppState, project_id: &str, file_id: &str) -> ApiResult<ProjectFile> {
    db::files::get_file(&state.db, project_id, file_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("File {} not found", file_id)))
}

/// GET /projects/:id/files
pub async fn list_files(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiJson<Vec<ProjectFile>> {
    require_project(&state.db, &project_id).await?;
    ok(db::files::list_files(&state.db, &project_id).await?)
}

/// POST /projects/:id/files (multipart `file`)
pub async fn upload_file(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    multipart: Multipart,
) -> ApiJson<FileAccepted> {
    require_project(&state.db, &project_id).await?;
    let (upload, _) = read_upload(multipart).await?;

    let file = db::files::create_file(
        &state.db,
        &NewProjectFile {
            project_id: project_id.clone(),
            file_name: upload.file_name.clone(),
            mime_type: upload.mime_type.clone(),
            is_tender: false,
        },
    )
    .await?;
    let task = state
        .tasks
        .create(TaskKind::FileUpload, &project_id, Some(&file.id), &file.file_name);

    tracing::info!(
        project_id = %project_id,
        file_id = %file.id,
        file_name = %file.file_name,
        "Supporting file accepted"
    );

    let target = PipelineTarget {
        task_id: task.id.clone(),
        project_id,
        file_id: file.id.clone(),
    };
    tokio::spawn(run_file_upload(state.clone(), target, upload));

    ok(FileAccepted { file, task })
}

/// GET /projects/:id/files/:fileId
pub async fn get_file(
    State(state): State<AppState>,
    Path((project_id, file_id)): Path<(String, String)>,
) -> ApiJson<ProjectFile> {
    ok(require_file(&state, &project_id, &file_id).await?)
}

/// PUT /projects/:id/files/:fileId: manual classification.
///
/// Choosing a document type without a status confirms it; the type name is
/// filled from the catalog when omitted.
pub async fn update_file(
    State(state): State<AppState>,
    Path((project_id, file_id)): Path<(String, String)>,
    Json(mut update): Json<FileUpdate>,
) -> ApiJson<ProjectFile> {
    if let Some(code) = update.doc_type_code.as_deref() {
        if code.trim().is_empty() {
            return Err(ApiError::BadRequest("docTypeCode must not be empty".to_string()));
        }
        if update.doc_type_name.is_none() {
            update.doc_type_name = state.config.catalog.doc_type(code).map(|t| t.name.clone());
        }
        update.status.get_or_insert(FileStatus::Confirmed);
    }

    let file = db::files::update_file(&state.db, &project_id, &file_id, &update)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("File {} not found", file_id)))?;
    ok(file)
}

/// DELETE /projects/:id/files/:fileId
pub async fn delete_file(
    State(state): State<AppState>,
    Path((project_id, file_id)): Path<(String, String)>,
) -> ApiJson<()> {
    if !db::files::delete_file(&state.db, &project_id, &file_id).await? {
        return Err(ApiError::NotFound(format!("File {} not found", file_id)));
    }
    tracing::info!(project_id = %project_id, file_id = %file_id, "File deleted");
    ok(())
}

/// GET /projects/:id/files/:fileId/fields
pub async fn list_file_fields(
    State(state): State<AppState>,
    Path((project_id, file_id)): Path<(String, String)>,
) -> ApiJson<Vec<FileField>> {
    require_file(&state, &project_id, &file_id).await?;
    ok(db::fields::list_file_fields(&state.db, &file_id).await?)
}

/// PUT /projects/:id/files/:fileId/fields
pub async fn save_file_fields(
    State(state): State<AppState>,
    Path((project_id, file_id)): Path<(String, String)>,
    Json(batch): Json<FieldBatch>,
) -> ApiJson<BatchReport> {
    require_file(&state, &project_id, &file_id).await?;
    let inputs: Vec<_> = batch.into_inputs().into_iter().map(as_user_edit).collect();

    ok(db::fields::upsert_file_fields(&state.db, &project_id, &file_id, &inputs).await)
}

/// POST /projects/:id/files/:fileId/extract
pub async fn extract_file(
    State(state): State<AppState>,
    Path((project_id, file_id)): Path<(String, String)>,
) -> ApiJson<TaskRecord> {
    let file = require_file(&state, &project_id, &file_id).await?;
    if file.is_tender {
        return Err(ApiError::BadRequest(
            "Use POST /projects/:id/extract for the tender file".to_string(),
        ));
    }

    let task = state
        .tasks
        .create(TaskKind::FileExtraction, &project_id, Some(&file.id), &file.file_name);
    let target = PipelineTarget {
        task_id: task.id.clone(),
        project_id,
        file_id,
    };
    tokio::spawn(run_file_reextraction(state.clone(), target));

    ok(task)
}

pub fn file_routes() -> Router<AppState> {
    Router::new()
        .route("/projects/:id/files", get(list_files).post(upload_file))
        .route(
            "/projects/:id/files/:file_id",
            get(get_file).put(update_file).delete(delete_file),
        )
        .route(
            "/projects/:id/files/:file_id/fields",
            get(list_file_fields).put(save_file_fields),
        )
        .route("/projects/:id/files/:file_id/extract", post(extract_file))
}
