//! Project endpoints
//!
//! `POST /projects/upload` creates a project from a tender document and
//! starts the tender pipeline in the background.

use axum::{
    extract::{Multipart, Path, State},
    routing::{get, post},
    Json, Router,
};
use bidaudit_common::db::{Project, ProjectFile};
use serde::{Deserialize, Serialize};

use super::{ok, read_upload, require_project, ApiJson};
use crate::db;
use crate::db::files::NewProjectFile;
use crate::db::projects::ProjectUpdate;
use crate::error::ApiError;
use crate::models::{TaskKind, TaskRecord};
use crate::services::pipeline::{run_tender_upload, PipelineTarget};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

/// Result of a tender upload: everything the client needs to follow progress
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAccepted {
    pub project: Project,
    pub file: ProjectFile,
    pub task: TaskRecord,
}

/// Project name from the file name without its extension
fn name_from_file(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
        .to_string()
}

/// GET /projects
pub async fn list_projects(State(state): State<AppState>) -> ApiJson<Vec<Project>> {
    ok(db::projects::list_projects(&state.db).await?)
}

/// POST /projects
pub async fn create_project(
    State(state): State<AppState>,
    Json(request): Json<CreateProjectRequest>,
) -> ApiJson<Project> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }
    ok(db::projects::create_project(&state.db, name).await?)
}

/// POST /projects/upload (multipart: `file`, optional `name`)
pub async fn upload_tender(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiJson<UploadAccepted> {
    let (upload, fields) = read_upload(multipart).await?;
    let name = fields
        .get("name")
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| name_from_file(&upload.file_name));

    let project = db::projects::create_project(&state.db, &name).await?;
    let file = db::files::create_file(
        &state.db,
        &NewProjectFile {
            project_id: project.id.clone(),
            file_name: upload.file_name.clone(),
            mime_type: upload.mime_type.clone(),
            is_tender: true,
        },
    )
    .await?;
    let task = state
        .tasks
        .create(TaskKind::TenderUpload, &project.id, Some(&file.id), &file.file_name);

    tracing::info!(
        project_id = %project.id,
        file_name = %file.file_name,
        size = upload.bytes.len(),
        "Tender upload accepted"
    );

    let target = PipelineTarget {
        task_id: task.id.clone(),
        project_id: project.id.clone(),
        file_id: file.id.clone(),
    };
    tokio::spawn(run_tender_upload(state.clone(), target, upload));

    ok(UploadAccepted {
        project,
        file,
        task,
    })
}

/// GET /projects/:id
pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiJson<Project> {
    ok(require_project(&state.db, &project_id).await?)
}

/// PUT /projects/:id
pub async fn update_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(update): Json<ProjectUpdate>,
) -> ApiJson<Project> {
    if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let project = db::projects::update_project(&state.db, &project_id, &update)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Project {} not found", project_id)))?;
    ok(project)
}

/// DELETE /projects/:id (cascades to files, fields and risks)
pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiJson<()> {
    if !db::projects::delete_project(&state.db, &project_id).await? {
        return Err(ApiError::NotFound(format!("Project {} not found", project_id)));
    }
    state.audit.forget(&project_id).await;
    tracing::info!(project_id = %project_id, "Project deleted");
    ok(())
}

pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/upload", post(upload_tender))
        .route(
            "/projects/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_from_file() {
        assert_eq!(name_from_file("某某项目招标文件.pdf"), "某某项目招标文件");
        assert_eq!(name_from_file("noext"), "noext");
    }
}
