//! HTTP API handlers for bidaudit-server
//!
//! All responses use the `{code, data?, message?}` envelope.

pub mod audit;
pub mod audit_rules;
pub mod fields;
pub mod files;
pub mod health;
pub mod projects;
pub mod risks;
pub mod tasks;

pub use audit::audit_routes;
pub use audit_rules::audit_rule_routes;
pub use fields::field_routes;
pub use files::file_routes;
pub use health::health_routes;
pub use projects::project_routes;
pub use risks::risk_routes;
pub use tasks::task_routes;

use axum::extract::Multipart;
use axum::{Json, Router};
use bidaudit_common::api::ApiResponse;
use bidaudit_common::db::Project;
use sqlx::MySqlPool;
use std::collections::HashMap;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::pipeline::Upload;
use crate::AppState;

/// Successful handler result wrapped in the envelope
pub type ApiJson<T> = ApiResult<Json<ApiResponse<T>>>;

pub(crate) fn ok<T>(data: T) -> ApiJson<T> {
    Ok(Json(ApiResponse::ok(data)))
}

/// All `/api/app` routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health_routes())
        .merge(audit_rule_routes())
        .merge(project_routes())
        .merge(field_routes())
        .merge(file_routes())
        .merge(risk_routes())
        .merge(audit_routes())
        .merge(task_routes())
}

/// Load a project or fail with 404
pub(crate) async fn require_project(pool: &MySqlPool, project_id: &str) -> ApiResult<Project> {
    db::projects::get_project(pool, project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Project {} not found", project_id)))
}

/// Read a multipart body: the `file` part plus any text parts
pub(crate) async fn read_upload(
    mut multipart: Multipart,
) -> ApiResult<(Upload, HashMap<String, String>)> {
    let mut upload = None;
    let mut fields = HashMap::new();

    while let Some(part) = multipart.next_field().await? {
        let name = part.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = part
                .file_name()
                .map(str::to_string)
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| ApiError::BadRequest("Uploaded file has no name".to_string()))?;
            let mime_type = part.content_type().map(str::to_string);
            let bytes = part.bytes().await?.to_vec();
            if bytes.is_empty() {
                return Err(ApiError::BadRequest(format!("{} is empty", file_name)));
            }
            upload = Some(Upload {
                file_name,
                mime_type,
                bytes,
            });
        } else {
            fields.insert(name, part.text().await?);
        }
    }

    let upload = upload.ok_or_else(|| ApiError::BadRequest("file is required".to_string()))?;
    Ok((upload, fields))
}
