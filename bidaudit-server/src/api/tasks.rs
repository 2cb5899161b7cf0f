//! Task center endpoints

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};
use serde::Deserialize;

use super::{ok, ApiJson};
use crate::error::ApiError;
use crate::models::TaskRecord;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQuery {
    pub project_id: Option<String>,
}

/// GET /tasks?projectId=..., newest first
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskQuery>,
) -> ApiJson<Vec<TaskRecord>> {
    let tasks = state
        .tasks
        .list()
        .into_iter()
        .filter(|t| query.project_id.as_deref().map_or(true, |p| t.project_id == p))
        .collect();
    ok(tasks)
}

/// GET /tasks/:id
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiJson<TaskRecord> {
    let task = state
        .tasks
        .get(&task_id)
        .ok_or_else(|| ApiError::NotFound(format!("Task {} not found", task_id)))?;
    ok(task)
}

/// DELETE /tasks/:id: forget the task; running work is not interrupted
pub async fn remove_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiJson<()> {
    if !state.tasks.remove(&task_id) {
        return Err(ApiError::NotFound(format!("Task {} not found", task_id)));
    }
    ok(())
}

pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks))
        .route("/tasks/:id", get(get_task).delete(remove_task))
}
