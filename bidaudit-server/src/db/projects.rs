//! Project persistence

use bidaudit_common::db::{Project, ProjectStatus};
use bidaudit_common::Result;
use serde::Deserialize;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use uuid::Uuid;

use super::{parse_column, timestamp};

const PROJECT_COLUMNS: &str = "id, name, status, tender_file_id, tender_dataset_id, \
     tender_preview_url, created_at, updated_at";

/// PUT /projects/:id body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub status: Option<ProjectStatus>,
}

fn row_to_project(row: &MySqlRow) -> Result<Project> {
    // Legacy statuses are mapped onto the current lifecycle on read
    let status: ProjectStatus = parse_column(row, "status")?;

    Ok(Project {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        status: status.canonical(),
        tender_file_id: row.try_get("tender_file_id")?,
        tender_dataset_id: row.try_get("tender_dataset_id")?,
        tender_preview_url: row.try_get("tender_preview_url")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub async fn create_project(pool: &MySqlPool, name: &str) -> Result<Project> {
    let id = Uuid::new_v4().to_string();

    sqlx::query("INSERT INTO projects (id, name, status) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(name)
        .bind(ProjectStatus::Uploading.as_str())
        .execute(pool)
        .await?;

    tracing::info!(project_id = %id, name, "Project created");

    get_project(pool, &id)
        .await?
        .ok_or_else(|| bidaudit_common::Error::Internal(format!("Project {} vanished after insert", id)))
}

pub async fn list_projects(pool: &MySqlPool) -> Result<Vec<Project>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM projects ORDER BY created_at DESC, id",
        PROJECT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_project).collect()
}

pub async fn get_project(pool: &MySqlPool, id: &str) -> Result<Option<Project>> {
    let row = sqlx::query(&format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_project).transpose()
}

/// Apply a partial update; `None` when the project does not exist
pub async fn update_project(
    pool: &MySqlPool,
    id: &str,
    update: &ProjectUpdate,
) -> Result<Option<Project>> {
    sqlx::query(
        r#"
        UPDATE projects
        SET name = COALESCE(?, name),
            status = COALESCE(?, status),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(update.name.as_deref())
    .bind(update.status.map(|s| s.as_str()))
    .bind(id)
    .execute(pool)
    .await?;

    get_project(pool, id).await
}

pub async fn set_status(pool: &MySqlPool, id: &str, status: ProjectStatus) -> Result<()> {
    sqlx::query("UPDATE projects SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await?;

    tracing::debug!(project_id = id, status = %status, "Project status updated");
    Ok(())
}

/// Record where the tender document lives on the agent platform
pub async fn set_tender_reference(
    pool: &MySqlPool,
    id: &str,
    file_id: Option<&str>,
    dataset_id: Option<&str>,
    preview_url: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE projects
        SET tender_file_id = COALESCE(?, tender_file_id),
            tender_dataset_id = COALESCE(?, tender_dataset_id),
            tender_preview_url = COALESCE(?, tender_preview_url),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(file_id)
    .bind(dataset_id)
    .bind(preview_url)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete a project; dependent rows go with it through the cascading keys.
pub async fn delete_project(pool: &MySqlPool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    let deleted = result.rows_affected() > 0;
    if deleted {
        tracing::info!(project_id = id, "Project deleted");
    }
    Ok(deleted)
}
