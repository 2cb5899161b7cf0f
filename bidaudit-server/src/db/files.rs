//! Project file persistence

use bidaudit_common::db::{ExtractionStatus, FileStatus, ProjectFile};
use bidaudit_common::{Error, Result};
use serde::Deserialize;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use uuid::Uuid;

use super::{flag, parse_column, timestamp};

const FILE_COLUMNS: &str = "id, project_id, file_name, mime_type, agent_file_id, dataset_id, \
     preview_url, is_tender, doc_type_code, doc_type_name, status, extraction_status, \
     error_message, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct NewProjectFile {
    pub project_id: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub is_tender: bool,
}

/// PUT /projects/:id/files/:fileId body (manual classification)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpdate {
    pub doc_type_code: Option<String>,
    pub doc_type_name: Option<String>,
    pub status: Option<FileStatus>,
}

fn row_to_file(row: &MySqlRow) -> Result<ProjectFile> {
    Ok(ProjectFile {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        file_name: row.try_get("file_name")?,
        mime_type: row.try_get("mime_type")?,
        agent_file_id: row.try_get("agent_file_id")?,
        dataset_id: row.try_get("dataset_id")?,
        preview_url: row.try_get("preview_url")?,
        is_tender: flag(row, "is_tender")?,
        doc_type_code: row.try_get("doc_type_code")?,
        doc_type_name: row.try_get("doc_type_name")?,
        status: parse_column(row, "status")?,
        extraction_status: parse_column(row, "extraction_status")?,
        error_message: row.try_get("error_message")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub async fn create_file(pool: &MySqlPool, new: &NewProjectFile) -> Result<ProjectFile> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO project_files
            (id, project_id, file_name, mime_type, is_tender, status, extraction_status)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&new.project_id)
    .bind(&new.file_name)
    .bind(new.mime_type.as_deref())
    .bind(new.is_tender)
    .bind(FileStatus::Pending.as_str())
    .bind(ExtractionStatus::Pending.as_str())
    .execute(pool)
    .await?;

    tracing::info!(
        project_id = %new.project_id,
        file_id = %id,
        file_name = %new.file_name,
        is_tender = new.is_tender,
        "Project file registered"
    );

    get_file_by_id(pool, &id)
        .await?
        .ok_or_else(|| Error::Internal(format!("File {} vanished after insert", id)))
}

pub async fn list_files(pool: &MySqlPool, project_id: &str) -> Result<Vec<ProjectFile>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM project_files WHERE project_id = ? ORDER BY is_tender DESC, created_at, id",
        FILE_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_file).collect()
}

pub async fn get_file_by_id(pool: &MySqlPool, file_id: &str) -> Result<Option<ProjectFile>> {
    let row = sqlx::query(&format!("SELECT {} FROM project_files WHERE id = ?", FILE_COLUMNS))
        .bind(file_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_file).transpose()
}

/// Fetch a file only if it belongs to `project_id`
pub async fn get_file(
    pool: &MySqlPool,
    project_id: &str,
    file_id: &str,
) -> Result<Option<ProjectFile>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM project_files WHERE id = ? AND project_id = ?",
        FILE_COLUMNS
    ))
    .bind(file_id)
    .bind(project_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_file).transpose()
}

/// Most recent tender file of a project
pub async fn tender_file(pool: &MySqlPool, project_id: &str) -> Result<Option<ProjectFile>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM project_files WHERE project_id = ? AND is_tender = 1 \
         ORDER BY created_at DESC LIMIT 1",
        FILE_COLUMNS
    ))
    .bind(project_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_file).transpose()
}

pub async fn update_file(
    pool: &MySqlPool,
    project_id: &str,
    file_id: &str,
    update: &FileUpdate,
) -> Result<Option<ProjectFile>> {
    sqlx::query(
        r#"
        UPDATE project_files
        SET doc_type_code = COALESCE(?, doc_type_code),
            doc_type_name = COALESCE(?, doc_type_name),
            status = COALESCE(?, status),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND project_id = ?
        "#,
    )
    .bind(update.doc_type_code.as_deref())
    .bind(update.doc_type_name.as_deref())
    .bind(update.status.map(|s| s.as_str()))
    .bind(file_id)
    .bind(project_id)
    .execute(pool)
    .await?;

    get_file(pool, project_id, file_id).await
}

/// Record the agent platform file id / URL after upload
pub async fn set_agent_reference(
    pool: &MySqlPool,
    file_id: &str,
    agent_file_id: Option<&str>,
    preview_url: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE project_files
        SET agent_file_id = ?, preview_url = ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(agent_file_id)
    .bind(preview_url)
    .bind(file_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_dataset(pool: &MySqlPool, file_id: &str, dataset_id: &str) -> Result<()> {
    sqlx::query(
        "UPDATE project_files SET dataset_id = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(dataset_id)
    .bind(file_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_classification(
    pool: &MySqlPool,
    file_id: &str,
    doc_type_code: &str,
    doc_type_name: &str,
    status: FileStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE project_files
        SET doc_type_code = ?, doc_type_name = ?, status = ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(doc_type_code)
    .bind(doc_type_name)
    .bind(status.as_str())
    .bind(file_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Update the extraction state; `error` is stored only for `Failed`
pub async fn set_extraction_status(
    pool: &MySqlPool,
    file_id: &str,
    status: ExtractionStatus,
    error: Option<&str>,
) -> Result<()> {
    let error = if status == ExtractionStatus::Failed { error } else { None };

    sqlx::query(
        r#"
        UPDATE project_files
        SET extraction_status = ?, error_message = ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(error)
    .bind(file_id)
    .execute(pool)
    .await?;

    tracing::debug!(file_id, status = %status, "File extraction status updated");
    Ok(())
}

pub async fn delete_file(pool: &MySqlPool, project_id: &str, file_id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM project_files WHERE id = ? AND project_id = ?")
        .bind(file_id)
        .bind(project_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
