//! Background task records shown in the task center

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Tender upload → parse → tender field extraction
    TenderUpload,
    /// Supporting file upload → parse → classify → extract
    FileUpload,
    /// Re-extract tender fields from the stored dataset
    TenderExtraction,
    /// Re-classify / re-extract one supporting file
    FileExtraction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub kind: TaskKind,
    pub project_id: String,
    pub file_id: Option<String>,
    /// Human-readable label, usually the file name
    pub label: String,
    pub status: TaskStatus,
    /// 0-100
    pub progress: u8,
    pub message: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(kind: TaskKind, project_id: &str, file_id: Option<&str>, label: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            project_id: project_id.to_string(),
            file_id: file_id.map(str::to_string),
            label: label.to_string(),
            status: TaskStatus::Pending,
            progress: 0,
            message: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }
}
