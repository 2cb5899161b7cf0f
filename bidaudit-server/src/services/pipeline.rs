//! Background document pipelines
//!
//! Stage order:
//! - Tender upload: upload → dataset → wait for parse → extract tender fields
//! - Supporting file upload: upload → dataset → wait → classify → extract
//! - Re-extraction: reuse the stored file/dataset reference, skip the upload
//!
//! Each pipeline runs in its own tokio task and reports through the task
//! center. A failing stage marks the file's extraction `failed` with the
//! error message and fails the task; nothing is swallowed.

use bidaudit_common::catalog::FieldSpec;
use bidaudit_common::db::{ExtractionStatus, FileStatus, ProjectFile, ProjectStatus};

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::agent_gateway::{
    wait_for_dataset, AgentKind, DatasetPolling, DatasetStatus, FileRef,
};
use crate::services::classification::classify;
use crate::services::extraction::{extract_fields, extraction_agent};
use crate::AppState;

/// Uploaded document bytes awaiting processing
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Ids of the records a pipeline works on
#[derive(Debug, Clone)]
pub struct PipelineTarget {
    pub task_id: String,
    pub project_id: String,
    pub file_id: String,
}

/// Map dataset parse progress into the 20-60 band of the task
fn parse_progress(status: &DatasetStatus) -> u8 {
    20 + status.percent().unwrap_or(0) * 2 / 5
}

fn document_ref(file: &ProjectFile) -> FileRef {
    FileRef {
        file_id: file.agent_file_id.clone(),
        url: file.preview_url.clone(),
        dataset_id: file.dataset_id.clone(),
    }
}

/// Upload → dataset → parse wait. Returns the reference used for chat calls.
async fn ingest(
    state: &AppState,
    target: &PipelineTarget,
    kind: AgentKind,
    upload: Upload,
) -> ApiResult<FileRef> {
    let tasks = &state.tasks;
    tasks.start(&target.task_id, "上传文件");
    db::files::set_extraction_status(&state.db, &target.file_id, ExtractionStatus::Processing, None)
        .await?;

    let file_name = upload.file_name.clone();
    let uploaded = state
        .agent
        .upload_file(kind, &file_name, upload.mime_type.as_deref(), upload.bytes)
        .await?;
    db::files::set_agent_reference(
        &state.db,
        &target.file_id,
        uploaded.file_id.as_deref(),
        uploaded.url.as_deref(),
    )
    .await?;
    tasks.progress(&target.task_id, 10, "创建知识库");

    let mut document = FileRef {
        file_id: uploaded.file_id.clone(),
        url: uploaded.url.clone(),
        dataset_id: None,
    };

    // URL-only uploads cannot be indexed; chat calls get the URL instead
    if let Some(agent_file_id) = uploaded.file_id {
        let dataset_id = state
            .agent
            .create_dataset(kind, &file_name, &[agent_file_id])
            .await?;
        db::files::set_dataset(&state.db, &target.file_id, &dataset_id).await?;
        tasks.progress(&target.task_id, 20, "解析文档");

        let polling = DatasetPolling::from_config(&state.config.agent);
        wait_for_dataset(state.agent.as_ref(), kind, &dataset_id, &polling, |status| {
            tasks.progress(&target.task_id, parse_progress(status), "解析文档");
        })
        .await?;
        document.dataset_id = Some(dataset_id);
    }

    Ok(document)
}

async fn extract_tender(
    state: &AppState,
    target: &PipelineTarget,
    kind: AgentKind,
    file_name: &str,
    document: &FileRef,
) -> ApiResult<usize> {
    db::projects::set_status(&state.db, &target.project_id, ProjectStatus::Extracting).await?;
    state.tasks.progress(&target.task_id, 60, "提取招标字段");

    let fields = &state.config.catalog.tender_fields;
    let values = extract_fields(state.agent.as_ref(), kind, fields, file_name, document).await;
    let report = db::fields::upsert_project_fields(&state.db, &target.project_id, &values).await;
    if !report.failed.is_empty() {
        tracing::warn!(
            project_id = %target.project_id,
            failed = report.failed.len(),
            "Some tender fields could not be saved"
        );
    }

    db::files::set_extraction_status(&state.db, &target.file_id, ExtractionStatus::Completed, None)
        .await?;
    db::projects::set_status(&state.db, &target.project_id, ProjectStatus::Completed).await?;
    Ok(report.saved)
}

/// Classify (unless already confirmed by the user) then extract the doc type's fields
async fn classify_and_extract(
    state: &AppState,
    target: &PipelineTarget,
    file: &ProjectFile,
    kind: AgentKind,
    document: &FileRef,
) -> ApiResult<usize> {
    let catalog = &state.config.catalog;

    let doc_type_code = match (&file.doc_type_code, file.status) {
        (Some(code), FileStatus::Confirmed) => code.clone(),
        _ => {
            state.tasks.progress(&target.task_id, 60, "识别文档类型");
            let classification =
                classify(state.agent.as_ref(), catalog, &file.file_name, document).await?;
            db::files::set_classification(
                &state.db,
                &target.file_id,
                &classification.code,
                &classification.name,
                FileStatus::Classified,
            )
            .await?;
            classification.code
        }
    };

    let fields: &[FieldSpec] = catalog
        .doc_type(&doc_type_code)
        .map(|t| t.fields.as_slice())
        .unwrap_or_default();
    state.tasks.progress(&target.task_id, 75, "提取文档字段");

    let values = extract_fields(state.agent.as_ref(), kind, fields, &file.file_name, document).await;
    let report = db::fields::upsert_file_fields(
        &state.db,
        &target.project_id,
        &target.file_id,
        &values,
    )
    .await;
    if !report.failed.is_empty() {
        tracing::warn!(
            file_id = %target.file_id,
            failed = report.failed.len(),
            "Some file fields could not be saved"
        );
    }

    db::files::set_extraction_status(&state.db, &target.file_id, ExtractionStatus::Completed, None)
        .await?;
    Ok(report.saved)
}

async fn load_file(state: &AppState, target: &PipelineTarget) -> ApiResult<ProjectFile> {
    db::files::get_file(&state.db, &target.project_id, &target.file_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("File {} not found", target.file_id)))
}

/// Record the outcome of a pipeline on the task and the file
async fn finish(state: &AppState, target: &PipelineTarget, result: ApiResult<usize>) {
    match result {
        Ok(saved) => {
            state
                .tasks
                .complete(&target.task_id, &format!("已提取 {} 个字段", saved));
            tracing::info!(
                task_id = %target.task_id,
                file_id = %target.file_id,
                saved,
                "Document pipeline completed"
            );
        }
        Err(e) => {
            let message = e.to_string();
            tracing::error!(
                task_id = %target.task_id,
                file_id = %target.file_id,
                error = %message,
                "Document pipeline failed"
            );
            if let Err(db_err) = db::files::set_extraction_status(
                &state.db,
                &target.file_id,
                ExtractionStatus::Failed,
                Some(&message),
            )
            .await
            {
                tracing::error!(file_id = %target.file_id, error = %db_err, "Failed to record extraction failure");
            }
            state.tasks.fail(&target.task_id, &message);
            *state.last_error.write().await = Some(message);
        }
    }
}

async fn tender_upload(state: &AppState, target: &PipelineTarget, upload: Upload) -> ApiResult<usize> {
    let kind = extraction_agent(&upload.file_name, upload.mime_type.as_deref());
    let file_name = upload.file_name.clone();
    let document = ingest(state, target, kind, upload).await?;
    db::projects::set_tender_reference(
        &state.db,
        &target.project_id,
        document.file_id.as_deref(),
        document.dataset_id.as_deref(),
        document.url.as_deref(),
    )
    .await?;
    extract_tender(state, target, kind, &file_name, &document).await
}

async fn file_upload(state: &AppState, target: &PipelineTarget, upload: Upload) -> ApiResult<usize> {
    let kind = extraction_agent(&upload.file_name, upload.mime_type.as_deref());
    let document = ingest(state, target, kind, upload).await?;
    let file = load_file(state, target).await?;
    classify_and_extract(state, target, &file, kind, &document).await
}

/// Stored file plus its agent reference, for re-extraction
async fn stored_document(
    state: &AppState,
    target: &PipelineTarget,
) -> ApiResult<(ProjectFile, FileRef)> {
    let file = load_file(state, target).await?;
    let document = document_ref(&file);
    if document.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "File {} has not been uploaded to the agent platform",
            file.file_name
        )));
    }
    db::files::set_extraction_status(&state.db, &file.id, ExtractionStatus::Processing, None)
        .await?;
    Ok((file, document))
}

async fn tender_reextraction(state: &AppState, target: &PipelineTarget) -> ApiResult<usize> {
    state.tasks.start(&target.task_id, "重新提取招标字段");
    let (file, document) = stored_document(state, target).await?;
    let kind = extraction_agent(&file.file_name, file.mime_type.as_deref());
    extract_tender(state, target, kind, &file.file_name, &document).await
}

async fn file_reextraction(state: &AppState, target: &PipelineTarget) -> ApiResult<usize> {
    state.tasks.start(&target.task_id, "重新提取文档字段");
    let (file, document) = stored_document(state, target).await?;
    let kind = extraction_agent(&file.file_name, file.mime_type.as_deref());
    classify_and_extract(state, target, &file, kind, &document).await
}

/// Tender upload pipeline
pub async fn run_tender_upload(state: AppState, target: PipelineTarget, upload: Upload) {
    let result = tender_upload(&state, &target, upload).await;
    finish(&state, &target, result).await;
}

/// Supporting file upload pipeline
pub async fn run_file_upload(state: AppState, target: PipelineTarget, upload: Upload) {
    let result = file_upload(&state, &target, upload).await;
    finish(&state, &target, result).await;
}

/// Re-extract tender fields from the stored reference
pub async fn run_tender_reextraction(state: AppState, target: PipelineTarget) {
    let result = tender_reextraction(&state, &target).await;
    finish(&state, &target, result).await;
}

/// Re-classify (unless confirmed) and re-extract one supporting file
pub async fn run_file_reextraction(state: AppState, target: PipelineTarget) {
    let result = file_reextraction(&state, &target).await;
    finish(&state, &target, result).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_band() {
        let status = |p: Option<&str>| DatasetStatus {
            task_status: 1,
            percentage: p.map(str::to_string),
        };
        assert_eq!(parse_progress(&status(None)), 20);
        assert_eq!(parse_progress(&status(Some("50%"))), 40);
        assert_eq!(parse_progress(&status(Some("100"))), 60);
    }
}
