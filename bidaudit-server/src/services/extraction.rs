//! Field extraction
//!
//! One agent call per catalog field. Each answer is normalized with the
//! extraction alias table plus the field's display name as an extra value
//! key. A field whose call fails is recorded as missing; the remaining
//! fields still run.

use bidaudit_common::catalog::FieldSpec;
use bidaudit_common::db::{FieldStatus, FieldValueInput};
use bidaudit_common::normalizer::{normalize, AliasTable};
use std::path::Path;

use crate::services::agent_gateway::{AgentKind, AgentPlatform, ChatRequest, FileRef};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

/// Whether an upload is an image (by MIME type or extension)
pub fn is_image(file_name: &str, mime_type: Option<&str>) -> bool {
    if mime_type.is_some_and(|m| m.trim().to_ascii_lowercase().starts_with("image/")) {
        return true;
    }
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

/// Extraction agent for a file
pub fn extraction_agent(file_name: &str, mime_type: Option<&str>) -> AgentKind {
    if is_image(file_name, mime_type) {
        AgentKind::VisionExtraction
    } else {
        AgentKind::Extraction
    }
}

fn missing(field: &FieldSpec) -> FieldValueInput {
    FieldValueInput {
        field_code: field.code.clone(),
        field_name: field.name.clone(),
        field_value: None,
        status: Some(FieldStatus::Missing),
        evidence: None,
    }
}

/// Extract every field from one document. Returns one entry per field.
pub async fn extract_fields(
    agent: &dyn AgentPlatform,
    kind: AgentKind,
    fields: &[FieldSpec],
    file_name: &str,
    document: &FileRef,
) -> Vec<FieldValueInput> {
    let mut values = Vec::with_capacity(fields.len());

    for field in fields {
        let request = ChatRequest::new()
            .with("field_code", field.code.as_str())
            .with("field_name", field.name.as_str())
            .with("hint", field.hint.as_deref().unwrap_or_default())
            .with("file_name", file_name)
            .with_file(document.clone());

        let answer = match agent.chat(kind, request).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(
                    field_code = %field.code,
                    file_name,
                    agent = %kind,
                    error = %e,
                    "Field extraction failed, recorded as missing"
                );
                values.push(missing(field));
                continue;
            }
        };

        let aliases = AliasTable::extraction().with_value_key(&field.name);
        let normalized = normalize(&answer, &aliases);
        tracing::debug!(field_code = %field.code, status = ?normalized.status, "Field extracted");

        values.push(FieldValueInput {
            field_code: field.code.clone(),
            field_name: field.name.clone(),
            field_value: normalized.value,
            status: Some(normalized.status.into()),
            evidence: normalized.evidence,
        });
    }

    values
}
