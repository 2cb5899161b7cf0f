//! Supporting document classification

use bidaudit_common::catalog::{FieldCatalog, OTHER_DOC_TYPE};
use bidaudit_common::normalizer::{normalize, AliasTable};
use serde::Serialize;
use serde_json::json;

use crate::services::agent_gateway::{AgentError, AgentKind, AgentPlatform, ChatRequest, FileRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub code: String,
    pub name: String,
    /// Normalized agent answer
    pub raw: Option<String>,
}

/// Map a normalized answer onto the catalog. Unmatched answers become
/// `other`, keeping the agent's own name when there is one.
pub fn match_answer(catalog: &FieldCatalog, answer: Option<&str>) -> Classification {
    if let Some(doc_type) = answer.and_then(|a| catalog.match_doc_type(a)) {
        return Classification {
            code: doc_type.code.clone(),
            name: doc_type.name.clone(),
            raw: answer.map(str::to_string),
        };
    }

    let fallback_name = catalog
        .doc_type(OTHER_DOC_TYPE)
        .map(|t| t.name.clone())
        .unwrap_or_else(|| "其他".to_string());
    Classification {
        code: OTHER_DOC_TYPE.to_string(),
        name: answer
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .unwrap_or(fallback_name),
        raw: answer.map(str::to_string),
    }
}

/// Ask the classification agent which document type a file is
pub async fn classify(
    agent: &dyn AgentPlatform,
    catalog: &FieldCatalog,
    file_name: &str,
    document: &FileRef,
) -> Result<Classification, AgentError> {
    let doc_types: Vec<_> = catalog
        .doc_types
        .iter()
        .map(|t| json!({ "code": t.code, "name": t.name }))
        .collect();

    let request = ChatRequest::new()
        .with("file_name", file_name)
        .with("doc_types", doc_types)
        .with_file(document.clone());

    let answer = agent.chat(AgentKind::Classification, request).await?;
    let normalized = normalize(&answer, &AliasTable::classification());
    let classification = match_answer(catalog, normalized.value.as_deref());

    tracing::info!(
        file_name,
        doc_type = %classification.code,
        raw = ?classification.raw,
        "Document classified"
    );
    Ok(classification)
}
