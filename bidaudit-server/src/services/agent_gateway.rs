//! Agent platform client
//!
//! Wraps the third-party agent HTTP API used for file upload, knowledge-base
//! datasets and chat. Every call authenticates with the credential pair of
//! one logical agent: `Authorization: Bearer {authKey}.{authSecret}`.
//!
//! | operation | request |
//! |---|---|
//! | upload | `POST {host}/v1/files` (multipart `file`) |
//! | create dataset | `POST {host}/v1/datasets` `{name, fileIds}` |
//! | dataset status | `GET {host}/v1/datasets/{id}` |
//! | chat | `POST {host}/v1/agents/{agentId}/chat` `{state, files}` |
//!
//! Responses may or may not be wrapped in `data`, and numeric fields may
//! arrive as strings. Chat calls are never retried.

use async_trait::async_trait;
use bidaudit_common::config::{AgentCredential, AgentPlatformConfig};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("bidaudit-server/", env!("CARGO_PKG_VERSION"));

/// Agent client errors
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent {0} has no credentials configured")]
    NotConfigured(AgentKind),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Dataset {dataset_id} failed with task status {status}")]
    DatasetFailed { dataset_id: String, status: i64 },
}

/// Logical agents, one credential pair each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Extraction,
    VisionExtraction,
    Classification,
    BasicAudit,
    CodeAudit,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Extraction => "extraction",
            AgentKind::VisionExtraction => "vision_extraction",
            AgentKind::Classification => "classification",
            AgentKind::BasicAudit => "basic_audit",
            AgentKind::CodeAudit => "code_audit",
        }
    }

    pub fn credential<'a>(&self, config: &'a AgentPlatformConfig) -> &'a AgentCredential {
        match self {
            AgentKind::Extraction => &config.extraction,
            AgentKind::VisionExtraction => &config.vision_extraction,
            AgentKind::Classification => &config.classification,
            AgentKind::BasicAudit => &config.basic_audit,
            AgentKind::CodeAudit => &config.code_audit,
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a file upload: an opaque id, a direct URL, or both
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_id: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetStatus {
    pub task_status: i64,
    /// Parse progress as reported (e.g. `"45"` or `"45%"`)
    pub percentage: Option<String>,
}

impl DatasetStatus {
    /// Numeric progress 0-100 when the percentage is parseable
    pub fn percent(&self) -> Option<u8> {
        let text = self.percentage.as_deref()?.trim().trim_end_matches('%');
        let value: f64 = text.trim().parse().ok()?;
        Some(value.clamp(0.0, 100.0) as u8)
    }
}

/// Document reference attached to a chat call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
}

impl FileRef {
    pub fn is_empty(&self) -> bool {
        self.file_id.is_none() && self.url.is_none() && self.dataset_id.is_none()
    }
}

/// Chat invocation: a key/value state bag plus optional documents
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatRequest {
    pub state: Map<String, Value>,
    pub files: Vec<FileRef>,
}

impl ChatRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.state.insert(key.to_string(), value.into());
        self
    }

    pub fn with_file(mut self, file: FileRef) -> Self {
        if !file.is_empty() {
            self.files.push(file);
        }
        self
    }
}

/// Agent platform operations
///
/// Implemented by [`AgentGateway`] over HTTP; orchestration code only sees
/// this trait so it can be driven by a fake in tests.
#[async_trait]
pub trait AgentPlatform: Send + Sync {
    async fn upload_file(
        &self,
        kind: AgentKind,
        file_name: &str,
        mime_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<UploadedFile, AgentError>;

    async fn create_dataset(
        &self,
        kind: AgentKind,
        name: &str,
        file_ids: &[String],
    ) -> Result<String, AgentError>;

    async fn dataset_status(
        &self,
        kind: AgentKind,
        dataset_id: &str,
    ) -> Result<DatasetStatus, AgentError>;

    /// Invoke an agent; returns the answer text (free-form text or JSON)
    async fn chat(&self, kind: AgentKind, request: ChatRequest) -> Result<String, AgentError>;
}

/// Dataset readiness polling parameters
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetPolling {
    pub interval: Duration,
    pub ready_status: i64,
    pub failed_statuses: Vec<i64>,
}

impl DatasetPolling {
    pub fn from_config(config: &AgentPlatformConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            ready_status: config.ready_status,
            failed_statuses: config.failed_statuses.clone(),
        }
    }
}

impl Default for DatasetPolling {
    fn default() -> Self {
        Self::from_config(&AgentPlatformConfig::default())
    }
}

/// Poll a dataset until it is ready or reports a failure status.
///
/// There is no timeout: polling continues at a fixed interval until a
/// terminal status is observed. `on_status` sees every intermediate status.
pub async fn wait_for_dataset<F>(
    platform: &dyn AgentPlatform,
    kind: AgentKind,
    dataset_id: &str,
    polling: &DatasetPolling,
    mut on_status: F,
) -> Result<DatasetStatus, AgentError>
where
    F: FnMut(&DatasetStatus) + Send,
{
    let mut polls = 0u64;
    loop {
        let status = platform.dataset_status(kind, dataset_id).await?;
        polls += 1;

        if status.task_status == polling.ready_status {
            tracing::info!(dataset_id, polls, "Dataset ready");
            return Ok(status);
        }
        if polling.failed_statuses.contains(&status.task_status) {
            tracing::warn!(dataset_id, task_status = status.task_status, "Dataset parse failed");
            return Err(AgentError::DatasetFailed {
                dataset_id: dataset_id.to_string(),
                status: status.task_status,
            });
        }

        tracing::debug!(
            dataset_id,
            task_status = status.task_status,
            percentage = ?status.percentage,
            "Dataset not ready yet"
        );
        on_status(&status);
        tokio::time::sleep(polling.interval).await;
    }
}

/// HTTP implementation of [`AgentPlatform`]
pub struct AgentGateway {
    http_client: reqwest::Client,
    config: AgentPlatformConfig,
}

impl AgentGateway {
    pub fn new(config: AgentPlatformConfig) -> Result<Self, AgentError> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| AgentError::Network(e.to_string()))?;

        Ok(Self { http_client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.host.trim_end_matches('/'), path)
    }

    fn credential(&self, kind: AgentKind) -> Result<&AgentCredential, AgentError> {
        let credential = kind.credential(&self.config);
        if credential.is_configured() {
            Ok(credential)
        } else {
            Err(AgentError::NotConfigured(kind))
        }
    }

    fn bearer(credential: &AgentCredential) -> String {
        format!("{}.{}", credential.auth_key, credential.auth_secret)
    }

    /// Send a request and return the body text, mapping non-2xx to `Api`
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, AgentError> {
        let response = request
            .send()
            .await
            .map_err(|e| AgentError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AgentError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(AgentError::Api(status.as_u16(), text));
        }
        Ok(text)
    }

    async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<Value, AgentError> {
        let text = self.send(request).await?;
        serde_json::from_str(&text).map_err(|e| AgentError::Parse(e.to_string()))
    }
}

#[async_trait]
impl AgentPlatform for AgentGateway {
    async fn upload_file(
        &self,
        kind: AgentKind,
        file_name: &str,
        mime_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<UploadedFile, AgentError> {
        let credential = self.credential(kind)?;
        let size = bytes.len();

        let mut part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        if let Some(mime) = mime_type {
            part = part
                .mime_str(mime)
                .map_err(|e| AgentError::Parse(format!("Invalid MIME type {}: {}", mime, e)))?;
        }
        let form = reqwest::multipart::Form::new().part("file", part);

        let body = self
            .send_json(
                self.http_client
                    .post(self.url("/v1/files"))
                    .bearer_auth(Self::bearer(credential))
                    .multipart(form),
            )
            .await?;

        let data = payload(&body);
        let uploaded = UploadedFile {
            file_id: string_field(data, &["fileId", "file_id", "id"]),
            url: string_field(data, &["url", "fileUrl", "previewUrl"]),
        };
        if uploaded.file_id.is_none() && uploaded.url.is_none() {
            return Err(AgentError::Parse(format!("Upload response has no file id or url: {}", body)));
        }

        tracing::info!(
            agent = %kind,
            file_name,
            size,
            file_id = ?uploaded.file_id,
            "File uploaded to agent platform"
        );
        Ok(uploaded)
    }

    async fn create_dataset(
        &self,
        kind: AgentKind,
        name: &str,
        file_ids: &[String],
    ) -> Result<String, AgentError> {
        let credential = self.credential(kind)?;

        let body = self
            .send_json(
                self.http_client
                    .post(self.url("/v1/datasets"))
                    .bearer_auth(Self::bearer(credential))
                    .json(&json!({ "name": name, "fileIds": file_ids })),
            )
            .await?;

        let dataset_id = string_field(payload(&body), &["datasetId", "dataset_id", "id"])
            .ok_or_else(|| AgentError::Parse(format!("Dataset response has no id: {}", body)))?;

        tracing::info!(agent = %kind, dataset_id = %dataset_id, files = file_ids.len(), "Dataset created");
        Ok(dataset_id)
    }

    async fn dataset_status(
        &self,
        kind: AgentKind,
        dataset_id: &str,
    ) -> Result<DatasetStatus, AgentError> {
        let credential = self.credential(kind)?;

        let body = self
            .send_json(
                self.http_client
                    .get(self.url(&format!("/v1/datasets/{}", dataset_id)))
                    .bearer_auth(Self::bearer(credential)),
            )
            .await?;

        let data = payload(&body);
        let task_status = int_field(data, &["taskStatus", "task_status", "status"])
            .ok_or_else(|| AgentError::Parse(format!("Dataset status has no taskStatus: {}", body)))?;

        Ok(DatasetStatus {
            task_status,
            percentage: string_field(data, &["percentage", "progress"]),
        })
    }

    async fn chat(&self, kind: AgentKind, request: ChatRequest) -> Result<String, AgentError> {
        let credential = self.credential(kind)?;
        if credential.agent_id.trim().is_empty() {
            return Err(AgentError::NotConfigured(kind));
        }

        tracing::debug!(
            agent = %kind,
            agent_id = %credential.agent_id,
            state_keys = request.state.len(),
            files = request.files.len(),
            "Invoking agent"
        );

        let text = self
            .send(
                self.http_client
                    .post(self.url(&format!("/v1/agents/{}/chat", credential.agent_id)))
                    .bearer_auth(Self::bearer(credential))
                    .json(&json!({ "state": request.state, "files": request.files })),
            )
            .await?;

        Ok(chat_content(&text))
    }
}

/// The `data` object when the body is wrapped, else the body itself
fn payload(body: &Value) -> &Value {
    match body.get("data") {
        Some(data) if data.is_object() => data,
        _ => body,
    }
}

/// First present key as a string; numbers are accepted and stringified
fn string_field(object: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First present key as an integer; numeric strings are accepted
fn int_field(object: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| match object.get(*key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Extract the answer text from a chat response body.
///
/// Takes the first of `data.content`, `data.answer`, `data.output`,
/// `data.text`, `choices[0].message.content`, a string `data`; otherwise the
/// raw body.
pub fn chat_content(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };

    if let Some(data) = parsed.get("data") {
        if let Value::String(s) = data {
            return s.clone();
        }
        for key in ["content", "answer", "output", "text"] {
            match data.get(key) {
                Some(Value::String(s)) => return s.clone(),
                Some(Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }

    if let Some(Value::String(s)) = parsed.pointer("/choices/0/message/content") {
        return s.clone();
    }

    body.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds_client_without_timeout() {
        let config = AgentPlatformConfig::default();
        assert!(config.request_timeout().is_none());
        assert!(AgentGateway::new(config).is_ok());
    }

    #[test]
    fn test_chat_content_shapes() {
        assert_eq!(chat_content(r#"{"data":{"content":"A"}}"#), "A");
        assert_eq!(chat_content(r#"{"data":{"answer":"B","content":null}}"#), "B");
        assert_eq!(chat_content(r#"{"data":{"output":"C"}}"#), "C");
        assert_eq!(chat_content(r#"{"data":{"text":"D"}}"#), "D");
        assert_eq!(chat_content(r#"{"data":"E"}"#), "E");
        assert_eq!(
            chat_content(r#"{"choices":[{"message":{"content":"F"}}]}"#),
            "F"
        );
        assert_eq!(chat_content("plain answer"), "plain answer");
        assert_eq!(chat_content(r#"{"other":1}"#), r#"{"other":1}"#);
    }

    #[test]
    fn test_chat_content_keeps_structured_output() {
        assert_eq!(
            chat_content(r#"{"data":{"output":{"value":"x"}}}"#),
            r#"{"value":"x"}"#
        );
    }

    #[test]
    fn test_numeric_fields_accept_strings() {
        let body: Value = serde_json::from_str(r#"{"data":{"taskStatus":"30","percentage":100}}"#).unwrap();
        let data = payload(&body);
        assert_eq!(int_field(data, &["taskStatus"]), Some(30));
        assert_eq!(string_field(data, &["percentage"]).as_deref(), Some("100"));

        let bare: Value = serde_json::from_str(r#"{"taskStatus":3}"#).unwrap();
        assert_eq!(int_field(payload(&bare), &["taskStatus"]), Some(3));
    }

    #[test]
    fn test_dataset_percent() {
        let status = |p: Option<&str>| DatasetStatus {
            task_status: 1,
            percentage: p.map(str::to_string),
        };
        assert_eq!(status(Some("45")).percent(), Some(45));
        assert_eq!(status(Some("62.5%")).percent(), Some(62));
        assert_eq!(status(Some("abc")).percent(), None);
        assert_eq!(status(None).percent(), None);
    }

    #[test]
    fn test_chat_request_builder_skips_empty_refs() {
        let request = ChatRequest::new()
            .with("field_name", "项目名称")
            .with_file(FileRef::default())
            .with_file(FileRef {
                dataset_id: Some("ds-1".into()),
                ..Default::default()
            });
        assert_eq!(request.files.len(), 1);
        assert_eq!(request.state["field_name"], "项目名称");

        let wire = serde_json::to_value(&request.files[0]).unwrap();
        assert_eq!(wire, json!({"datasetId": "ds-1"}));
    }

    #[test]
    fn test_missing_credentials() {
        let gateway = AgentGateway::new(AgentPlatformConfig::default()).unwrap();
        assert!(matches!(
            gateway.credential(AgentKind::CodeAudit),
            Err(AgentError::NotConfigured(AgentKind::CodeAudit))
        ));
    }
}
