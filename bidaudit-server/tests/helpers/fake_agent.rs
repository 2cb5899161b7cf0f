//! Scripted in-process agent platform

use async_trait::async_trait;
use bidaudit_server::services::agent_gateway::{
    AgentError, AgentKind, AgentPlatform, ChatRequest, DatasetStatus, UploadedFile,
};
use std::collections::VecDeque;
use std::sync::Mutex;

type ChatScript = Box<dyn Fn(AgentKind, &ChatRequest) -> Result<String, AgentError> + Send + Sync>;

/// Fake agent: chat answers come from a closure, dataset statuses from a queue
/// (the last status repeats once the queue is drained).
pub struct FakeAgent {
    chat_script: ChatScript,
    statuses: Mutex<VecDeque<i64>>,
    pub chats: Mutex<Vec<(AgentKind, ChatRequest)>>,
    pub uploads: Mutex<Vec<String>>,
}

impl FakeAgent {
    pub fn new<F>(chat_script: F) -> Self
    where
        F: Fn(AgentKind, &ChatRequest) -> Result<String, AgentError> + Send + Sync + 'static,
    {
        Self {
            chat_script: Box::new(chat_script),
            statuses: Mutex::new(VecDeque::from(vec![30])),
            chats: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// Agent answering every chat with the same text
    pub fn answering(answer: &str) -> Self {
        let answer = answer.to_string();
        Self::new(move |_, _| Ok(answer.clone()))
    }

    pub fn with_statuses(self, statuses: &[i64]) -> Self {
        *self.statuses.lock().unwrap() = statuses.iter().copied().collect();
        self
    }

    pub fn chat_count(&self) -> usize {
        self.chats.lock().unwrap().len()
    }

    pub fn chat_kinds(&self) -> Vec<AgentKind> {
        self.chats.lock().unwrap().iter().map(|(kind, _)| *kind).collect()
    }
}

#[async_trait]
impl AgentPlatform for FakeAgent {
    async fn upload_file(
        &self,
        _kind: AgentKind,
        file_name: &str,
        _mime_type: Option<&str>,
        _bytes: Vec<u8>,
    ) -> Result<UploadedFile, AgentError> {
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(file_name.to_string());
        Ok(UploadedFile {
            file_id: Some(format!("file-{}", uploads.len())),
            url: Some(format!("https://agent.test/files/{}", uploads.len())),
        })
    }

    async fn create_dataset(
        &self,
        _kind: AgentKind,
        _name: &str,
        file_ids: &[String],
    ) -> Result<String, AgentError> {
        Ok(format!("ds-{}", file_ids.join("-")))
    }

    async fn dataset_status(
        &self,
        _kind: AgentKind,
        _dataset_id: &str,
    ) -> Result<DatasetStatus, AgentError> {
        let mut statuses = self.statuses.lock().unwrap();
        let status = if statuses.len() > 1 {
            statuses.pop_front().unwrap_or(30)
        } else {
            statuses.front().copied().unwrap_or(30)
        };
        Ok(DatasetStatus {
            task_status: status,
            percentage: Some("50".to_string()),
        })
    }

    async fn chat(&self, kind: AgentKind, request: ChatRequest) -> Result<String, AgentError> {
        let answer = (self.chat_script)(kind, &request);
        self.chats.lock().unwrap().push((kind, request));
        answer
    }
}
