//! Multi-rule audit orchestration
//!
//! Owns the per-project audit sessions. A run walks the selected rules one at
//! a time, calls the audit agent with the project's extracted values, parses
//! each answer into a verdict and publishes progress on a broadcast channel
//! (consumed by the SSE endpoint).
//!
//! Confirmation turns `fail` / `review` verdicts into audit risk rows. The
//! risk is written before the rule is marked confirmed, and confirmations are
//! serialized so a double submit never inserts two rows.

use bidaudit_common::db::{AuditRule, NewAuditRisk, ProjectStatus, RiskStatus};
use bidaudit_common::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use sqlx::MySqlPool;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::db;
use crate::models::{AuditItem, AuditProgress, AuditSession, AuditVerdict, SessionState};
use crate::services::agent_gateway::{AgentKind, AgentPlatform, ChatRequest};
use crate::services::audit_verdict::{failed_verdict, parse_verdict};

const EVENT_CAPACITY: usize = 256;

/// Audit lifecycle events, streamed to SSE clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    Started {
        project_id: String,
        total: usize,
    },
    Progress(AuditProgress),
    Completed {
        project_id: String,
        verdicts: usize,
    },
    Errored {
        project_id: String,
        error: String,
    },
}

impl AuditEvent {
    pub fn project_id(&self) -> &str {
        match self {
            AuditEvent::Started { project_id, .. }
            | AuditEvent::Completed { project_id, .. }
            | AuditEvent::Errored { project_id, .. } => project_id,
            AuditEvent::Progress(progress) => &progress.project_id,
        }
    }

    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::Started { .. } => "audit_started",
            AuditEvent::Progress(_) => "audit_progress",
            AuditEvent::Completed { .. } => "audit_completed",
            AuditEvent::Errored { .. } => "audit_errored",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOutcome {
    /// The rule was confirmed by an earlier request
    pub already_confirmed: bool,
    pub risk_created: bool,
}

/// Agent used for a rule: code-review rules go to the code audit agent
pub fn agent_for_rule(rule: &AuditRule) -> AgentKind {
    let is_code = rule
        .category
        .as_deref()
        .map(|c| c.to_lowercase())
        .is_some_and(|c| c.contains("code") || c.contains("代码"));

    if is_code {
        AgentKind::CodeAudit
    } else {
        AgentKind::BasicAudit
    }
}

pub struct AuditOrchestrator {
    agent: Arc<dyn AgentPlatform>,
    sessions: RwLock<HashMap<String, AuditSession>>,
    events: broadcast::Sender<AuditEvent>,
    confirm_lock: Mutex<()>,
}

impl AuditOrchestrator {
    pub fn new(agent: Arc<dyn AgentPlatform>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            agent,
            sessions: RwLock::new(HashMap::new()),
            events,
            confirm_lock: Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: AuditEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Snapshot of a project's session
    pub async fn session(&self, project_id: &str) -> Option<AuditSession> {
        self.sessions.read().await.get(project_id).cloned()
    }

    pub async fn is_running(&self, project_id: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(project_id)
            .is_some_and(AuditSession::is_running)
    }

    /// Drop a project's session along with its confirmations. A run still in
    /// flight finishes without recording anything.
    pub async fn forget(&self, project_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(project_id).is_some();
        if removed {
            tracing::debug!(project_id, "Audit session dropped");
        }
        removed
    }

    /// Enter `Running` for a project. Returns `false` (and changes nothing)
    /// when a run is already in progress.
    pub async fn begin(&self, project_id: &str, rules: &[AuditRule]) -> bool {
        {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .entry(project_id.to_string())
                .or_insert_with(|| AuditSession::new(project_id));
            if session.is_running() {
                tracing::info!(project_id, "Audit already running, start ignored");
                return false;
            }
            session.begin(rules);
        }

        tracing::info!(project_id, rules = rules.len(), "Audit session started");
        self.emit(AuditEvent::Started {
            project_id: project_id.to_string(),
            total: rules.len(),
        });
        true
    }

    /// Run every rule in order. Always yields one verdict per rule; a failed
    /// agent call becomes a `review` verdict carrying the error.
    pub async fn execute(
        &self,
        project_id: &str,
        rules: &[AuditRule],
        items: &[AuditItem],
    ) -> Vec<AuditVerdict> {
        let items_value = serde_json::to_value(items).unwrap_or(Value::Array(Vec::new()));
        let mut verdicts = Vec::with_capacity(rules.len());

        for (index, rule) in rules.iter().enumerate() {
            let kind = agent_for_rule(rule);
            let request = ChatRequest::new()
                .with("rule_code", rule.rule_code.as_str())
                .with("rule_name", rule.rule_name.as_str())
                .with("rule", rule.description.as_deref().unwrap_or(&rule.rule_name))
                .with("items", items_value.clone());

            let verdict = match self.agent.chat(kind, request).await {
                Ok(answer) => parse_verdict(&rule.rule_code, &rule.rule_name, &answer),
                Err(e) => {
                    tracing::warn!(
                        project_id,
                        rule_code = %rule.rule_code,
                        agent = %kind,
                        error = %e,
                        "Audit rule call failed, marked for review"
                    );
                    failed_verdict(&rule.rule_code, &rule.rule_name, &e.to_string())
                }
            };
            tracing::debug!(project_id, rule_code = %rule.rule_code, outcome = ?verdict.outcome, "Rule audited");

            let progress = self
                .sessions
                .write()
                .await
                .get_mut(project_id)
                .and_then(|session| session.record(index, verdict.clone()));
            if let Some(progress) = progress {
                self.emit(AuditEvent::Progress(progress));
            }
            verdicts.push(verdict);
        }

        if let Some(session) = self.sessions.write().await.get_mut(project_id) {
            session.transition_to(SessionState::Completed);
        }
        tracing::info!(project_id, verdicts = verdicts.len(), "Audit session completed");
        self.emit(AuditEvent::Completed {
            project_id: project_id.to_string(),
            verdicts: verdicts.len(),
        });

        verdicts
    }

    pub async fn mark_errored(&self, project_id: &str, error: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(project_id) {
            session.error = Some(error.to_string());
            session.transition_to(SessionState::Errored);
        }
        tracing::error!(project_id, error, "Audit session errored");
        self.emit(AuditEvent::Errored {
            project_id: project_id.to_string(),
            error: error.to_string(),
        });
    }

    /// Confirm a rule's verdict. `persist_risk` is called only for outcomes
    /// that record a risk and only on the first confirmation.
    pub async fn confirm<F, Fut>(
        &self,
        project_id: &str,
        rule_code: &str,
        persist_risk: F,
    ) -> Result<ConfirmOutcome>
    where
        F: FnOnce(AuditVerdict) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let _guard = self.confirm_lock.lock().await;

        let verdict = {
            let sessions = self.sessions.read().await;
            let session = sessions
                .get(project_id)
                .ok_or_else(|| Error::NotFound(format!("Audit session for project {}", project_id)))?;
            if session.is_confirmed(rule_code) {
                return Ok(ConfirmOutcome {
                    already_confirmed: true,
                    risk_created: false,
                });
            }
            session
                .verdict_for(rule_code)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("Verdict for rule {}", rule_code)))?
        };

        let risk_created = verdict.outcome.creates_risk();
        if risk_created {
            persist_risk(verdict).await?;
        }

        if let Some(session) = self.sessions.write().await.get_mut(project_id) {
            session.confirmed.insert(rule_code.to_string());
        }
        tracing::info!(project_id, rule_code, risk_created, "Audit verdict confirmed");

        Ok(ConfirmOutcome {
            already_confirmed: false,
            risk_created,
        })
    }
}

/// Risk row recorded when a verdict is confirmed
pub fn risk_from_verdict(verdict: &AuditVerdict) -> NewAuditRisk {
    NewAuditRisk {
        rule_code: verdict.rule_code.clone(),
        rule_name: verdict.rule_name.clone(),
        severity: verdict.severity,
        description: verdict.description.clone(),
        suggestion: verdict.suggestion.clone(),
        evidence: verdict.evidence.clone(),
        status: Some(RiskStatus::Pending),
    }
}

/// Flatten extracted values of a project (and any related projects) into
/// audit items.
pub async fn collect_items(
    pool: &MySqlPool,
    project_id: &str,
    related_project_ids: &[String],
) -> Result<Vec<AuditItem>> {
    let mut items = Vec::new();

    let ids = std::iter::once(project_id).chain(
        related_project_ids
            .iter()
            .map(String::as_str)
            .filter(|id| *id != project_id),
    );
    for id in ids {
        let Some(project) = db::projects::get_project(pool, id).await? else {
            if id == project_id {
                return Err(Error::NotFound(format!("Project {}", project_id)));
            }
            tracing::warn!(project_id = id, "Related project not found, skipped");
            continue;
        };

        let tender_name = db::files::tender_file(pool, id)
            .await?
            .map(|f| f.file_name)
            .unwrap_or_else(|| project.name.clone());

        for field in db::fields::list_project_fields(pool, id).await? {
            items.push(AuditItem {
                project_name: project.name.clone(),
                file_name: tender_name.clone(),
                field_name: field.field_name,
                field_value: field.field_value,
            });
        }
        for (file_name, field) in db::fields::list_file_fields_by_project(pool, id).await? {
            items.push(AuditItem {
                project_name: project.name.clone(),
                file_name,
                field_name: field.field_name,
                field_value: field.field_value,
            });
        }
    }

    Ok(items)
}

/// Background body of an audit run: project status `auditing` for the
/// duration, `completed` afterwards.
pub async fn run_project_audit(
    pool: MySqlPool,
    orchestrator: Arc<AuditOrchestrator>,
    project_id: String,
    rules: Vec<AuditRule>,
    items: Vec<AuditItem>,
) {
    if let Err(e) = db::projects::set_status(&pool, &project_id, ProjectStatus::Auditing).await {
        orchestrator.mark_errored(&project_id, &e.to_string()).await;
        return;
    }

    orchestrator.execute(&project_id, &rules, &items).await;

    if let Err(e) = db::projects::set_status(&pool, &project_id, ProjectStatus::Completed).await {
        tracing::error!(project_id = %project_id, error = %e, "Failed to mark project completed");
    }
}
