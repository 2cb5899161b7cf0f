//! Audit session state machine
//!
//! A session moves `Idle → Running → Completed | Errored`; each rule inside
//! it moves `Pending → Succeeded | FailedSoft`. A soft failure still carries
//! a `review` verdict so the verdict count always equals the rule count.

use bidaudit_common::db::{AuditRule, RiskSeverity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleRunState {
    Pending,
    Succeeded,
    /// Agent call failed; a `review` verdict carries the error
    FailedSoft,
}

/// Outcome of one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictOutcome {
    Pass,
    Fail,
    Review,
    Missing,
}

impl VerdictOutcome {
    /// Whether confirming this outcome records an audit risk
    pub fn creates_risk(&self) -> bool {
        matches!(self, VerdictOutcome::Fail | VerdictOutcome::Review)
    }

    /// Severity used when the agent does not state one
    pub fn default_severity(&self) -> RiskSeverity {
        match self {
            VerdictOutcome::Fail | VerdictOutcome::Missing => RiskSeverity::Medium,
            VerdictOutcome::Review => RiskSeverity::Low,
            VerdictOutcome::Pass => RiskSeverity::Info,
        }
    }
}

/// One reviewed value: where it came from and what it says
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditItem {
    pub project_name: String,
    pub file_name: String,
    pub field_name: String,
    pub field_value: Option<String>,
}

/// Structured result of one rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditVerdict {
    pub rule_code: String,
    pub rule_name: String,
    pub outcome: VerdictOutcome,
    pub severity: RiskSeverity,
    pub description: Option<String>,
    pub suggestion: Option<String>,
    pub evidence: Option<Value>,
    pub law_reference: Option<String>,
    /// Agent answer as received (empty when the call failed)
    pub raw: String,
    /// Agent call error for soft-failed rules
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRun {
    pub rule_id: i64,
    pub rule_code: String,
    pub rule_name: String,
    pub state: RuleRunState,
    pub verdict: Option<AuditVerdict>,
}

/// Progress after each finished rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditProgress {
    pub project_id: String,
    /// Rules finished so far
    pub index: usize,
    pub total: usize,
    /// Rule that just finished
    pub rule_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSession {
    pub project_id: String,
    pub state: SessionState,
    pub rules: Vec<RuleRun>,
    pub progress: Option<AuditProgress>,
    /// Rule codes confirmed by the user; only ever grows
    pub confirmed: BTreeSet<String>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl AuditSession {
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            state: SessionState::Idle,
            rules: Vec::new(),
            progress: None,
            confirmed: BTreeSet::new(),
            error: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Reset per-run state and enter `Running` with the given rules.
    /// Confirmations from earlier runs are kept.
    pub fn begin(&mut self, rules: &[AuditRule]) {
        self.rules = rules
            .iter()
            .map(|rule| RuleRun {
                rule_id: rule.id,
                rule_code: rule.rule_code.clone(),
                rule_name: rule.rule_name.clone(),
                state: RuleRunState::Pending,
                verdict: None,
            })
            .collect();
        self.progress = None;
        self.error = None;
        self.started_at = Some(Utc::now());
        self.ended_at = None;
        self.transition_to(SessionState::Running);
    }

    pub fn transition_to(&mut self, new_state: SessionState) {
        tracing::debug!(
            project_id = %self.project_id,
            old_state = ?self.state,
            new_state = ?new_state,
            "Audit session transition"
        );
        self.state = new_state;
        if self.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, SessionState::Completed | SessionState::Errored)
    }

    /// Store the verdict of rule `index` and advance progress
    pub fn record(&mut self, index: usize, verdict: AuditVerdict) -> Option<AuditProgress> {
        let total = self.rules.len();
        let run = self.rules.get_mut(index)?;
        run.state = if verdict.error.is_some() {
            RuleRunState::FailedSoft
        } else {
            RuleRunState::Succeeded
        };
        let rule_name = run.rule_name.clone();
        run.verdict = Some(verdict);

        let progress = AuditProgress {
            project_id: self.project_id.clone(),
            index: index + 1,
            total,
            rule_name,
        };
        self.progress = Some(progress.clone());
        Some(progress)
    }

    pub fn verdicts(&self) -> Vec<AuditVerdict> {
        self.rules.iter().filter_map(|r| r.verdict.clone()).collect()
    }

    /// Latest verdict for a rule code
    pub fn verdict_for(&self, rule_code: &str) -> Option<&AuditVerdict> {
        self.rules
            .iter()
            .rev()
            .filter(|r| r.rule_code == rule_code)
            .find_map(|r| r.verdict.as_ref())
    }

    pub fn is_confirmed(&self, rule_code: &str) -> bool {
        self.confirmed.contains(rule_code)
    }
}
