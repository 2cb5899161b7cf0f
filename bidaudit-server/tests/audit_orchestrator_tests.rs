//! Audit orchestrator tests driven by a scripted agent

mod helpers;

use bidaudit_common::db::AuditRule;
use bidaudit_server::models::{AuditItem, RuleRunState, SessionState, VerdictOutcome};
use bidaudit_server::services::agent_gateway::{AgentError, AgentKind};
use bidaudit_server::services::{AuditEvent, AuditOrchestrator};
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use helpers::fake_agent::FakeAgent;

fn rule(id: i64, code: &str, category: Option<&str>) -> AuditRule {
    AuditRule {
        id,
        source_id: Some(id.to_string()),
        rule_code: code.to_string(),
        rule_name: format!("规则{}", code),
        description: Some(format!("检查 {}", code)),
        category: category.map(str::to_string),
        stage: None,
        is_enabled: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn items() -> Vec<AuditItem> {
    vec![AuditItem {
        project_name: "标书.pdf".to_string(),
        file_name: "标书.pdf".to_string(),
        field_name: "投标报价".to_string(),
        field_value: Some("100万元".to_string()),
    }]
}

/// R1 fails, R2 errors at the agent, R3 passes
fn scripted_agent() -> FakeAgent {
    FakeAgent::new(|_, request| match request.state["rule_code"].as_str() {
        Some("R1") => Ok(r#"{"result":"不符合","description":"报价不一致","severity":"高"}"#.to_string()),
        Some("R2") => Err(AgentError::Api(502, "bad gateway".to_string())),
        _ => Ok("符合要求".to_string()),
    })
}

#[tokio::test]
async fn test_one_verdict_per_rule_even_when_calls_fail() {
    let agent = Arc::new(scripted_agent());
    let orchestrator = AuditOrchestrator::new(agent.clone());
    let rules = vec![rule(1, "R1", None), rule(2, "R2", None), rule(3, "R3", None)];

    assert!(orchestrator.begin("p-1", &rules).await);
    let verdicts = orchestrator.execute("p-1", &rules, &items()).await;

    assert_eq!(verdicts.len(), 3);
    assert_eq!(verdicts[0].outcome, VerdictOutcome::Fail);
    assert_eq!(verdicts[0].description.as_deref(), Some("报价不一致"));
    assert_eq!(verdicts[1].outcome, VerdictOutcome::Review);
    assert!(verdicts[1].error.as_deref().unwrap().contains("502"));
    assert_eq!(verdicts[2].outcome, VerdictOutcome::Pass);
    assert_eq!(agent.chat_count(), 3);

    let session = orchestrator.session("p-1").await.unwrap();
    assert_eq!(session.state, SessionState::Completed);
    assert!(session.ended_at.is_some());
    assert_eq!(session.rules[1].state, RuleRunState::FailedSoft);
    assert_eq!(session.rules[2].state, RuleRunState::Succeeded);
    let progress = session.progress.unwrap();
    assert_eq!((progress.index, progress.total), (3, 3));
}

#[tokio::test]
async fn test_agent_receives_rule_and_items() {
    let agent = Arc::new(FakeAgent::answering("通过"));
    let orchestrator = AuditOrchestrator::new(agent.clone());
    let rules = vec![rule(1, "R1", None)];

    orchestrator.begin("p-1", &rules).await;
    orchestrator.execute("p-1", &rules, &items()).await;

    let chats = agent.chats.lock().unwrap();
    let state = &chats[0].1.state;
    assert_eq!(state["rule_code"], "R1");
    assert_eq!(state["rule"], "检查 R1");
    assert_eq!(state["items"][0]["fieldName"], "投标报价");
    assert_eq!(state["items"][0]["fieldValue"], "100万元");
}

#[tokio::test]
async fn test_code_rules_use_code_audit_agent() {
    let agent = Arc::new(FakeAgent::answering("通过"));
    let orchestrator = AuditOrchestrator::new(agent.clone());
    let rules = vec![rule(1, "R1", Some("代码审查")), rule(2, "R2", Some("资质"))];

    orchestrator.begin("p-1", &rules).await;
    orchestrator.execute("p-1", &rules, &items()).await;

    assert_eq!(agent.chat_kinds(), vec![AgentKind::CodeAudit, AgentKind::BasicAudit]);
}

#[tokio::test]
async fn test_second_start_while_running_is_ignored() {
    let orchestrator = AuditOrchestrator::new(Arc::new(FakeAgent::answering("通过")));
    let rules = vec![rule(1, "R1", None)];

    assert!(orchestrator.begin("p-1", &rules).await);
    assert!(!orchestrator.begin("p-1", &[rule(1, "R1", None), rule(2, "R2", None)]).await);
    assert!(orchestrator.is_running("p-1").await);
    assert_eq!(orchestrator.session("p-1").await.unwrap().rules.len(), 1);

    // Other projects are independent
    assert!(orchestrator.begin("p-2", &rules).await);

    orchestrator.execute("p-1", &rules, &[]).await;
    assert!(!orchestrator.is_running("p-1").await);
    assert!(orchestrator.begin("p-1", &rules).await);
}

#[tokio::test]
async fn test_events_in_order() {
    let orchestrator = AuditOrchestrator::new(Arc::new(FakeAgent::answering("通过")));
    let mut rx = orchestrator.subscribe();
    let rules = vec![rule(1, "R1", None), rule(2, "R2", None)];

    orchestrator.begin("p-1", &rules).await;
    orchestrator.execute("p-1", &rules, &items()).await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let types: Vec<_> = events.iter().map(AuditEvent::event_type).collect();
    assert_eq!(
        types,
        vec!["audit_started", "audit_progress", "audit_progress", "audit_completed"]
    );
    assert!(events.iter().all(|e| e.project_id() == "p-1"));
    match &events[2] {
        AuditEvent::Progress(progress) => {
            assert_eq!(progress.index, 2);
            assert_eq!(progress.rule_name, "规则R2");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_mark_errored() {
    let orchestrator = AuditOrchestrator::new(Arc::new(FakeAgent::answering("通过")));
    let mut rx = orchestrator.subscribe();
    orchestrator.begin("p-1", &[rule(1, "R1", None)]).await;

    orchestrator.mark_errored("p-1", "database unavailable").await;

    let session = orchestrator.session("p-1").await.unwrap();
    assert_eq!(session.state, SessionState::Errored);
    assert_eq!(session.error.as_deref(), Some("database unavailable"));
    assert!(!orchestrator.is_running("p-1").await);

    rx.try_recv().unwrap();
    assert_eq!(rx.try_recv().unwrap().event_type(), "audit_errored");
}

#[tokio::test]
async fn test_confirm_creates_risk_once() {
    let orchestrator = AuditOrchestrator::new(Arc::new(scripted_agent()));
    let rules = vec![rule(1, "R1", None), rule(3, "R3", None)];
    orchestrator.begin("p-1", &rules).await;
    orchestrator.execute("p-1", &rules, &items()).await;

    let persisted = Arc::new(AtomicUsize::new(0));
    let confirm = |code: &'static str| {
        let persisted = persisted.clone();
        let orchestrator = &orchestrator;
        async move {
            orchestrator
                .confirm("p-1", code, move |verdict| async move {
                    assert_eq!(verdict.rule_code, code);
                    persisted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
        }
    };

    let first = confirm("R1").await.unwrap();
    assert!(first.risk_created);
    assert!(!first.already_confirmed);

    let second = confirm("R1").await.unwrap();
    assert!(second.already_confirmed);
    assert!(!second.risk_created);
    assert_eq!(persisted.load(Ordering::SeqCst), 1);

    // Pass verdicts are acknowledged without a risk row
    let pass = confirm("R3").await.unwrap();
    assert!(!pass.risk_created);
    assert_eq!(persisted.load(Ordering::SeqCst), 1);

    let session = orchestrator.session("p-1").await.unwrap();
    assert!(session.is_confirmed("R1") && session.is_confirmed("R3"));
}

#[tokio::test]
async fn test_confirm_failure_leaves_rule_unconfirmed() {
    let orchestrator = AuditOrchestrator::new(Arc::new(scripted_agent()));
    let rules = vec![rule(1, "R1", None)];
    orchestrator.begin("p-1", &rules).await;
    orchestrator.execute("p-1", &rules, &items()).await;

    let result = orchestrator
        .confirm("p-1", "R1", |_| async {
            Err(bidaudit_common::Error::Internal("insert failed".to_string()))
        })
        .await;
    assert!(result.is_err());
    assert!(!orchestrator.session("p-1").await.unwrap().is_confirmed("R1"));

    let retry = orchestrator.confirm("p-1", "R1", |_| async { Ok(()) }).await.unwrap();
    assert!(retry.risk_created);
}

#[tokio::test]
async fn test_confirm_unknown_rule_or_project() {
    let orchestrator = AuditOrchestrator::new(Arc::new(FakeAgent::answering("通过")));
    let rules = vec![rule(1, "R1", None)];
    orchestrator.begin("p-1", &rules).await;
    orchestrator.execute("p-1", &rules, &[]).await;

    let missing_rule = orchestrator.confirm("p-1", "R9", |_| async { Ok(()) }).await;
    assert!(matches!(missing_rule, Err(bidaudit_common::Error::NotFound(_))));

    let missing_project = orchestrator.confirm("p-9", "R1", |_| async { Ok(()) }).await;
    assert!(matches!(missing_project, Err(bidaudit_common::Error::NotFound(_))));
}

#[tokio::test]
async fn test_confirmations_survive_rerun() {
    let orchestrator = AuditOrchestrator::new(Arc::new(scripted_agent()));
    let rules = vec![rule(1, "R1", None)];
    orchestrator.begin("p-1", &rules).await;
    orchestrator.execute("p-1", &rules, &items()).await;
    orchestrator.confirm("p-1", "R1", |_| async { Ok(()) }).await.unwrap();

    orchestrator.begin("p-1", &rules).await;
    orchestrator.execute("p-1", &rules, &items()).await;

    let again = orchestrator.confirm("p-1", "R1", |_| async { Ok(()) }).await.unwrap();
    assert!(again.already_confirmed);
}

#[tokio::test]
async fn test_forget_drops_session_and_confirmations() {
    let orchestrator = AuditOrchestrator::new(Arc::new(scripted_agent()));
    let rules = vec![rule(1, "R1", None)];
    orchestrator.begin("p-1", &rules).await;
    orchestrator.execute("p-1", &rules, &items()).await;
    orchestrator.confirm("p-1", "R1", |_| async { Ok(()) }).await.unwrap();

    assert!(orchestrator.forget("p-1").await);
    assert!(!orchestrator.forget("p-1").await);
    assert!(orchestrator.session("p-1").await.is_none());
    let missing = orchestrator.confirm("p-1", "R1", |_| async { Ok(()) }).await;
    assert!(matches!(missing, Err(bidaudit_common::Error::NotFound(_))));

    // A fresh run starts with nothing confirmed
    orchestrator.begin("p-1", &rules).await;
    orchestrator.execute("p-1", &rules, &items()).await;
    let fresh = orchestrator.confirm("p-1", "R1", |_| async { Ok(()) }).await.unwrap();
    assert!(!fresh.already_confirmed);
    assert!(fresh.risk_created);
}

#[tokio::test]
async fn test_run_after_forget_records_nothing() {
    let orchestrator = AuditOrchestrator::new(Arc::new(FakeAgent::answering("通过")));
    let rules = vec![rule(1, "R1", None)];
    orchestrator.begin("p-1", &rules).await;
    orchestrator.forget("p-1").await;

    let verdicts = orchestrator.execute("p-1", &rules, &items()).await;
    assert_eq!(verdicts.len(), 1);
    assert!(orchestrator.session("p-1").await.is_none());
}
