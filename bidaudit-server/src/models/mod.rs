//! Data models for bidaudit-server
//!
//! - Audit session state machine and verdicts
//! - Background task records

pub mod audit_session;
pub mod task;

pub use audit_session::{
    AuditItem, AuditProgress, AuditSession, AuditVerdict, RuleRun, RuleRunState, SessionState,
    VerdictOutcome,
};
pub use task::{TaskKind, TaskRecord, TaskStatus};
