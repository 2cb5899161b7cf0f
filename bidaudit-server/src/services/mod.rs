//! Service modules for the bid audit backend
//!
//! - Outbound clients: agent platform and data hub
//! - Extraction, classification and audit verdict parsing
//! - Audit orchestration, rule sync, background pipelines and the task center

pub mod agent_gateway;
pub mod audit_orchestrator;
pub mod audit_verdict;
pub mod classification;
pub mod data_hub_client;
pub mod extraction;
pub mod pipeline;
pub mod rule_sync;
pub mod task_center;

pub use agent_gateway::{AgentError, AgentGateway, AgentKind, AgentPlatform};
pub use audit_orchestrator::{AuditEvent, AuditOrchestrator};
pub use data_hub_client::{DataHubClient, DataHubError};
pub use task_center::TaskCenter;
