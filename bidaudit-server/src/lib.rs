//! bidaudit-server library interface
//!
//! Exposes the router and state for integration testing

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use bidaudit_common::config::AppConfig;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::{AgentPlatform, AuditOrchestrator, TaskCenter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// MySQL connection pool
    pub db: MySqlPool,
    pub config: Arc<AppConfig>,
    /// Agent platform client (HTTP gateway in production)
    pub agent: Arc<dyn AgentPlatform>,
    /// Audit session registry
    pub audit: Arc<AuditOrchestrator>,
    /// Background task registry
    pub tasks: Arc<TaskCenter>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last background failure, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: MySqlPool,
        config: AppConfig,
        agent: Arc<dyn AgentPlatform>,
        tasks: TaskCenter,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            audit: Arc::new(AuditOrchestrator::new(agent.clone())),
            agent,
            tasks: Arc::new(tasks),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router; every endpoint lives under `/api/app`
pub fn build_router(state: AppState) -> Router {
    let max_upload = state.config.server.max_upload_bytes;

    Router::new()
        .nest("/api/app", api::routes())
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
