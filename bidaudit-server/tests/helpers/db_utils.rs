//! Database test utilities
//!
//! MySQL-backed tests run only when `BIDAUDIT_TEST_DATABASE_URL` points at a
//! disposable database; otherwise they print a notice and return.

use bidaudit_common::config::AppConfig;
use bidaudit_common::db::create_schema;
use bidaudit_common::kv_store::MemoryStore;
use bidaudit_server::services::{AgentPlatform, TaskCenter};
use bidaudit_server::AppState;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::sync::Arc;

pub const TEST_DATABASE_ENV: &str = "BIDAUDIT_TEST_DATABASE_URL";

/// Connected pool with the schema in place, or `None` when not configured
pub async fn test_pool() -> Option<MySqlPool> {
    let Ok(url) = std::env::var(TEST_DATABASE_ENV) else {
        eprintln!("{} not set, skipping MySQL test", TEST_DATABASE_ENV);
        return None;
    };
    let pool = MySqlPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("Failed to connect to test database");
    create_schema(&pool).await.expect("Failed to create schema");
    Some(pool)
}

/// Pool that never connects unless used; for endpoints that do not touch MySQL
pub fn lazy_pool() -> MySqlPool {
    MySqlPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_millis(200))
        .connect_lazy("mysql://nobody@127.0.0.1:1/none")
        .expect("Failed to build lazy pool")
}

pub fn test_state(pool: MySqlPool, config: AppConfig, agent: Arc<dyn AgentPlatform>) -> AppState {
    let tasks = TaskCenter::open(Arc::new(MemoryStore::new())).expect("Failed to open task center");
    AppState::new(pool, config, agent, tasks)
}
