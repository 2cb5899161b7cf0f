//! Database initialization
//!
//! Connects the MySQL pool and creates the six tables if they do not exist.
//! Every child table references `projects` with `ON DELETE CASCADE`, so
//! deleting a project removes its fields, files, file fields and risks.

use crate::config::DatabaseConfig;
use crate::Result;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::time::Duration;
use tracing::info;

/// Table names in creation order (parents first)
pub const TABLES: &[&str] = &[
    "projects",
    "project_fields",
    "project_files",
    "file_fields",
    "audit_risks",
    "audit_rules",
];

/// Connect to MySQL and make sure the schema exists
pub async fn init_database(config: &DatabaseConfig) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.url())
        .await?;

    info!(
        host = %config.host,
        port = config.port,
        database = %config.name,
        "Connected to MySQL"
    );

    create_schema(&pool).await?;
    Ok(pool)
}

/// Idempotent schema creation (safe to call on every start)
pub async fn create_schema(pool: &MySqlPool) -> Result<()> {
    create_projects_table(pool).await?;
    create_project_fields_table(pool).await?;
    create_project_files_table(pool).await?;
    create_file_fields_table(pool).await?;
    create_audit_risks_table(pool).await?;
    create_audit_rules_table(pool).await?;
    widen_evidence_pages(pool).await?;

    info!("Database tables initialized ({})", TABLES.join(", "));
    Ok(())
}

/// Tables created before page numbers were 64-bit carry an INT column
async fn widen_evidence_pages(pool: &MySqlPool) -> Result<()> {
    for table in ["project_fields", "file_fields"] {
        sqlx::query(&format!(
            "ALTER TABLE {} MODIFY COLUMN evidence_page BIGINT NULL",
            table
        ))
        .execute(pool)
        .await?;
    }
    Ok(())
}

async fn create_projects_table(pool: &MySqlPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id CHAR(36) NOT NULL PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            status VARCHAR(32) NOT NULL DEFAULT 'uploading',
            tender_file_id VARCHAR(255) NULL,
            tender_dataset_id VARCHAR(255) NULL,
            tender_preview_url TEXT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
            INDEX idx_projects_status (status)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_project_fields_table(pool: &MySqlPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS project_fields (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            project_id CHAR(36) NOT NULL,
            field_code VARCHAR(128) NOT NULL,
            field_name VARCHAR(255) NOT NULL DEFAULT '',
            field_value TEXT NULL,
            status VARCHAR(16) NOT NULL DEFAULT 'auto',
            evidence_page BIGINT NULL,
            evidence_snippet TEXT NULL,
            evidence_bbox TEXT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
            UNIQUE KEY uk_project_field (project_id, field_code),
            CONSTRAINT fk_project_fields_project FOREIGN KEY (project_id)
                REFERENCES projects (id) ON DELETE CASCADE
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_project_files_table(pool: &MySqlPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS project_files (
            id CHAR(36) NOT NULL PRIMARY KEY,
            project_id CHAR(36) NOT NULL,
            file_name VARCHAR(512) NOT NULL,
            mime_type VARCHAR(128) NULL,
            agent_file_id VARCHAR(255) NULL,
            dataset_id VARCHAR(255) NULL,
            preview_url TEXT NULL,
            is_tender TINYINT(1) NOT NULL DEFAULT 0,
            doc_type_code VARCHAR(64) NULL,
            doc_type_name VARCHAR(255) NULL,
            status VARCHAR(16) NOT NULL DEFAULT 'pending',
            extraction_status VARCHAR(16) NOT NULL DEFAULT 'pending',
            error_message TEXT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
            INDEX idx_project_files_project (project_id),
            CONSTRAINT fk_project_files_project FOREIGN KEY (project_id)
                REFERENCES projects (id) ON DELETE CASCADE
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_file_fields_table(pool: &MySqlPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_fields (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            file_id CHAR(36) NOT NULL,
            project_id CHAR(36) NOT NULL,
            field_code VARCHAR(128) NOT NULL,
            field_name VARCHAR(255) NOT NULL DEFAULT '',
            field_value TEXT NULL,
            status VARCHAR(16) NOT NULL DEFAULT 'auto',
            evidence_page BIGINT NULL,
            evidence_snippet TEXT NULL,
            evidence_bbox TEXT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
            UNIQUE KEY uk_file_field (file_id, field_code),
            INDEX idx_file_fields_project (project_id),
            CONSTRAINT fk_file_fields_file FOREIGN KEY (file_id)
                REFERENCES project_files (id) ON DELETE CASCADE,
            CONSTRAINT fk_file_fields_project FOREIGN KEY (project_id)
                REFERENCES projects (id) ON DELETE CASCADE
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_audit_risks_table(pool: &MySqlPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_risks (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            project_id CHAR(36) NOT NULL,
            rule_code VARCHAR(128) NOT NULL,
            rule_name VARCHAR(255) NOT NULL,
            severity VARCHAR(16) NOT NULL DEFAULT 'medium',
            description TEXT NULL,
            suggestion TEXT NULL,
            evidence LONGTEXT NULL,
            status VARCHAR(16) NOT NULL DEFAULT 'pending',
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
            INDEX idx_audit_risks_project (project_id),
            CONSTRAINT fk_audit_risks_project FOREIGN KEY (project_id)
                REFERENCES projects (id) ON DELETE CASCADE
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_audit_rules_table(pool: &MySqlPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_rules (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            source_id VARCHAR(64) NULL,
            rule_code VARCHAR(128) NOT NULL,
            rule_name VARCHAR(255) NOT NULL,
            description TEXT NULL,
            category VARCHAR(128) NULL,
            stage VARCHAR(128) NULL,
            is_enabled TINYINT(1) NOT NULL DEFAULT 1,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
            UNIQUE KEY uk_audit_rule_code (rule_code)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
