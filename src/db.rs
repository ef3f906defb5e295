//! SQLite connection pool and schema bootstrap.

use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jira_project_compliance (
    project_id  TEXT PRIMARY KEY,
    frameworks  TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS scheduled_job (
    id          TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL,
    name        TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS scheduled_job_issue (
    id          TEXT PRIMARY KEY,
    job_id      TEXT NOT NULL REFERENCES scheduled_job(id) ON DELETE CASCADE,
    summary     TEXT NOT NULL,
    description TEXT,
    status      TEXT NOT NULL DEFAULT 'pending',
    reason      TEXT,
    updated_at  TEXT
);
CREATE INDEX IF NOT EXISTS idx_scheduled_job_issue_job_id ON scheduled_job_issue(job_id);

CREATE TABLE IF NOT EXISTS scheduled_job_issue_test_case (
    id          TEXT PRIMARY KEY,
    issue_id    TEXT NOT NULL REFERENCES scheduled_job_issue(id) ON DELETE CASCADE,
    summary     TEXT NOT NULL,
    description TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_scheduled_job_issue_test_case_issue_id
    ON scheduled_job_issue_test_case(issue_id);

CREATE TABLE IF NOT EXISTS standalone_project_compliance (
    project_id  TEXT PRIMARY KEY,
    frameworks  TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS standalone_scheduled_job (
    id          TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL,
    name        TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS standalone_scheduled_job_requirement (
    id          TEXT PRIMARY KEY,
    job_id      TEXT NOT NULL REFERENCES standalone_scheduled_job(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    content     TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'pending',
    reason      TEXT,
    updated_at  TEXT
);
CREATE INDEX IF NOT EXISTS idx_standalone_scheduled_job_requirement_job_id
    ON standalone_scheduled_job_requirement(job_id);

CREATE TABLE IF NOT EXISTS standalone_scheduled_job_requirement_test_case (
    id             TEXT PRIMARY KEY,
    requirement_id TEXT NOT NULL REFERENCES standalone_scheduled_job_requirement(id) ON DELETE CASCADE,
    summary        TEXT NOT NULL,
    description    TEXT NOT NULL,
    generated_by   TEXT NOT NULL DEFAULT 'ai'
);
CREATE INDEX IF NOT EXISTS idx_standalone_requirement_test_case_requirement_id
    ON standalone_scheduled_job_requirement_test_case(requirement_id);

CREATE TABLE IF NOT EXISTS project_custom_rule (
    id           TEXT PRIMARY KEY,
    project_id   TEXT NOT NULL,
    project_type TEXT NOT NULL CHECK (project_type IN ('jira', 'standalone')),
    title        TEXT NOT NULL,
    description  TEXT NOT NULL,
    severity     TEXT NOT NULL CHECK (severity IN ('low', 'medium', 'high', 'critical')),
    is_active    INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_project_custom_rule_project
    ON project_custom_rule(project_id, project_type);

CREATE TABLE IF NOT EXISTS work_queue (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    payload     TEXT NOT NULL,
    enqueued_at TEXT NOT NULL,
    claimed_at  TEXT,
    attempts    INTEGER NOT NULL DEFAULT 0
);
"#;

/// Opens a pool against `database_url`, creating the file if needed.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid database url: {database_url}"))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .context("failed to open database pool")?;

    ensure_schema(&pool).await?;
    info!(database_url, "database ready");
    Ok(pool)
}

/// Creates every table the pipeline touches. Safe to run repeatedly.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .context("failed to create schema")?;
    Ok(())
}

/// Single-connection in-memory pool with the schema applied.
#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    ensure_schema(&pool).await.unwrap();
    pool
}
