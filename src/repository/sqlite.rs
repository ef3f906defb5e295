use async_trait::async_trait;
use chrono::Utc;
use sqlx::pool::PoolConnection;
use sqlx::{Connection, Row, Sqlite, SqliteConnection, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::{ItemRepository, RepositoryProvider};
use crate::error::{PipelineError, PipelineResult};
use crate::generation::TestCase;
use crate::state_machine::{CustomRule, ItemInput, ItemStatus, Severity, SourceType};

/// Table and query layout of one storage schema.
#[derive(Debug)]
pub struct ItemSchema {
    pub item_table: &'static str,
    /// Value of `project_custom_rule.project_type` for this schema.
    pub project_type: &'static str,
    fetch_input: &'static str,
    insert_test_case: &'static str,
}

const TRACKED: ItemSchema = ItemSchema {
    item_table: "scheduled_job_issue",
    project_type: "jira",
    fetch_input: r#"
        SELECT sji.summary AS summary,
               sji.description AS description,
               jpc.frameworks AS frameworks,
               sj.project_id AS project_id
        FROM scheduled_job_issue sji
        JOIN scheduled_job sj ON sji.job_id = sj.id
        LEFT JOIN jira_project_compliance jpc ON sj.project_id = jpc.project_id
        WHERE sji.id = ? AND sji.status = 'pending'
    "#,
    insert_test_case: r#"
        INSERT INTO scheduled_job_issue_test_case (id, issue_id, summary, description)
        VALUES (?, ?, ?, ?)
    "#,
};

const STANDALONE: ItemSchema = ItemSchema {
    item_table: "standalone_scheduled_job_requirement",
    project_type: "standalone",
    fetch_input: r#"
        SELECT r.name AS summary,
               r.content AS description,
               spc.frameworks AS frameworks,
               j.project_id AS project_id
        FROM standalone_scheduled_job_requirement r
        JOIN standalone_scheduled_job j ON r.job_id = j.id
        LEFT JOIN standalone_project_compliance spc ON j.project_id = spc.project_id
        WHERE r.id = ? AND r.status = 'pending'
    "#,
    insert_test_case: r#"
        INSERT INTO standalone_scheduled_job_requirement_test_case
            (id, requirement_id, summary, description, generated_by)
        VALUES (?, ?, ?, ?, 'ai')
    "#,
};

const CUSTOM_RULES: &str = r#"
    SELECT title, description, severity
    FROM project_custom_rule
    WHERE project_id = ? AND project_type = ? AND is_active = 1
    ORDER BY rowid
"#;

impl ItemSchema {
    pub fn for_source(source: SourceType) -> &'static ItemSchema {
        match source {
            SourceType::Tracked => &TRACKED,
            SourceType::Standalone => &STANDALONE,
        }
    }

    /// Status update guarded by the statuses the target may be reached from.
    fn transition_sql(&self, to: ItemStatus) -> String {
        let from = to
            .sources()
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE {} SET status = ?, reason = ?, updated_at = ? WHERE id = ? AND status IN ({from})",
            self.item_table
        )
    }
}

/// SQLite-backed repository holding one pooled connection for the lifetime
/// of an item invocation.
pub struct SqlItemRepository {
    source: SourceType,
    schema: &'static ItemSchema,
    conn: Mutex<PoolConnection<Sqlite>>,
}

impl SqlItemRepository {
    pub fn new(source: SourceType, conn: PoolConnection<Sqlite>) -> Self {
        Self {
            source,
            schema: ItemSchema::for_source(source),
            conn: Mutex::new(conn),
        }
    }

    async fn transition(
        &self,
        item_id: &str,
        to: ItemStatus,
        reason: Option<&str>,
    ) -> PipelineResult<()> {
        let mut guard = self.conn.lock().await;
        let conn: &mut SqliteConnection = &mut guard;

        let result = sqlx::query(&self.schema.transition_sql(to))
            .bind(to.as_str())
            .bind(reason)
            .bind(Utc::now().to_rfc3339())
            .bind(item_id)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 1 {
            debug!(item_id, status = %to, "status updated");
            return Ok(());
        }

        let current: Option<String> = sqlx::query_scalar(&format!(
            "SELECT status FROM {} WHERE id = ?",
            self.schema.item_table
        ))
        .bind(item_id)
        .fetch_optional(&mut *conn)
        .await?;

        match current {
            None => Err(PipelineError::NotFound(item_id.to_string())),
            // Someone else claimed it first: same as a redelivery.
            Some(_) if to == ItemStatus::InProgress => Err(PipelineError::NotFound(item_id.to_string())),
            Some(from) => Err(PipelineError::IllegalTransition {
                item_id: item_id.to_string(),
                from,
                to: to.to_string(),
            }),
        }
    }
}

#[async_trait]
impl ItemRepository for SqlItemRepository {
    fn source(&self) -> SourceType {
        self.source
    }

    #[instrument(skip(self), fields(source = %self.source))]
    async fn fetch_input(&self, item_id: &str) -> PipelineResult<ItemInput> {
        let mut guard = self.conn.lock().await;
        let conn: &mut SqliteConnection = &mut guard;

        let row = sqlx::query(self.schema.fetch_input)
            .bind(item_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| PipelineError::NotFound(item_id.to_string()))?;

        let frameworks: Option<String> = row.try_get("frameworks")?;
        let compliance_frameworks = match frameworks {
            Some(json) if !json.trim().is_empty() => serde_json::from_str::<Vec<String>>(&json)?,
            _ => Vec::new(),
        };
        let project_id: String = row.try_get("project_id")?;

        let rows = sqlx::query(CUSTOM_RULES)
            .bind(&project_id)
            .bind(self.schema.project_type)
            .fetch_all(&mut *conn)
            .await?;
        let custom_rules = rows
            .iter()
            .map(|r| -> PipelineResult<CustomRule> {
                let severity: String = r.try_get("severity")?;
                Ok(CustomRule {
                    title: r.try_get("title")?,
                    description: r.try_get("description")?,
                    severity: severity.parse::<Severity>().map_err(PipelineError::Validation)?,
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        Ok(ItemInput {
            compliance_frameworks,
            custom_rules,
            summary: row.try_get("summary")?,
            description: row
                .try_get::<Option<String>, _>("description")?
                .unwrap_or_default(),
        })
    }

    async fn mark_in_progress(&self, item_id: &str) -> PipelineResult<()> {
        self.transition(item_id, ItemStatus::InProgress, None).await
    }

    async fn mark_failed(&self, item_id: &str, reason: &str) -> PipelineResult<()> {
        if reason.trim().is_empty() {
            return Err(PipelineError::Validation(
                "failure reason must not be empty".into(),
            ));
        }
        self.transition(item_id, ItemStatus::Failed, Some(reason)).await
    }

    async fn mark_completed(&self, item_id: &str) -> PipelineResult<()> {
        self.transition(item_id, ItemStatus::Completed, None).await
    }

    #[instrument(skip(self, cases), fields(source = %self.source, cases = cases.len()))]
    async fn persist_test_cases(&self, item_id: &str, cases: &[TestCase]) -> PipelineResult<()> {
        let mut guard = self.conn.lock().await;
        let conn: &mut SqliteConnection = &mut guard;

        // Dropping the transaction on any early return rolls it back.
        let mut tx = conn.begin().await?;
        for case in cases {
            sqlx::query(self.schema.insert_test_case)
                .bind(&case.id)
                .bind(item_id)
                .bind(&case.summary)
                .bind(case.description_json()?)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!(item_id, "test cases stored");
        Ok(())
    }
}

/// Opens repositories over a shared pool, one connection per invocation.
#[derive(Clone)]
pub struct SqliteRepositories {
    pool: SqlitePool,
}

impl SqliteRepositories {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositories {
    async fn open(&self, source: SourceType) -> PipelineResult<Box<dyn ItemRepository>> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(SqlItemRepository::new(source, conn)))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Inserts a pending item plus its job, project compliance and rules.
    pub(crate) async fn seed_item(
        pool: &SqlitePool,
        source: SourceType,
        item_id: &str,
        summary: &str,
        description: &str,
        frameworks: &[&str],
        rules: &[CustomRule],
    ) {
        let job_id = format!("job-{item_id}");
        let project_id = format!("project-{item_id}");
        let frameworks = serde_json::to_string(frameworks).unwrap();
        let statements: [(&str, Vec<&str>); 3] = match source {
            SourceType::Tracked => [
                (
                    "INSERT INTO jira_project_compliance (project_id, frameworks) VALUES (?, ?)",
                    vec![project_id.as_str(), frameworks.as_str()],
                ),
                (
                    "INSERT INTO scheduled_job (id, project_id) VALUES (?, ?)",
                    vec![job_id.as_str(), project_id.as_str()],
                ),
                (
                    "INSERT INTO scheduled_job_issue (id, job_id, summary, description) VALUES (?, ?, ?, ?)",
                    vec![item_id, job_id.as_str(), summary, description],
                ),
            ],
            SourceType::Standalone => [
                (
                    "INSERT INTO standalone_project_compliance (project_id, frameworks) VALUES (?, ?)",
                    vec![project_id.as_str(), frameworks.as_str()],
                ),
                (
                    "INSERT INTO standalone_scheduled_job (id, project_id) VALUES (?, ?)",
                    vec![job_id.as_str(), project_id.as_str()],
                ),
                (
                    "INSERT INTO standalone_scheduled_job_requirement (id, job_id, name, content) VALUES (?, ?, ?, ?)",
                    vec![item_id, job_id.as_str(), summary, description],
                ),
            ],
        };
        for (sql, binds) in statements {
            let mut query = sqlx::query(sql);
            for value in binds {
                query = query.bind(value);
            }
            query.execute(pool).await.unwrap();
        }

        let project_type = ItemSchema::for_source(source).project_type;
        for (i, rule) in rules.iter().enumerate() {
            sqlx::query(
                "INSERT INTO project_custom_rule (id, project_id, project_type, title, description, severity) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(format!("rule-{item_id}-{i}"))
            .bind(&project_id)
            .bind(project_type)
            .bind(&rule.title)
            .bind(&rule.description)
            .bind(serde_json::to_value(rule.severity).unwrap().as_str().unwrap().to_string())
            .execute(pool)
            .await
            .unwrap();
        }
    }

    pub(crate) async fn status_of(
        pool: &SqlitePool,
        source: SourceType,
        item_id: &str,
    ) -> (String, Option<String>) {
        let row = sqlx::query(&format!(
            "SELECT status, reason FROM {} WHERE id = ?",
            ItemSchema::for_source(source).item_table
        ))
        .bind(item_id)
        .fetch_one(pool)
        .await
        .unwrap();
        (row.get("status"), row.get("reason"))
    }

    pub(crate) async fn stored_cases(pool: &SqlitePool, source: SourceType, item_id: &str) -> Vec<String> {
        let sql = match source {
            SourceType::Tracked => {
                "SELECT description FROM scheduled_job_issue_test_case WHERE issue_id = ? ORDER BY rowid"
            }
            SourceType::Standalone => {
                "SELECT description FROM standalone_scheduled_job_requirement_test_case \
                 WHERE requirement_id = ? ORDER BY rowid"
            }
        };
        sqlx::query_scalar(sql)
            .bind(item_id)
            .fetch_all(pool)
            .await
            .unwrap()
    }
}
