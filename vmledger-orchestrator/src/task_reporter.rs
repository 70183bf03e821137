use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;
use vmledger_common::{RepositoryError, Task};

use crate::logger;

pub const TASK_TYPE_SYNC_PORT_MAPPINGS: &str = "sync_port_mappings";

/// Sink for task progress and completion. Purely observational: failures are
/// logged by callers and never change the outcome of a pass.
#[async_trait]
pub trait TaskReporter: Send + Sync {
    async fn create_task(&self, provider_id: Uuid, task_type: &str)
        -> Result<Uuid, RepositoryError>;

    async fn report_progress(
        &self,
        task_id: Uuid,
        percent: u8,
        message: &str,
    ) -> Result<(), RepositoryError>;

    async fn report_completion(
        &self,
        task_id: Uuid,
        success: bool,
        summary: &str,
        error: Option<&str>,
    ) -> Result<(), RepositoryError>;
}

/// Reports to the tracing subscriber only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTaskReporter;

#[async_trait]
impl TaskReporter for LogTaskReporter {
    async fn create_task(
        &self,
        provider_id: Uuid,
        task_type: &str,
    ) -> Result<Uuid, RepositoryError> {
        let task_id = Uuid::new_v4();
        tracing::debug!(%task_id, %provider_id, task_type, "task created");
        Ok(task_id)
    }

    async fn report_progress(
        &self,
        task_id: Uuid,
        percent: u8,
        message: &str,
    ) -> Result<(), RepositoryError> {
        tracing::debug!(%task_id, percent, "{}", message);
        Ok(())
    }

    async fn report_completion(
        &self,
        task_id: Uuid,
        success: bool,
        summary: &str,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        if success {
            tracing::info!(%task_id, "{}", summary);
        } else {
            tracing::error!(%task_id, error = error.unwrap_or(""), "{}", summary);
        }
        Ok(())
    }
}

/// Persists progress into the `tasks` table.
pub struct PgTaskReporter {
    db: Pool<Postgres>,
}

impl PgTaskReporter {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }

    pub async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>, RepositoryError> {
        let task = sqlx::query_as::<_, Task>(
            "SELECT id, provider_id, task_type, status, progress, message, error_message, created_at, completed_at
             FROM tasks WHERE id = $1",
        )
        .bind(task_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(task)
    }
}

#[async_trait]
impl TaskReporter for PgTaskReporter {
    async fn create_task(
        &self,
        provider_id: Uuid,
        task_type: &str,
    ) -> Result<Uuid, RepositoryError> {
        let task_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO tasks (id, provider_id, task_type, status, progress, created_at)
             VALUES ($1, $2, $3, 'pending', 0, NOW())",
        )
        .bind(task_id)
        .bind(provider_id)
        .bind(task_type)
        .execute(&self.db)
        .await?;
        Ok(task_id)
    }

    async fn report_progress(
        &self,
        task_id: Uuid,
        percent: u8,
        message: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE tasks
             SET status = 'running', progress = $2, message = $3
             WHERE id = $1 AND status IN ('pending', 'running')",
        )
        .bind(task_id)
        .bind(i32::from(percent.min(100)))
        .bind(message)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn report_completion(
        &self,
        task_id: Uuid,
        success: bool,
        summary: &str,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let status = if success { "completed" } else { "failed" };
        let provider_id: Option<Option<Uuid>> = sqlx::query_scalar(
            "UPDATE tasks
             SET status = $2, progress = 100, message = $3, error_message = $4, completed_at = NOW()
             WHERE id = $1
             RETURNING provider_id",
        )
        .bind(task_id)
        .bind(status)
        .bind(summary)
        .bind(error)
        .fetch_optional(&self.db)
        .await?;

        let log_status = if success { "success" } else { "failed" };
        logger::log_event_with_metadata(
            &self.db,
            "PORT_MAPPING_SYNC",
            log_status,
            provider_id.flatten(),
            None,
            error,
            Some(serde_json::json!({ "task_id": task_id, "summary": summary })),
        )
        .await?;
        Ok(())
    }
}
