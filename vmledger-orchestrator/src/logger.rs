use sqlx::{Executor, Postgres};
use uuid::Uuid;

/// Action logger writing to `action_logs` using query() to avoid DATABASE_URL at build time.
///
/// Generic over the executor so audit rows can be written inside the same
/// transaction as the change they describe.
pub async fn log_event_with_metadata<'e, E>(
    db: E,
    action_type: &str,
    status: &str,
    provider_id: Option<Uuid>,
    instance_id: Option<Uuid>,
    error_message: Option<&str>,
    metadata: Option<serde_json::Value>,
) -> Result<Uuid, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let log_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO action_logs
         (id, action_type, component, status, error_message, provider_id, instance_id, metadata, created_at)
         VALUES ($1, $2, 'orchestrator', $3, $4, $5, $6, $7, NOW())",
    )
    .bind(log_id)
    .bind(action_type)
    .bind(status)
    .bind(error_message)
    .bind(provider_id)
    .bind(instance_id)
    .bind(metadata)
    .execute(db)
    .await?;

    tracing::debug!(%log_id, action_type, status, "action logged");
    Ok(log_id)
}
