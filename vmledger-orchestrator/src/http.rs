use axum::http::StatusCode;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::json;
use sqlx::{Pool, Postgres};
use std::sync::Arc;
use uuid::Uuid;
use vmledger_common::QuotaUsage;

use crate::sync_job::{self, SyncContext};
use crate::task_reporter::{PgTaskReporter, TASK_TYPE_SYNC_PORT_MAPPINGS};

pub struct AppState {
    pub db: Pool<Postgres>,
    pub sync: SyncContext,
    pub tasks: Arc<PgTaskReporter>,
}

/// Admin API, internal health/debug only.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/admin/status", get(get_status))
        .route(
            "/admin/providers/:provider_id/sync-port-mappings",
            post(trigger_port_sync),
        )
        .route("/admin/providers/:provider_id/quota", get(get_quota))
        .route("/admin/tasks/:task_id", get(get_task))
        .with_state(state)
}

async fn root() -> &'static str {
    "VMLedger Orchestrator Online (Postgres Backed)"
}

async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let row: Result<(i64, i64), sqlx::Error> = sqlx::query_as(
        "SELECT
           (SELECT COUNT(*) FROM instances WHERE deleted_at IS NULL),
           (SELECT COUNT(*) FROM providers WHERE status = 'active')",
    )
    .fetch_one(&state.db)
    .await;

    match row {
        Ok((instances, providers)) => Json(json!({
            "instances_count": instances,
            "active_providers_count": providers,
        }))
        .into_response(),
        Err(e) => internal_error(e),
    }
}

async fn trigger_port_sync(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<Uuid>,
) -> impl IntoResponse {
    let Some(guard) = state.sync.locks.try_acquire(provider_id) else {
        return (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "already_running",
                "message": format!("a port mapping sync is already running for provider {}", provider_id),
            })),
        )
            .into_response();
    };

    match state.sync.driver.repository().find_provider(provider_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "provider_not_found" })),
            )
                .into_response()
        }
        Err(e) => return internal_error(e),
    }

    let task_id = match state
        .sync
        .driver
        .reporter()
        .create_task(provider_id, TASK_TYPE_SYNC_PORT_MAPPINGS)
        .await
    {
        Ok(id) => id,
        Err(e) => return internal_error(e),
    };

    let ctx = state.sync.clone();
    tokio::spawn(async move {
        if let Err(e) = sync_job::sync_locked(&ctx, guard, Some(task_id)).await {
            tracing::warn!(%provider_id, %task_id, error = %e, "admin port mapping sync failed");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "task_id": task_id,
            "provider_id": provider_id,
            "status": "pending",
        })),
    )
        .into_response()
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.tasks.get_task(task_id).await {
        Ok(Some(task)) => Json(task).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({ "error": "task_not_found" }))).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn get_quota(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<Uuid>,
) -> impl IntoResponse {
    let rows: Result<Vec<(String, i64)>, sqlx::Error> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM instances WHERE provider_id = $1 GROUP BY status",
    )
    .bind(provider_id)
    .fetch_all(&state.db)
    .await;

    match rows {
        Ok(rows) => {
            let usage = QuotaUsage::from_counts(rows.iter().map(|(s, n)| (s.as_str(), *n)));
            Json(json!({
                "provider_id": provider_id,
                "reserved": usage.reserved(),
                "usage": usage,
            }))
            .into_response()
        }
        Err(e) => internal_error(e),
    }
}

fn internal_error(e: impl std::fmt::Display) -> axum::response::Response {
    tracing::error!(error = %e, "admin request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal_error", "message": e.to_string() })),
    )
        .into_response()
}
