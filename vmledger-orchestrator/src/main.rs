use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use vmledger_orchestrator::config::OrchestratorConfig;
use vmledger_orchestrator::http::{self, AppState};
use vmledger_orchestrator::provider_manager::ProviderManager;
use vmledger_orchestrator::repository::PgInstanceRepository;
use vmledger_orchestrator::sync_job::{self, ProviderLocks, SyncContext};
use vmledger_orchestrator::task_reporter::PgTaskReporter;
use vmledger_orchestrator::{commands, migrations, ReconciliationDriver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = OrchestratorConfig::from_env()?;

    // Connect to Postgres
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    sqlx::query("SELECT 1").execute(&pool).await?;
    tracing::info!("connected to database");

    migrations::run_inline_migrations(&pool)
        .await
        .context("failed to run migrations")?;

    let cancel = CancellationToken::new();
    let tasks = Arc::new(PgTaskReporter::new(pool.clone()));
    let driver = Arc::new(ReconciliationDriver::new(
        Arc::new(PgInstanceRepository::new(pool.clone())),
        tasks.clone(),
    ));
    let ctx = SyncContext {
        driver,
        resolver: Arc::new(ProviderManager::new(pool.clone())),
        locks: ProviderLocks::new(),
        cancel: cancel.clone(),
    };

    // job-port-sync
    match config.port_sync_interval {
        Some(every) => {
            let ctx = ctx.clone();
            tokio::spawn(sync_job::run(ctx, every, config.port_sync_on_startup));
        }
        None if config.port_sync_on_startup => {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                if let Err(e) = sync_job::sync_all_providers(&ctx).await {
                    tracing::error!(error = %e, "startup port mapping sync failed");
                }
            });
        }
        None => tracing::info!("periodic port mapping sync disabled"),
    }

    // Redis command listener (optional)
    if let Some(redis_url) = &config.redis_url {
        let redis_client = redis::Client::open(redis_url.as_str()).context("invalid REDIS_URL")?;
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = commands::listen(redis_client, ctx).await {
                tracing::error!(error = %e, "redis command listener stopped");
            }
        });
    } else {
        tracing::info!("REDIS_URL not set, command listener disabled");
    }

    let state = Arc::new(AppState {
        db: pool,
        sync: ctx,
        tasks,
    });
    let app = http::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    tracing::info!(%addr, "orchestrator listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    tracing::info!("orchestrator stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM after cancelling every in-flight pass.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
    cancel.cancel();
}
