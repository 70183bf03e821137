use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vmledger_common::{ReconcileError, RepositoryError};

use crate::provider_manager::ProviderResolver;
use crate::reconciliation::ReconciliationDriver;
use crate::report::ReconcileReport;

/// Providers with a pass in flight. Shared by every trigger (periodic job,
/// command listener, admin API).
#[derive(Clone, Default)]
pub struct ProviderLocks {
    inner: Arc<Mutex<HashSet<Uuid>>>,
}

impl ProviderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when a pass is already running for this provider.
    pub fn try_acquire(&self, provider_id: Uuid) -> Option<ProviderGuard> {
        let inserted = self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(provider_id);
        inserted.then(|| ProviderGuard {
            locks: self.clone(),
            provider_id,
        })
    }

    pub fn is_running(&self, provider_id: Uuid) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&provider_id)
    }
}

/// Releases the provider when dropped.
pub struct ProviderGuard {
    locks: ProviderLocks,
    provider_id: Uuid,
}

impl ProviderGuard {
    pub fn provider_id(&self) -> Uuid {
        self.provider_id
    }
}

impl Drop for ProviderGuard {
    fn drop(&mut self) {
        self.locks
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.provider_id);
    }
}

#[derive(Clone)]
pub struct SyncContext {
    pub driver: Arc<ReconciliationDriver>,
    pub resolver: Arc<dyn ProviderResolver>,
    pub locks: ProviderLocks,
    pub cancel: CancellationToken,
}

/// Runs one pass for `provider_id`, refusing to start when another pass for
/// the same provider is in flight. When `task_id` is given the task is always
/// completed, even if the pass never starts.
pub async fn sync_provider(
    ctx: &SyncContext,
    provider_id: Uuid,
    task_id: Option<Uuid>,
) -> Result<ReconcileReport, ReconcileError> {
    match ctx.locks.try_acquire(provider_id) {
        Some(guard) => sync_locked(ctx, guard, task_id).await,
        None => {
            tracing::info!(%provider_id, "[PortSync] sync already running, skipping");
            fail_early(ctx, task_id, ReconcileError::AlreadyRunning(provider_id)).await
        }
    }
}

/// Same as [`sync_provider`] for a caller that already holds the guard.
pub async fn sync_locked(
    ctx: &SyncContext,
    guard: ProviderGuard,
    task_id: Option<Uuid>,
) -> Result<ReconcileReport, ReconcileError> {
    let provider_id = guard.provider_id();

    let provider = match ctx.driver.repository().find_provider(provider_id).await {
        Ok(Some(p)) => p,
        Ok(None) => return fail_early(ctx, task_id, ReconcileError::ProviderNotFound(provider_id)).await,
        Err(e) => return fail_early(ctx, task_id, ReconcileError::Storage(e)).await,
    };
    let remote = match ctx.resolver.resolve(&provider).await {
        Ok(remote) => remote,
        Err(e) => return fail_early(ctx, task_id, e).await,
    };

    let result = match task_id {
        Some(task_id) => {
            ctx.driver
                .run_task(task_id, &provider, remote.as_ref(), &ctx.cancel)
                .await
        }
        None => {
            ctx.driver
                .reconcile(&provider, remote.as_ref(), &ctx.cancel)
                .await
        }
    };
    drop(guard);
    result
}

async fn fail_early(
    ctx: &SyncContext,
    task_id: Option<Uuid>,
    err: ReconcileError,
) -> Result<ReconcileReport, ReconcileError> {
    let result = Err(err);
    if let Some(task_id) = task_id {
        ctx.driver.complete_task(task_id, &result).await;
    }
    result
}

/// Result of one sweep over every active provider.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepSummary {
    pub providers: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cleaned_instances: usize,
}

/// Syncs every active provider one after the other. A failure on one provider
/// is logged and the sweep moves on.
pub async fn sync_all_providers(ctx: &SyncContext) -> Result<SweepSummary, RepositoryError> {
    let providers = ctx.driver.repository().list_active_providers().await?;
    let mut summary = SweepSummary {
        providers: providers.len(),
        ..SweepSummary::default()
    };

    for provider in providers {
        if ctx.cancel.is_cancelled() {
            break;
        }
        match sync_provider(ctx, provider.id, None).await {
            Ok(report) => {
                summary.succeeded += 1;
                summary.cleaned_instances += report.cleaned_instances;
                if report.cleaned_instances > 0 || !report.failures.is_empty() {
                    tracing::info!(provider_id = %provider.id, "{}", report.summary());
                }
            }
            Err(ReconcileError::AlreadyRunning(_)) => summary.skipped += 1,
            Err(e) => {
                summary.failed += 1;
                tracing::error!(
                    provider_id = %provider.id,
                    provider_name = %provider.name,
                    error = %e,
                    "[PortSync] provider sync failed"
                );
            }
        }
    }

    Ok(summary)
}

/// job-port-sync: periodic sweep until the context is cancelled.
pub async fn run(ctx: SyncContext, every: Duration, on_startup: bool) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    if !on_startup {
        // The first tick completes immediately.
        interval.tick().await;
    }
    tracing::info!(interval_secs = every.as_secs(), "job-port-sync started");

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        match sync_all_providers(&ctx).await {
            Ok(summary) if summary.cleaned_instances > 0 => {
                tracing::info!(
                    providers = summary.providers,
                    cleaned_instances = summary.cleaned_instances,
                    failed = summary.failed,
                    "job-port-sync: sweep done"
                );
            }
            Ok(summary) => tracing::debug!(?summary, "job-port-sync: sweep done"),
            Err(e) => tracing::error!(error = %e, "job-port-sync: failed to list providers"),
        }
    }

    tracing::info!("job-port-sync stopped");
}
