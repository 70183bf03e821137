use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vmledger_common::{Provider, ReconcileError};
use vmledger_providers::CloudProvider;

use crate::drift;
use crate::orphan_cleaner::OrphanCleaner;
use crate::report::{ReconcileReport, ReconcileWarning};
use crate::repository::InstanceRepository;
use crate::task_reporter::TaskReporter;

/// Port mapping sync: removes local instances (and their port mappings) that
/// the provider no longer reports.
///
/// Only existence is reconciled. Missing remote instances are never created
/// and attributes are never compared.
pub struct ReconciliationDriver {
    repo: Arc<dyn InstanceRepository>,
    reporter: Arc<dyn TaskReporter>,
}

impl ReconciliationDriver {
    pub fn new(repo: Arc<dyn InstanceRepository>, reporter: Arc<dyn TaskReporter>) -> Self {
        Self { repo, reporter }
    }

    pub fn repository(&self) -> &Arc<dyn InstanceRepository> {
        &self.repo
    }

    pub fn reporter(&self) -> &Arc<dyn TaskReporter> {
        &self.reporter
    }

    /// One pass for one provider, without task tracking.
    ///
    /// Concurrent passes for the same provider must be serialized by the
    /// caller.
    pub async fn reconcile(
        &self,
        provider: &Provider,
        remote: &dyn CloudProvider,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, ReconcileError> {
        self.pass(provider, remote, cancel, None).await
    }

    /// Same as [`reconcile`](Self::reconcile), reporting progress and the final
    /// outcome against `task_id`.
    pub async fn run_task(
        &self,
        task_id: Uuid,
        provider: &Provider,
        remote: &dyn CloudProvider,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, ReconcileError> {
        self.progress(Some(task_id), 5, "Starting port mapping sync...")
            .await;

        let result = self.pass(provider, remote, cancel, Some(task_id)).await;

        if result.is_ok() {
            self.progress(Some(task_id), 90, "Sync finished, generating report...")
                .await;
        }
        self.complete_task(task_id, &result).await;
        result
    }

    pub async fn complete_task(
        &self,
        task_id: Uuid,
        result: &Result<ReconcileReport, ReconcileError>,
    ) {
        let res = match result {
            Ok(report) => {
                self.reporter
                    .report_completion(task_id, true, &report.summary(), None)
                    .await
            }
            Err(e) => {
                let message = format!("Port mapping sync failed: {}", e);
                self.reporter
                    .report_completion(task_id, false, &message, Some(&e.to_string()))
                    .await
            }
        };
        if let Err(e) = res {
            tracing::error!(%task_id, error = %e, "[PortSync] failed to complete task");
        }
    }

    async fn progress(&self, task_id: Option<Uuid>, percent: u8, message: &str) {
        let Some(task_id) = task_id else {
            return;
        };
        if let Err(e) = self
            .reporter
            .report_progress(task_id, percent, message)
            .await
        {
            tracing::warn!(%task_id, error = %e, "[PortSync] failed to report progress");
        }
    }

    async fn pass(
        &self,
        provider: &Provider,
        remote: &dyn CloudProvider,
        cancel: &CancellationToken,
        task_id: Option<Uuid>,
    ) -> Result<ReconcileReport, ReconcileError> {
        if !provider.is_active() {
            return Err(ReconcileError::ProviderInactive {
                name: provider.name.clone(),
                status: provider.status.clone(),
            });
        }

        tracing::info!(
            provider_id = %provider.id,
            provider_name = %provider.name,
            provider_code = remote.code(),
            "[PortSync] starting port mapping sync"
        );
        let mut report = ReconcileReport::new(provider.id, &provider.name);

        self.progress(task_id, 10, "Checking provider connection...")
            .await;
        remote
            .check_connection()
            .await
            .map_err(|e| ReconcileError::connectivity(&provider.name, format!("{:#}", e)))?;

        self.progress(
            task_id,
            20,
            &format!("Syncing port mappings of provider {}...", provider.name),
        )
        .await;

        // No ordering dependency between the two listings.
        let remote_listing = async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                res = remote.list_instances() => Some(res),
            }
        };
        let (remote_res, local_res) = tokio::join!(
            remote_listing,
            self.repo.find_non_terminal_instances(provider.id)
        );

        let remote_instances = match remote_res {
            None => {
                tracing::info!(
                    provider_id = %provider.id,
                    "[PortSync] cancelled while listing provider instances"
                );
                if let Err(e) = &local_res {
                    tracing::warn!(
                        provider_id = %provider.id,
                        error = %e,
                        "[PortSync] local instance query failed during cancelled pass"
                    );
                }
                report.cancelled = true;
                return Ok(report);
            }
            Some(res) => res.map_err(|e| {
                ReconcileError::connectivity(&provider.name, format!("failed to list instances: {:#}", e))
            })?,
        };
        tracing::debug!(
            provider_id = %provider.id,
            remote_count = remote_instances.len(),
            "[PortSync] fetched provider instances"
        );

        let local_instances = local_res.map_err(ReconcileError::Query)?;
        tracing::debug!(
            provider_id = %provider.id,
            local_count = local_instances.len(),
            "[PortSync] fetched local instances"
        );

        let drift = drift::detect_orphans(&remote_instances, local_instances);
        report.checked = drift.checked;
        report.orphans_found = drift.orphans.len();

        for name in &drift.duplicate_remote_names {
            tracing::warn!(
                provider_id = %provider.id,
                instance_name = %name,
                "[PortSync] provider reported duplicate instance name; treating it as present"
            );
            report
                .warnings
                .push(ReconcileWarning::DuplicateRemoteName { name: name.clone() });
        }

        if !drift.has_orphans() {
            tracing::debug!(provider_id = %provider.id, "[PortSync] no orphaned instances");
            return Ok(report);
        }

        tracing::info!(
            provider_id = %provider.id,
            count = drift.orphans.len(),
            "[PortSync] orphaned instances found"
        );
        self.progress(
            task_id,
            60,
            &format!("Cleaning {} orphaned instances...", drift.orphans.len()),
        )
        .await;

        let outcome = OrphanCleaner::new(self.repo.as_ref(), cancel)
            .clean(&drift.orphans)
            .await;

        report.processed_orphans = outcome.processed_orphans;
        report.cleaned_instances = outcome.cleaned_instances;
        report.cleaned_port_mappings = outcome.cleaned_port_mappings;
        report.cleaned_instance_names = outcome.cleaned_instance_names;
        report.failures = outcome.failures;
        report.warnings.extend(outcome.warnings);
        report.cancelled = outcome.cancelled;

        tracing::info!(
            provider_id = %provider.id,
            provider_name = %provider.name,
            checked_instances = report.checked,
            cleaned_instances = report.cleaned_instances,
            cleaned_ports = report.cleaned_port_mappings,
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "[PortSync] port mapping sync finished"
        );

        Ok(report)
    }
}
