use tokio_util::sync::CancellationToken;
use vmledger_common::{LocalInstance, RepositoryError};

use crate::report::{OrphanFailure, ReconcileWarning};
use crate::repository::{InstanceRepository, InstanceTransaction};

/// Accumulated result of cleaning a batch of orphans.
#[derive(Debug, Clone, Default)]
pub struct CleanupOutcome {
    pub processed_orphans: usize,
    pub cleaned_instances: usize,
    pub cleaned_port_mappings: u64,
    pub cleaned_instance_names: Vec<String>,
    pub failures: Vec<OrphanFailure>,
    pub warnings: Vec<ReconcileWarning>,
    pub cancelled: bool,
}

#[derive(Debug)]
struct CleanedOrphan {
    port_mappings_found: u64,
    port_mappings_removed: u64,
    port_mapping_error: Option<String>,
}

/// Removes orphans one transaction at a time.
///
/// Each orphan gets its own short transaction, so a failure on one record
/// rolls back only that record and never touches cleanups already committed.
pub struct OrphanCleaner<'a> {
    repo: &'a dyn InstanceRepository,
    cancel: &'a CancellationToken,
}

impl<'a> OrphanCleaner<'a> {
    pub fn new(repo: &'a dyn InstanceRepository, cancel: &'a CancellationToken) -> Self {
        Self { repo, cancel }
    }

    pub async fn clean(&self, orphans: &[LocalInstance]) -> CleanupOutcome {
        let mut outcome = CleanupOutcome::default();

        for (idx, orphan) in orphans.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::info!(
                    remaining = orphans.len() - idx,
                    cleaned = outcome.cleaned_instances,
                    "[PortSync] cancellation requested, abandoning remaining orphans"
                );
                outcome.cancelled = true;
                break;
            }

            match self.clean_one(orphan).await {
                Ok(cleaned) => {
                    outcome.processed_orphans += 1;
                    outcome.cleaned_instances += 1;
                    outcome.cleaned_port_mappings += cleaned.port_mappings_removed;
                    outcome.cleaned_instance_names.push(orphan.name.clone());

                    if let Some(error) = cleaned.port_mapping_error {
                        outcome.warnings.push(ReconcileWarning::PortMappingCleanupFailed {
                            instance_id: orphan.id,
                            instance_name: orphan.name.clone(),
                            error,
                        });
                    }

                    tracing::info!(
                        instance_id = %orphan.id,
                        instance_name = %orphan.name,
                        port_mappings = cleaned.port_mappings_found,
                        "[PortSync] orphaned instance cleaned"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        instance_id = %orphan.id,
                        instance_name = %orphan.name,
                        error = %e,
                        "[PortSync] orphan cleanup transaction failed"
                    );
                    outcome.failures.push(OrphanFailure {
                        instance_id: orphan.id,
                        instance_name: orphan.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        outcome
    }

    async fn clean_one(&self, orphan: &LocalInstance) -> Result<CleanedOrphan, RepositoryError> {
        let mut tx = self.repo.begin().await?;

        let port_mappings_found = match tx.count_port_mappings(orphan.id).await {
            Ok(n) => n,
            Err(e) => {
                rollback(tx, orphan).await;
                return Err(e);
            }
        };

        // Best effort: the instance is removed even if its mappings are not.
        let (port_mappings_removed, port_mapping_error) =
            match tx.delete_port_mappings(orphan.id).await {
                Ok(n) => (n, None),
                Err(e) => {
                    tracing::warn!(
                        instance_id = %orphan.id,
                        instance_name = %orphan.name,
                        error = %e,
                        "[PortSync] failed to delete port mappings of orphaned instance"
                    );
                    (0, Some(e.to_string()))
                }
            };

        if let Err(e) = tx.soft_delete_instance(orphan).await {
            rollback(tx, orphan).await;
            return Err(e);
        }

        tx.commit().await?;

        Ok(CleanedOrphan {
            port_mappings_found,
            port_mappings_removed,
            port_mapping_error,
        })
    }
}

async fn rollback(tx: Box<dyn InstanceTransaction>, orphan: &LocalInstance) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(
            instance_id = %orphan.id,
            error = %e,
            "[PortSync] rollback failed (transaction is discarded on drop)"
        );
    }
}
