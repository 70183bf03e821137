use serde::Serialize;
use uuid::Uuid;

/// Non-fatal conditions observed during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileWarning {
    /// The provider reported the same name more than once.
    DuplicateRemoteName { name: String },
    /// Port mappings could not be removed but the instance was still cleaned;
    /// its mappings are left behind.
    PortMappingCleanupFailed {
        instance_id: Uuid,
        instance_name: String,
        error: String,
    },
}

/// An orphan whose transaction was rolled back. It stays in local storage and
/// will be picked up again by the next pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanFailure {
    pub instance_id: Uuid,
    pub instance_name: String,
    pub error: String,
}

/// Outcome of one reconciliation pass for one provider.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub provider_id: Uuid,
    pub provider_name: String,
    /// Local non-terminal instances compared against the provider.
    pub checked: usize,
    /// Orphans detected before cleanup started.
    pub orphans_found: usize,
    /// Orphans whose cleanup transaction committed. A port mapping failure
    /// only adds a warning.
    pub processed_orphans: usize,
    /// Instance rows removed.
    pub cleaned_instances: usize,
    pub cleaned_port_mappings: u64,
    /// In cleanup order.
    pub cleaned_instance_names: Vec<String>,
    pub failures: Vec<OrphanFailure>,
    pub warnings: Vec<ReconcileWarning>,
    /// Set when the pass stopped early on cancellation. Counts cover the work
    /// committed before that point.
    pub cancelled: bool,
}

impl ReconcileReport {
    pub fn new(provider_id: Uuid, provider_name: &str) -> Self {
        Self {
            provider_id,
            provider_name: provider_name.to_string(),
            ..Default::default()
        }
    }

    /// Human-readable completion message for task tracking.
    pub fn summary(&self) -> String {
        let mut msg = format!(
            "Provider {} port mapping sync completed: checked {} instances",
            self.provider_name, self.checked
        );
        if self.cleaned_instances > 0 {
            msg.push_str(&format!(
                ", cleaned {} orphaned instances and {} port mappings.",
                self.cleaned_instances, self.cleaned_port_mappings
            ));
            if !self.cleaned_instance_names.is_empty() {
                msg.push_str(&format!(
                    " Cleaned instances: {}",
                    self.cleaned_instance_names.join(", ")
                ));
            }
        } else if self.orphans_found > 0 {
            msg.push_str(&format!(
                ", found {} orphaned instances but none could be cleaned.",
                self.orphans_found
            ));
        } else if self.cancelled {
            msg.push('.');
        } else {
            msg.push_str(", no orphaned instances found.");
        }
        if !self.failures.is_empty() && self.cleaned_instances > 0 {
            msg.push_str(&format!(" Failed: {}", self.failures.len()));
        }
        if self.cancelled {
            msg.push_str(" (stopped early: cancelled)");
        }
        msg
    }
}
