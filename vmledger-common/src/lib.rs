use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod bus;
pub mod error;
pub mod status;

pub use error::{ReconcileError, RepositoryError};
pub use status::{InstanceStatus, QuotaBucket, QuotaUsage};

// --- Entities (SQLx Mapped) ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow)]
pub struct Provider {
    pub id: Uuid,
    pub name: String,
    pub code: String, // Provider kind: "mock", "scaleway", ...
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Provider {
    pub const STATUS_ACTIVE: &'static str = "active";

    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            code: code.into(),
            status: Self::STATUS_ACTIVE.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case(Self::STATUS_ACTIVE)
    }
}

/// Locally persisted record of a provisioned instance.
///
/// `status` stays a raw string: rows written by other components may carry
/// values outside the recognized taxonomy, see [`status::classify`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow)]
pub struct LocalInstance {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    // Soft-delete tombstone
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LocalInstance {
    pub fn new(provider_id: Uuid, name: impl Into<String>, status: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            provider_id,
            name: name.into(),
            status: status.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_soft_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow)]
pub struct PortMapping {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub provider_id: Uuid,
    pub host_port: i32,
    pub guest_port: i32,
    pub protocol: String, // tcp | udp
    pub created_at: DateTime<Utc>,
}

impl PortMapping {
    pub fn new(instance: &LocalInstance, host_port: i32, guest_port: i32, protocol: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            instance_id: instance.id,
            provider_id: instance.provider_id,
            host_port,
            guest_port,
            protocol: protocol.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub provider_id: Option<Uuid>,
    pub task_type: String,
    pub status: String, // pending | running | completed | failed
    pub progress: i32,
    pub message: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
