use async_trait::async_trait;
use uuid::Uuid;
use vmledger_common::{LocalInstance, Provider, RepositoryError};

pub mod memory;
pub mod postgres;

pub use memory::MemoryInstanceStore;
pub use postgres::PgInstanceRepository;

/// Local inventory as seen by reconciliation.
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    async fn find_provider(&self, provider_id: Uuid) -> Result<Option<Provider>, RepositoryError>;

    async fn list_active_providers(&self) -> Result<Vec<Provider>, RepositoryError>;

    /// Every instance of the provider that is neither soft-deleted nor in a
    /// deletion status (`deleted`, `deleting`), ordered by name.
    async fn find_non_terminal_instances(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<LocalInstance>, RepositoryError>;

    /// Opens a transaction scoped to a single instance cleanup.
    async fn begin(&self) -> Result<Box<dyn InstanceTransaction>, RepositoryError>;
}

/// Transaction handle for one orphan. Dropping it without `commit` discards
/// every change made through it.
#[async_trait]
pub trait InstanceTransaction: Send {
    async fn count_port_mappings(&mut self, instance_id: Uuid) -> Result<u64, RepositoryError>;

    /// Removes all port mappings of the instance and returns how many were
    /// removed (zero is fine). A failure here leaves the transaction usable.
    async fn delete_port_mappings(&mut self, instance_id: Uuid) -> Result<u64, RepositoryError>;

    /// Tombstones the instance row. Fails with `InstanceNotFound` when the
    /// row is already gone.
    async fn soft_delete_instance(&mut self, instance: &LocalInstance)
        -> Result<(), RepositoryError>;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}
