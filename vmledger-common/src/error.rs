use thiserror::Error;
use uuid::Uuid;

/// Failures raised by local storage (Postgres or in-memory).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("instance {0} not found or already removed")]
    InstanceNotFound(Uuid),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Pass-level failures. Anything that happens to a single orphan is recovered
/// inside the pass and never shows up here.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("provider {0} not found")]
    ProviderNotFound(Uuid),

    #[error("provider {name} is not active (status: {status})")]
    ProviderInactive { name: String, status: String },

    #[error("provider code '{0}' is not supported by this build")]
    UnsupportedProvider(String),

    #[error("provider {provider} connection failed: {message}")]
    Connectivity { provider: String, message: String },

    #[error("failed to query local instances: {0}")]
    Query(#[source] RepositoryError),

    #[error("a port mapping sync is already running for provider {0}")]
    AlreadyRunning(Uuid),

    #[error("storage error: {0}")]
    Storage(#[source] RepositoryError),
}

impl ReconcileError {
    pub fn connectivity(provider: &str, err: impl std::fmt::Display) -> Self {
        ReconcileError::Connectivity {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}
