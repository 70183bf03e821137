use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use std::sync::Arc;
use vmledger_common::{Provider, ReconcileError};
use vmledger_providers::CloudProvider;

/// Turns a provider row into a live client bound to that provider.
#[async_trait]
pub trait ProviderResolver: Send + Sync {
    async fn resolve(&self, provider: &Provider) -> Result<Arc<dyn CloudProvider>, ReconcileError>;
}

/// Builds provider clients from the provider `code`. Which codes are available
/// depends on the `provider-*` features enabled at build time.
pub struct ProviderManager {
    #[cfg_attr(not(feature = "provider-mock"), allow(dead_code))]
    db: Pool<Postgres>,
}

impl ProviderManager {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProviderResolver for ProviderManager {
    async fn resolve(&self, provider: &Provider) -> Result<Arc<dyn CloudProvider>, ReconcileError> {
        let client: Arc<dyn CloudProvider> = match provider.code.to_lowercase().as_str() {
            #[cfg(feature = "provider-mock")]
            "mock" => Ok(Arc::new(vmledger_providers::mock::MockProvider::new(
                self.db.clone(),
                provider.id,
            )) as Arc<dyn CloudProvider>),
            #[cfg(feature = "provider-scaleway")]
            "scaleway" => scaleway_from_env(provider),
            other => Err(ReconcileError::UnsupportedProvider(other.to_string())),
        }?;
        tracing::debug!(provider_id = %provider.id, provider_code = client.code(), "provider client ready");
        Ok(client)
    }
}

#[cfg(feature = "provider-scaleway")]
fn scaleway_from_env(provider: &Provider) -> Result<Arc<dyn CloudProvider>, ReconcileError> {
    use std::env;
    use std::fs;
    use vmledger_providers::scaleway::ScalewayProvider;

    let project_id = env::var("SCALEWAY_PROJECT_ID")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    // Prefer *_FILE for secrets (Docker/K8s friendly), fallback to env var.
    let secret_key_file = env::var("SCALEWAY_SECRET_KEY_FILE")
        .unwrap_or_else(|_| "/run/secrets/scaleway_secret_key".to_string());
    let secret_key = fs::read_to_string(&secret_key_file)
        .ok()
        .or_else(|| env::var("SCALEWAY_SECRET_KEY").ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    if project_id.is_empty() || secret_key.is_empty() {
        return Err(ReconcileError::connectivity(
            &provider.name,
            "missing SCALEWAY_PROJECT_ID or SCALEWAY_SECRET_KEY",
        ));
    }
    let zones = env::var("SCALEWAY_ZONES")
        .unwrap_or_else(|_| "fr-par-2".to_string())
        .split(',')
        .map(str::to_string)
        .collect();

    let client = ScalewayProvider::new(project_id, secret_key, zones)
        .map_err(|e| ReconcileError::connectivity(&provider.name, format!("{:#}", e)))?;
    Ok(Arc::new(client))
}
