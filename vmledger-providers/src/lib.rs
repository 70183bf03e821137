use anyhow::Result;
use async_trait::async_trait;

/// Read-only view of a compute backend, as needed by reconciliation.
///
/// One value is bound to one provider identity (credentials, project, zones
/// are resolved when it is constructed).
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Short provider kind, e.g. "mock" or "scaleway".
    fn code(&self) -> &str;

    /// Fails if the backend cannot be reached or rejects our credentials.
    async fn check_connection(&self) -> Result<()>;

    /// Complete listing of instances the backend currently knows about.
    /// Either every instance is returned or the call fails; partial pages are
    /// never handed back.
    async fn list_instances(&self) -> Result<Vec<inventory::DiscoveredInstance>>;
}

pub mod inventory {
    #[derive(Clone, Debug, PartialEq)]
    pub struct DiscoveredInstance {
        pub provider_id: String,
        pub name: String,
        pub zone: String,
        pub status: String,
        pub ip_address: Option<String>,
        pub created_at: Option<String>,
    }

    impl DiscoveredInstance {
        /// Instance known only by name; the remaining metadata is left empty.
        pub fn named(name: impl Into<String>) -> Self {
            let name = name.into();
            Self {
                provider_id: name.clone(),
                name,
                zone: String::new(),
                status: String::new(),
                ip_address: None,
                created_at: None,
            }
        }
    }
}

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "scaleway")]
pub mod scaleway;
