use crate::{inventory, CloudProvider};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

/// Provider simulated by the `mock_provider_instances` table.
///
/// Lets the full pipeline (task, listing, cleanup) run locally without a real
/// backend: deleting a row from the table makes the instance "disappear" on
/// the provider side.
pub struct MockProvider {
    db: Pool<Postgres>,
    provider_id: Uuid,
    provider_code: &'static str,
}

impl MockProvider {
    pub fn new(db: Pool<Postgres>, provider_id: Uuid) -> Self {
        Self {
            db,
            provider_id,
            provider_code: "mock",
        }
    }
}

#[async_trait]
impl CloudProvider for MockProvider {
    fn code(&self) -> &str {
        self.provider_code
    }

    async fn check_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn list_instances(&self) -> Result<Vec<inventory::DiscoveredInstance>> {
        let rows: Vec<(String, String, String, String, Option<String>, Option<String>)> =
            sqlx::query_as(
                r#"
                SELECT provider_instance_id,
                       name,
                       zone_code,
                       status,
                       ip_address,
                       created_at::text
                FROM mock_provider_instances
                WHERE provider_id = $1
                  AND status <> 'terminated'
                ORDER BY name
                "#,
            )
            .bind(self.provider_id)
            .fetch_all(&self.db)
            .await?;

        tracing::debug!(
            provider_id = %self.provider_id,
            count = rows.len(),
            "[mock] listed provider instances"
        );

        Ok(rows
            .into_iter()
            .map(
                |(provider_id, name, zone, status, ip_address, created_at)| {
                    inventory::DiscoveredInstance {
                        provider_id,
                        name,
                        zone,
                        status,
                        ip_address,
                        created_at,
                    }
                },
            )
            .collect())
    }
}
