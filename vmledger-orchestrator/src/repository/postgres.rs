use async_trait::async_trait;
use sqlx::{Pool, Postgres, Transaction};
use uuid::Uuid;
use vmledger_common::{LocalInstance, Provider, RepositoryError};

use super::{InstanceRepository, InstanceTransaction};
use crate::logger;

pub struct PgInstanceRepository {
    db: Pool<Postgres>,
}

impl PgInstanceRepository {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl InstanceRepository for PgInstanceRepository {
    async fn find_provider(&self, provider_id: Uuid) -> Result<Option<Provider>, RepositoryError> {
        let provider = sqlx::query_as::<_, Provider>(
            "SELECT id, name, code, status, created_at FROM providers WHERE id = $1",
        )
        .bind(provider_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(provider)
    }

    async fn list_active_providers(&self) -> Result<Vec<Provider>, RepositoryError> {
        let providers = sqlx::query_as::<_, Provider>(
            "SELECT id, name, code, status, created_at
             FROM providers
             WHERE status = 'active'
             ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(providers)
    }

    async fn find_non_terminal_instances(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<LocalInstance>, RepositoryError> {
        let instances = sqlx::query_as::<_, LocalInstance>(
            r#"
            SELECT id, provider_id, name, status, created_at, updated_at, deleted_at
            FROM instances
            WHERE provider_id = $1
              AND deleted_at IS NULL
              AND status NOT IN ('deleted', 'deleting')
            ORDER BY name, id
            "#,
        )
        .bind(provider_id)
        .fetch_all(&self.db)
        .await?;
        Ok(instances)
    }

    async fn begin(&self) -> Result<Box<dyn InstanceTransaction>, RepositoryError> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgInstanceTransaction { tx }))
    }
}

pub struct PgInstanceTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl InstanceTransaction for PgInstanceTransaction {
    async fn count_port_mappings(&mut self, instance_id: Uuid) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM port_mappings WHERE instance_id = $1")
                .bind(instance_id)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn delete_port_mappings(&mut self, instance_id: Uuid) -> Result<u64, RepositoryError> {
        // A failed statement aborts the whole Postgres transaction; the savepoint
        // keeps the instance delete that follows usable.
        let mut savepoint = sqlx::Connection::begin(&mut *self.tx).await?;
        let res = sqlx::query("DELETE FROM port_mappings WHERE instance_id = $1")
            .bind(instance_id)
            .execute(&mut *savepoint)
            .await;
        match res {
            Ok(done) => {
                savepoint.commit().await?;
                Ok(done.rows_affected())
            }
            Err(e) => {
                savepoint.rollback().await?;
                Err(e.into())
            }
        }
    }

    async fn soft_delete_instance(
        &mut self,
        instance: &LocalInstance,
    ) -> Result<(), RepositoryError> {
        let res = sqlx::query(
            "UPDATE instances
             SET status = 'deleted',
                 deleted_at = NOW(),
                 updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(instance.id)
        .execute(&mut *self.tx)
        .await?;

        if res.rows_affected() == 0 {
            return Err(RepositoryError::InstanceNotFound(instance.id));
        }

        logger::log_event_with_metadata(
            &mut *self.tx,
            "ORPHAN_INSTANCE_CLEANED",
            "success",
            Some(instance.provider_id),
            Some(instance.id),
            None,
            Some(serde_json::json!({
                "instance_name": instance.name,
                "previous_status": instance.status,
                "detection_method": "port_mapping_sync"
            })),
        )
        .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
