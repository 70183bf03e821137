//! In-memory implementation of [`InstanceRepository`].
//!
//! Transactions stage their writes and apply them on commit under a single
//! lock, so an uncommitted or rolled-back transaction leaves no trace. Faults
//! can be injected per instance to exercise partial-failure paths.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;
use vmledger_common::{status, LocalInstance, PortMapping, Provider, RepositoryError};

use super::{InstanceRepository, InstanceTransaction};

#[derive(Default)]
struct State {
    providers: BTreeMap<Uuid, Provider>,
    instances: BTreeMap<Uuid, LocalInstance>,
    port_mappings: Vec<PortMapping>,
    faults: Faults,
    commits: usize,
}

#[derive(Default)]
struct Faults {
    listing: bool,
    port_mapping_delete: HashSet<Uuid>,
    instance_delete: HashSet<Uuid>,
    commit: HashSet<Uuid>,
}

#[derive(Clone, Default)]
pub struct MemoryInstanceStore {
    state: Arc<Mutex<State>>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, RepositoryError> {
        lock_state(&self.state)
    }

    // Seeding/inspection helpers recover from poisoning instead of failing.
    fn lock_unchecked(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_provider(&self, provider: Provider) {
        self.lock_unchecked().providers.insert(provider.id, provider);
    }

    pub fn insert_instance(&self, instance: LocalInstance) {
        self.lock_unchecked().instances.insert(instance.id, instance);
    }

    pub fn insert_port_mapping(&self, mapping: PortMapping) {
        self.lock_unchecked().port_mappings.push(mapping);
    }

    pub fn instance(&self, id: Uuid) -> Option<LocalInstance> {
        self.lock_unchecked().instances.get(&id).cloned()
    }

    pub fn port_mappings_for(&self, instance_id: Uuid) -> Vec<PortMapping> {
        self.lock_unchecked()
            .port_mappings
            .iter()
            .filter(|m| m.instance_id == instance_id)
            .cloned()
            .collect()
    }

    /// Number of transactions that committed successfully.
    pub fn commits(&self) -> usize {
        self.lock_unchecked().commits
    }

    pub fn fail_listing(&self, fail: bool) {
        self.lock_unchecked().faults.listing = fail;
    }

    pub fn fail_port_mapping_delete(&self, instance_id: Uuid) {
        self.lock_unchecked()
            .faults
            .port_mapping_delete
            .insert(instance_id);
    }

    pub fn fail_instance_delete(&self, instance_id: Uuid) {
        self.lock_unchecked().faults.instance_delete.insert(instance_id);
    }

    pub fn fail_commit(&self, instance_id: Uuid) {
        self.lock_unchecked().faults.commit.insert(instance_id);
    }
}

fn lock_state(state: &Mutex<State>) -> Result<MutexGuard<'_, State>, RepositoryError> {
    state
        .lock()
        .map_err(|_| RepositoryError::Storage("in-memory store lock poisoned".to_string()))
}

#[async_trait]
impl InstanceRepository for MemoryInstanceStore {
    async fn find_provider(&self, provider_id: Uuid) -> Result<Option<Provider>, RepositoryError> {
        Ok(self.lock()?.providers.get(&provider_id).cloned())
    }

    async fn list_active_providers(&self) -> Result<Vec<Provider>, RepositoryError> {
        let mut providers: Vec<Provider> = self
            .lock()?
            .providers
            .values()
            .filter(|p| p.is_active())
            .cloned()
            .collect();
        providers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(providers)
    }

    async fn find_non_terminal_instances(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<LocalInstance>, RepositoryError> {
        let state = self.lock()?;
        if state.faults.listing {
            return Err(RepositoryError::Storage(
                "injected listing failure".to_string(),
            ));
        }
        let mut instances: Vec<LocalInstance> = state
            .instances
            .values()
            .filter(|i| {
                i.provider_id == provider_id
                    && !i.is_soft_deleted()
                    && !status::is_deletion(&i.status)
            })
            .cloned()
            .collect();
        instances.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(instances)
    }

    async fn begin(&self) -> Result<Box<dyn InstanceTransaction>, RepositoryError> {
        Ok(Box::new(MemoryTransaction {
            state: self.state.clone(),
            cleared_port_mappings: HashSet::new(),
            tombstoned: Vec::new(),
            touched: HashSet::new(),
        }))
    }
}

pub struct MemoryTransaction {
    state: Arc<Mutex<State>>,
    cleared_port_mappings: HashSet<Uuid>,
    tombstoned: Vec<Uuid>,
    touched: HashSet<Uuid>,
}

#[async_trait]
impl InstanceTransaction for MemoryTransaction {
    async fn count_port_mappings(&mut self, instance_id: Uuid) -> Result<u64, RepositoryError> {
        self.touched.insert(instance_id);
        if self.cleared_port_mappings.contains(&instance_id) {
            return Ok(0);
        }
        let state = lock_state(&self.state)?;
        Ok(state
            .port_mappings
            .iter()
            .filter(|m| m.instance_id == instance_id)
            .count() as u64)
    }

    async fn delete_port_mappings(&mut self, instance_id: Uuid) -> Result<u64, RepositoryError> {
        self.touched.insert(instance_id);
        let count = {
            let state = lock_state(&self.state)?;
            if state.faults.port_mapping_delete.contains(&instance_id) {
                return Err(RepositoryError::Storage(format!(
                    "injected port mapping delete failure for {}",
                    instance_id
                )));
            }
            if self.cleared_port_mappings.contains(&instance_id) {
                0
            } else {
                state
                    .port_mappings
                    .iter()
                    .filter(|m| m.instance_id == instance_id)
                    .count() as u64
            }
        };
        self.cleared_port_mappings.insert(instance_id);
        Ok(count)
    }

    async fn soft_delete_instance(
        &mut self,
        instance: &LocalInstance,
    ) -> Result<(), RepositoryError> {
        self.touched.insert(instance.id);
        let state = lock_state(&self.state)?;
        if state.faults.instance_delete.contains(&instance.id) {
            return Err(RepositoryError::Storage(format!(
                "injected instance delete failure for {}",
                instance.id
            )));
        }
        let live = state
            .instances
            .get(&instance.id)
            .map(|i| !i.is_soft_deleted())
            .unwrap_or(false);
        if !live || self.tombstoned.contains(&instance.id) {
            return Err(RepositoryError::InstanceNotFound(instance.id));
        }
        drop(state);
        self.tombstoned.push(instance.id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let mut state = lock_state(&self.state)?;
        if let Some(id) = self.touched.iter().find(|id| state.faults.commit.contains(*id)) {
            return Err(RepositoryError::Storage(format!(
                "injected commit failure for {}",
                id
            )));
        }

        let cleared = &self.cleared_port_mappings;
        state
            .port_mappings
            .retain(|m| !cleared.contains(&m.instance_id));

        let now = Utc::now();
        for id in &self.tombstoned {
            if let Some(instance) = state.instances.get_mut(id) {
                instance.status = status::InstanceStatus::Deleted.as_str().to_string();
                instance.deleted_at = Some(now);
                instance.updated_at = now;
            }
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        // Nothing was applied; dropping the staged writes is the rollback.
        Ok(())
    }
}
