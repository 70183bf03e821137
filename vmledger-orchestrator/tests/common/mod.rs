// Shared fixtures for orchestrator integration tests
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vmledger_common::{LocalInstance, PortMapping, Provider, ReconcileError, RepositoryError};
use vmledger_orchestrator::provider_manager::ProviderResolver;
use vmledger_orchestrator::repository::MemoryInstanceStore;
use vmledger_orchestrator::sync_job::{ProviderLocks, SyncContext};
use vmledger_orchestrator::task_reporter::TaskReporter;
use vmledger_orchestrator::ReconciliationDriver;
use vmledger_providers::inventory::DiscoveredInstance;
use vmledger_providers::CloudProvider;

/// Provider whose inventory and failures are scripted by the test.
#[derive(Default)]
pub struct FakeProvider {
    names: Mutex<Vec<String>>,
    fail_check: AtomicBool,
    fail_list: AtomicBool,
    hang_list: AtomicBool,
    list_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn with_instances(names: &[&str]) -> Arc<Self> {
        let provider = Self::default();
        provider.set_instances(names);
        Arc::new(provider)
    }

    pub fn set_instances(&self, names: &[&str]) {
        *self.names.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
    }

    pub fn fail_check(&self) {
        self.fail_check.store(true, Ordering::SeqCst);
    }

    pub fn fail_list(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    /// `list_instances` never returns.
    pub fn hang_list(&self) {
        self.hang_list.store(true, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CloudProvider for FakeProvider {
    fn code(&self) -> &str {
        "fake"
    }

    async fn check_connection(&self) -> Result<()> {
        if self.fail_check.load(Ordering::SeqCst) {
            return Err(anyhow!("401 Unauthorized"));
        }
        Ok(())
    }

    async fn list_instances(&self) -> Result<Vec<DiscoveredInstance>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_list.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset by peer"));
        }
        let names = self.names.lock().unwrap().clone();
        Ok(names.into_iter().map(DiscoveredInstance::named).collect())
    }
}

/// Maps provider ids to fake providers; anything else is unsupported.
#[derive(Default)]
pub struct FakeResolver {
    providers: Mutex<HashMap<Uuid, Arc<FakeProvider>>>,
}

impl FakeResolver {
    pub fn register(&self, provider_id: Uuid, remote: Arc<FakeProvider>) {
        self.providers.lock().unwrap().insert(provider_id, remote);
    }
}

#[async_trait]
impl ProviderResolver for FakeResolver {
    async fn resolve(&self, provider: &Provider) -> Result<Arc<dyn CloudProvider>, ReconcileError> {
        match self.providers.lock().unwrap().get(&provider.id) {
            Some(remote) => Ok(remote.clone() as Arc<dyn CloudProvider>),
            None => Err(ReconcileError::UnsupportedProvider(provider.code.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Created(Uuid),
    Progress(u8, String),
    Completed {
        success: bool,
        summary: String,
        error: Option<String>,
    },
}

#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<(Uuid, TaskEvent)>>,
}

impl RecordingReporter {
    pub fn events_for(&self, task_id: Uuid) -> Vec<TaskEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == task_id)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn progress_for(&self, task_id: Uuid) -> Vec<u8> {
        self.events_for(task_id)
            .into_iter()
            .filter_map(|e| match e {
                TaskEvent::Progress(p, _) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn completion_for(&self, task_id: Uuid) -> Option<TaskEvent> {
        self.events_for(task_id)
            .into_iter()
            .find(|e| matches!(e, TaskEvent::Completed { .. }))
    }
}

#[async_trait]
impl TaskReporter for RecordingReporter {
    async fn create_task(&self, provider_id: Uuid, _task_type: &str) -> Result<Uuid, RepositoryError> {
        let task_id = Uuid::new_v4();
        self.events
            .lock()
            .unwrap()
            .push((task_id, TaskEvent::Created(provider_id)));
        Ok(task_id)
    }

    async fn report_progress(&self, task_id: Uuid, percent: u8, message: &str) -> Result<(), RepositoryError> {
        self.events
            .lock()
            .unwrap()
            .push((task_id, TaskEvent::Progress(percent, message.to_string())));
        Ok(())
    }

    async fn report_completion(
        &self,
        task_id: Uuid,
        success: bool,
        summary: &str,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        self.events.lock().unwrap().push((
            task_id,
            TaskEvent::Completed {
                success,
                summary: summary.to_string(),
                error: error.map(str::to_string),
            },
        ));
        Ok(())
    }
}

/// Store, provider row and wiring for one provider.
pub struct TestEnv {
    pub store: MemoryInstanceStore,
    pub provider: Provider,
    pub reporter: Arc<RecordingReporter>,
    pub driver: ReconciliationDriver,
}

impl TestEnv {
    pub fn new() -> Self {
        let store = MemoryInstanceStore::new();
        let provider = Provider::new("pve-lab", "fake");
        store.insert_provider(provider.clone());
        let reporter = Arc::new(RecordingReporter::default());
        let driver = ReconciliationDriver::new(Arc::new(store.clone()), reporter.clone());
        Self {
            store,
            provider,
            reporter,
            driver,
        }
    }

    /// Adds a local instance with `port_mappings` mappings and returns it.
    pub fn add_instance(&self, name: &str, status: &str, port_mappings: i32) -> LocalInstance {
        add_instance(&self.store, &self.provider, name, status, port_mappings)
    }
}

pub fn add_instance(
    store: &MemoryInstanceStore,
    provider: &Provider,
    name: &str,
    status: &str,
    port_mappings: i32,
) -> LocalInstance {
    let vm = LocalInstance::new(provider.id, name, status);
    store.insert_instance(vm.clone());
    for i in 0..port_mappings {
        store.insert_port_mapping(PortMapping::new(&vm, 40000 + i, 22 + i, "tcp"));
    }
    vm
}

pub fn sync_context(
    store: &MemoryInstanceStore,
    reporter: Arc<RecordingReporter>,
    resolver: Arc<FakeResolver>,
) -> SyncContext {
    SyncContext {
        driver: Arc::new(ReconciliationDriver::new(Arc::new(store.clone()), reporter)),
        resolver,
        locks: ProviderLocks::new(),
        cancel: CancellationToken::new(),
    }
}
