// Integration tests for the per-provider sync entry points shared by the
// periodic job, the command listener and the admin API.

mod common;

use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;
use vmledger_common::{Provider, ReconcileError};
use vmledger_orchestrator::repository::MemoryInstanceStore;
use vmledger_orchestrator::sync_job;

use common::{add_instance, sync_context, FakeProvider, FakeResolver, RecordingReporter, TaskEvent};

fn failed_task(reporter: &RecordingReporter, task_id: Uuid) -> Option<String> {
    match reporter.completion_for(task_id) {
        Some(TaskEvent::Completed { success: false, error, .. }) => error,
        _ => None,
    }
}

#[tokio::test]
async fn test_sync_provider_runs_tracked_pass() {
    let store = MemoryInstanceStore::new();
    let provider = Provider::new("pve-1", "fake");
    store.insert_provider(provider.clone());
    let orphan = add_instance(&store, &provider, "vm-old", "running", 2);
    add_instance(&store, &provider, "vm-live", "running", 1);

    let resolver = Arc::new(FakeResolver::default());
    resolver.register(provider.id, FakeProvider::with_instances(&["vm-live"]));
    let reporter = Arc::new(RecordingReporter::default());
    let ctx = sync_context(&store, reporter.clone(), resolver);
    let task_id = Uuid::new_v4();

    let report = assert_ok!(sync_job::sync_provider(&ctx, provider.id, Some(task_id)).await);

    assert_eq!(report.cleaned_instance_names, vec!["vm-old"]);
    assert!(store.instance(orphan.id).unwrap().is_soft_deleted());
    assert!(matches!(
        reporter.completion_for(task_id),
        Some(TaskEvent::Completed { success: true, .. })
    ));
    assert!(!ctx.locks.is_running(provider.id));
}

#[tokio::test]
async fn test_second_sync_for_same_provider_is_rejected() {
    let store = MemoryInstanceStore::new();
    let provider = Provider::new("pve-1", "fake");
    store.insert_provider(provider.clone());
    let orphan = add_instance(&store, &provider, "vm-old", "running", 0);

    let resolver = Arc::new(FakeResolver::default());
    resolver.register(provider.id, FakeProvider::with_instances(&[]));
    let reporter = Arc::new(RecordingReporter::default());
    let ctx = sync_context(&store, reporter.clone(), resolver);

    let _in_flight = ctx.locks.try_acquire(provider.id).unwrap();
    let task_id = Uuid::new_v4();
    let err = assert_err!(sync_job::sync_provider(&ctx, provider.id, Some(task_id)).await);

    assert!(matches!(err, ReconcileError::AlreadyRunning(id) if id == provider.id));
    assert!(failed_task(&reporter, task_id).unwrap().contains("already running"));
    assert!(!store.instance(orphan.id).unwrap().is_soft_deleted());
}

#[tokio::test]
async fn test_unknown_provider_fails_the_task() {
    let store = MemoryInstanceStore::new();
    let reporter = Arc::new(RecordingReporter::default());
    let ctx = sync_context(&store, reporter.clone(), Arc::new(FakeResolver::default()));
    let missing = Uuid::new_v4();
    let task_id = Uuid::new_v4();

    let err = assert_err!(sync_job::sync_provider(&ctx, missing, Some(task_id)).await);

    assert!(matches!(err, ReconcileError::ProviderNotFound(id) if id == missing));
    assert!(failed_task(&reporter, task_id).unwrap().contains("not found"));
    assert!(!ctx.locks.is_running(missing));
}

#[tokio::test]
async fn test_unsupported_provider_code() {
    let store = MemoryInstanceStore::new();
    let provider = Provider::new("ovh-1", "ovh");
    store.insert_provider(provider.clone());
    let ctx = sync_context(
        &store,
        Arc::new(RecordingReporter::default()),
        Arc::new(FakeResolver::default()),
    );

    let err = assert_err!(sync_job::sync_provider(&ctx, provider.id, None).await);
    assert!(matches!(err, ReconcileError::UnsupportedProvider(code) if code == "ovh"));
}

#[tokio::test]
async fn test_sweep_isolates_provider_failures() {
    let store = MemoryInstanceStore::new();
    let healthy = Provider::new("a-healthy", "fake");
    let broken = Provider::new("b-broken", "fake");
    let mut disabled = Provider::new("c-disabled", "fake");
    disabled.status = "disabled".to_string();
    for p in [&healthy, &broken, &disabled] {
        store.insert_provider(p.clone());
    }
    let orphan = add_instance(&store, &healthy, "vm-old", "running", 1);
    add_instance(&store, &broken, "vm-x", "running", 1);
    let untouched = add_instance(&store, &disabled, "vm-y", "running", 0);

    let resolver = Arc::new(FakeResolver::default());
    resolver.register(healthy.id, FakeProvider::with_instances(&[]));
    let unreachable = FakeProvider::with_instances(&[]);
    unreachable.fail_check();
    resolver.register(broken.id, unreachable);
    resolver.register(disabled.id, FakeProvider::with_instances(&[]));
    let ctx = sync_context(&store, Arc::new(RecordingReporter::default()), resolver);

    let summary = assert_ok!(sync_job::sync_all_providers(&ctx).await);

    assert_eq!(summary.providers, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.cleaned_instances, 1);
    assert!(store.instance(orphan.id).unwrap().is_soft_deleted());
    assert!(!store.instance(untouched.id).unwrap().is_soft_deleted());
}

#[tokio::test]
async fn test_sweep_stops_when_cancelled() {
    let store = MemoryInstanceStore::new();
    let provider = Provider::new("pve-1", "fake");
    store.insert_provider(provider.clone());
    let vm = add_instance(&store, &provider, "vm-old", "running", 0);
    let resolver = Arc::new(FakeResolver::default());
    resolver.register(provider.id, FakeProvider::with_instances(&[]));
    let ctx = sync_context(&store, Arc::new(RecordingReporter::default()), resolver);
    ctx.cancel.cancel();

    let summary = assert_ok!(sync_job::sync_all_providers(&ctx).await);

    assert_eq!(summary.succeeded, 0);
    assert!(!store.instance(vm.id).unwrap().is_soft_deleted());
}
