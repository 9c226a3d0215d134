//! Trigger table transitions, cron firings under the guard, and
//! manual/webhook submission.

use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;

use crate::guard::{
    adapters::memory::InMemoryExecutionGuard, domain::LeaseKey, ports::ExecutionGuard,
};
use crate::scheduler::{DEFAULT_LEASE_TTL, SchedulerError};
use crate::sync::{
    adapters::memory::InMemorySyncCatalog,
    domain::TriggerSource,
    ports::ScheduleHook,
};

use super::support::{Instance, RecordingRunner, key, settle, task};

const EVERY_MINUTE: &str = "* * * * *";
const WEBHOOK_TOKEN: &str = "hook-token-0123456789";

#[rstest]
#[tokio::test(start_paused = true)]
async fn saved_tasks_are_scheduled_only_while_schedulable() {
    let instance = Instance::new();
    let scheduler = &instance.scheduler;

    scheduler.on_task_saved(&task("nightly", Some("0 2 * * *"), true, None));
    scheduler.on_task_saved(&task("adhoc", None, true, None));
    scheduler.on_task_saved(&task("paused", Some(EVERY_MINUTE), false, None));
    assert_eq!(scheduler.scheduled_keys(), vec![key("nightly")]);
    assert_eq!(
        scheduler.scheduled_cron(&key("nightly")).as_deref(),
        Some("0 0 2 * * *")
    );

    scheduler.on_task_saved(&task("nightly", Some("30 3 * * *"), true, None));
    assert_eq!(
        scheduler.scheduled_cron(&key("nightly")).as_deref(),
        Some("0 30 3 * * *")
    );

    scheduler.on_task_saved(&task("nightly", Some("30 3 * * *"), false, None));
    assert!(scheduler.scheduled_keys().is_empty());

    scheduler.on_task_saved(&task("paused", Some(EVERY_MINUTE), true, None));
    ScheduleHook::on_task_deleted(scheduler, &key("paused"));
    assert!(scheduler.scheduled_keys().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn reload_rebuilds_the_table_from_the_catalog() {
    let instance = Instance::new();
    instance.scheduler.on_task_saved(&task("stale", Some(EVERY_MINUTE), true, None));
    instance.store(&task("b-task", Some(EVERY_MINUTE), true, None)).await;
    instance.store(&task("a-task", Some("0 * * * *"), true, None)).await;
    instance.store(&task("manual-only", None, true, None)).await;

    let scheduled = instance
        .scheduler
        .reload_from_catalog()
        .await
        .expect("catalog readable");

    assert_eq!(scheduled, 2);
    assert_eq!(
        instance.scheduler.scheduled_keys(),
        vec![key("a-task"), key("b-task")]
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn cron_firings_run_under_the_lease_and_release_it() {
    let instance = Instance::new();
    instance.scheduler.on_task_saved(&task("nightly", Some(EVERY_MINUTE), true, None));

    tokio::time::sleep(Duration::from_secs(31)).await;
    settle().await;

    assert_eq!(
        instance.runner.calls(),
        vec![(key("nightly"), TriggerSource::Cron)]
    );
    let lease = LeaseKey::for_task(&key("nightly"));
    assert!(
        instance
            .guard
            .handle()
            .acquire(&lease, DEFAULT_LEASE_TTL)
            .await
            .expect("lease free again")
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn a_panicking_cron_run_still_releases_the_lease() {
    let instance = Instance::sharing(
        Arc::new(RecordingRunner::panicking()),
        InMemoryExecutionGuard::new(),
        Arc::new(InMemorySyncCatalog::new()),
    );
    instance.scheduler.on_task_saved(&task("nightly", Some(EVERY_MINUTE), true, None));

    tokio::time::sleep(Duration::from_secs(31)).await;
    settle().await;

    assert_eq!(
        instance.runner.calls(),
        vec![(key("nightly"), TriggerSource::Cron)]
    );
    let lease = LeaseKey::for_task(&key("nightly"));
    assert!(
        instance
            .guard
            .handle()
            .acquire(&lease, DEFAULT_LEASE_TTL)
            .await
            .expect("lease free again")
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn firings_are_skipped_while_another_instance_holds_the_lease() {
    let instance = Instance::new();
    let other_instance = instance.guard.handle();
    let lease = LeaseKey::for_task(&key("nightly"));
    assert!(
        other_instance
            .acquire(&lease, DEFAULT_LEASE_TTL)
            .await
            .expect("acquire")
    );
    instance.scheduler.on_task_saved(&task("nightly", Some(EVERY_MINUTE), true, None));

    tokio::time::sleep(Duration::from_secs(31)).await;
    settle().await;

    assert!(instance.runner.calls().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn two_instances_never_run_the_same_firing_twice() {
    let runner = Arc::new(RecordingRunner::taking(Duration::from_secs(5)));
    let shared_leases = InMemoryExecutionGuard::new();
    let first = Instance::sharing(
        Arc::clone(&runner),
        shared_leases.handle(),
        Arc::new(InMemorySyncCatalog::new()),
    );
    let second = Instance::sharing(
        Arc::clone(&runner),
        shared_leases.handle(),
        Arc::new(InMemorySyncCatalog::new()),
    );
    let nightly = task("nightly", Some(EVERY_MINUTE), true, None);
    first.scheduler.on_task_saved(&nightly);
    second.scheduler.on_task_saved(&nightly);

    tokio::time::sleep(Duration::from_secs(31)).await;
    settle().await;

    assert_eq!(runner.calls().len(), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn removed_triggers_stop_firing() {
    let instance = Instance::new();
    instance.scheduler.on_task_saved(&task("nightly", Some(EVERY_MINUTE), true, None));
    instance.scheduler.on_task_deleted(&key("nightly"));

    tokio::time::sleep(Duration::from_secs(121)).await;
    settle().await;

    assert!(instance.runner.calls().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn manual_triggers_are_queued_for_known_tasks() {
    let instance = Instance::new();
    instance.store(&task("adhoc", None, false, None)).await;

    instance
        .scheduler
        .trigger_manual(&key("adhoc"))
        .await
        .expect("queued");
    let missing = instance.scheduler.trigger_manual(&key("ghost")).await;
    settle().await;

    assert!(matches!(missing, Err(SchedulerError::TaskNotFound(_))));
    assert_eq!(
        instance.runner.calls(),
        vec![(key("adhoc"), TriggerSource::Manual)]
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn webhook_tokens_select_an_enabled_task() {
    let instance = Instance::new();
    instance
        .store(&task("hooked", None, true, Some(WEBHOOK_TOKEN)))
        .await;
    instance
        .store(&task("dormant", None, false, Some("dormant-token-0123456789")))
        .await;

    let queued = instance
        .scheduler
        .trigger_webhook(WEBHOOK_TOKEN)
        .await
        .expect("queued");
    let unknown = instance
        .scheduler
        .trigger_webhook("not-a-known-token-at-all")
        .await;
    let disabled = instance
        .scheduler
        .trigger_webhook("dormant-token-0123456789")
        .await;
    settle().await;

    assert_eq!(queued, key("hooked"));
    assert!(matches!(unknown, Err(SchedulerError::UnknownWebhookToken)));
    assert!(matches!(disabled, Err(SchedulerError::TaskDisabled(ref k)) if *k == key("dormant")));
    assert_eq!(
        instance.runner.calls(),
        vec![(key("hooked"), TriggerSource::Webhook)]
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn shutdown_stops_triggers_and_rejects_new_jobs() {
    let instance = Instance::new();
    instance.store(&task("adhoc", None, true, None)).await;
    instance.scheduler.on_task_saved(&task("nightly", Some(EVERY_MINUTE), true, None));

    instance.scheduler.shutdown().await;
    let rejected = instance.scheduler.trigger_manual(&key("adhoc")).await;

    assert!(instance.scheduler.scheduled_keys().is_empty());
    assert!(matches!(rejected, Err(SchedulerError::ShutDown)));
}
