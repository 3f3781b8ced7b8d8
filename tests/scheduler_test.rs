//! Scheduler behaviour against the in-memory store
//!
//! Run with: cargo test --test scheduler_test

mod fixtures;
mod helpers;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use fixtures::*;
use helpers::*;
use market_scheduler::handlers::HandlerRegistry;
use market_scheduler::models::execution::ExecutionStatus;
use market_scheduler::models::job::{JobStatus, JobType, MarketCode, ScheduleInterval};
use market_scheduler::models::lock::JobLock;
use market_scheduler::scheduler::{JobRunner, SchedulerManager, SchedulerSettings};
use market_scheduler::services::collector::{CollectRequest, CollectorError, MarketCollector};
use market_scheduler::store::{MemoryScheduleStore, ScheduleStore};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn runner(store: &Arc<MemoryScheduleStore>, registry: HandlerRegistry, owner: &str) -> JobRunner {
    let store: Arc<dyn ScheduleStore> = store.clone();
    JobRunner::new(store, Arc::new(registry), owner)
}

fn collection_registry(collector: FakeCollector, dir: &std::path::Path) -> HandlerRegistry {
    HandlerRegistry::with_defaults(
        Arc::new(collector),
        backup_settings(dir, std::path::Path::new("pg_dump")),
    )
}

#[tokio::test]
async fn test_concurrent_dispatch_runs_job_once() {
    let store = Arc::new(MemoryScheduleStore::new());
    let job_id = store.insert_job(job(JobType::ReportGeneration));
    let job = store.job(job_id).unwrap();

    let slow = Arc::new(SlowHandler::new(Duration::from_millis(200)));
    let mut registry = HandlerRegistry::new();
    registry.register(JobType::ReportGeneration, SharedHandler(slow.clone()));

    let first = runner(&store, registry.clone(), "scheduler-a");
    let second = runner(&store, registry, "scheduler-b");

    let (a, b) = futures::join!(first.run(job.clone()), second.run(job));

    assert_eq!(a.is_some() as u8 + b.is_some() as u8, 1);
    assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.executions_for(job_id).len(), 1);
    assert!(store.lock_for(job_id).is_none());

    let job = store.job(job_id).unwrap();
    assert_eq!(job.run_count, 1);
    assert_eq!(job.success_count, 1);
}

#[tokio::test]
async fn test_live_lock_blocks_run() {
    let store = Arc::new(MemoryScheduleStore::new());
    let job_id = store.insert_job(job(JobType::PriceUpdate));
    store.put_lock(JobLock {
        job_id,
        locked_by: "scheduler-other".to_string(),
        expires_at: Utc::now() + ChronoDuration::minutes(30),
    });

    let registry = collection_registry(FakeCollector::default(), std::path::Path::new("backups"));
    let result = runner(&store, registry, "scheduler-a")
        .run(store.job(job_id).unwrap())
        .await;

    assert!(result.is_none());
    assert!(store.executions_for(job_id).is_empty());
    assert_eq!(store.job(job_id).unwrap().run_count, 0);
    assert_eq!(store.lock_for(job_id).unwrap().locked_by, "scheduler-other");
}

#[tokio::test]
async fn test_expired_lock_is_taken_over() {
    let store = Arc::new(MemoryScheduleStore::new());
    let job_id = store.insert_job(job(JobType::InventorySync));
    store.put_lock(JobLock {
        job_id,
        locked_by: "scheduler-crashed".to_string(),
        expires_at: Utc::now() - ChronoDuration::minutes(1),
    });

    let registry = collection_registry(FakeCollector::default(), std::path::Path::new("backups"));
    let execution = runner(&store, registry, "scheduler-a")
        .run(store.job(job_id).unwrap())
        .await
        .expect("expired lock should not block the run");

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(
        execution.result_summary.unwrap()["status"],
        "not_implemented"
    );
    assert!(store.lock_for(job_id).is_none());
}

#[tokio::test]
async fn test_unregistered_job_type_fails() {
    let store = Arc::new(MemoryScheduleStore::new());
    let job_id = store.insert_job(job(JobType::ShipmentSync));

    let registry = collection_registry(FakeCollector::default(), std::path::Path::new("backups"));
    let execution = runner(&store, registry, "scheduler-a")
        .run(store.job(job_id).unwrap())
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    let message = execution.error_message.unwrap();
    assert!(message.contains("shipment_sync"));

    let stored = store.executions_for(job_id);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, ExecutionStatus::Failed);
    assert!(stored[0].completed_at.is_some());

    let job = store.job(job_id).unwrap();
    assert_eq!((job.run_count, job.success_count, job.error_count), (1, 0, 1));
    assert_eq!(job.last_error.as_deref(), Some(message.as_str()));
    assert!(job.last_success_at.is_none());
}

#[tokio::test]
async fn test_panicking_handler_is_recorded_and_unlocked() {
    let store = Arc::new(MemoryScheduleStore::new());
    let job_id = store.insert_job(job(JobType::ReportGeneration));

    let mut registry = HandlerRegistry::new();
    registry.register(JobType::ReportGeneration, PanickingHandler);

    let execution = runner(&store, registry, "scheduler-a")
        .run(store.job(job_id).unwrap())
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.error_message.unwrap().contains("panicked"));
    assert!(store.lock_for(job_id).is_none());
    assert_eq!(store.job(job_id).unwrap().error_count, 1);
}

#[tokio::test]
async fn test_product_collection_success() {
    let store = Arc::new(MemoryScheduleStore::new());
    let job_id = store.insert_job(product_job(&["coupang", "naver", "11st"]));

    let registry = collection_registry(FakeCollector::default(), std::path::Path::new("backups"));
    let execution = runner(&store, registry, "scheduler-a")
        .run(store.job(job_id).unwrap())
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.records_processed, 24);
    let summary = execution.result_summary.unwrap();
    assert_eq!(summary["markets"]["coupang"], 12);
    assert_eq!(summary["total"], 24);

    let job = store.job(job_id).unwrap();
    assert_eq!((job.run_count, job.success_count, job.error_count), (1, 1, 0));
    assert!(job.last_success_at.is_some());
    assert!(job.last_error.is_none());
}

#[tokio::test]
async fn test_failing_market_fails_execution() {
    let store = Arc::new(MemoryScheduleStore::new());
    let job_id = store.insert_job(product_job(&["coupang", "naver"]));

    let collector = FakeCollector::failing(&[MarketCode::Naver]);
    let registry = collection_registry(collector, std::path::Path::new("backups"));
    let execution = runner(&store, registry, "scheduler-a")
        .run(store.job(job_id).unwrap())
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.result_summary.is_none());
    assert!(execution.error_message.unwrap().contains("naver"));

    let job = store.job(job_id).unwrap();
    assert_eq!((job.run_count, job.success_count, job.error_count), (1, 0, 1));
}

#[tokio::test]
async fn test_long_error_is_truncated_on_job() {
    let store = Arc::new(MemoryScheduleStore::new());
    let job_id = store.insert_job(product_job(&["naver"]));

    struct VerboseCollector;

    #[async_trait]
    impl MarketCollector for VerboseCollector {
        async fn collect_products(&self, _request: CollectRequest<'_>) -> Result<u64, CollectorError> {
            Err(CollectorError::Market("x".repeat(2000)))
        }

        async fn collect_orders(
            &self,
            _request: CollectRequest<'_>,
            _days_back: i64,
        ) -> Result<u64, CollectorError> {
            Ok(0)
        }
    }

    let registry = HandlerRegistry::with_defaults(
        Arc::new(VerboseCollector),
        backup_settings(std::path::Path::new("backups"), std::path::Path::new("pg_dump")),
    );
    runner(&store, registry, "scheduler-a")
        .run(store.job(job_id).unwrap())
        .await
        .unwrap();

    let job = store.job(job_id).unwrap();
    assert_eq!(job.last_error.unwrap().chars().count(), 500);
    let stored = store.executions_for(job_id);
    assert!(stored[0].error_message.as_ref().unwrap().len() > 500);
}

#[tokio::test]
async fn test_counters_stay_consistent_over_mixed_runs() {
    let store = Arc::new(MemoryScheduleStore::new());
    let ok_id = store.insert_job(product_job(&["coupang"]));
    let bad_id = store.insert_job(product_job(&["11st"]));

    let collector = FakeCollector::failing(&[MarketCode::Elevenst]);
    let registry = collection_registry(collector, std::path::Path::new("backups"));
    let runner = runner(&store, registry, "scheduler-a");

    for _ in 0..3 {
        runner.run(store.job(ok_id).unwrap()).await.unwrap();
        runner.run(store.job(bad_id).unwrap()).await.unwrap();
    }

    for job_id in [ok_id, bad_id] {
        let job = store.job(job_id).unwrap();
        assert_eq!(job.run_count, job.success_count + job.error_count);
        assert_eq!(job.run_count, 3);
        assert_eq!(store.executions_for(job_id).len(), 3);
    }
    assert_eq!(store.job(ok_id).unwrap().success_count, 3);
    assert_eq!(store.job(bad_id).unwrap().error_count, 3);
}

#[tokio::test]
async fn test_unrecorded_start_still_runs_job() {
    let store = Arc::new(MemoryScheduleStore::new());
    let job_id = store.insert_job(product_job(&["coupang"]));
    store.set_execution_writes_failing(true);

    let registry = collection_registry(FakeCollector::default(), std::path::Path::new("backups"));
    let execution = runner(&store, registry, "scheduler-a")
        .run(store.job(job_id).unwrap())
        .await
        .unwrap();

    assert_eq!(execution.id, 0);
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(store.executions_for(job_id).is_empty());
    assert_eq!(store.job(job_id).unwrap().success_count, 1);
    assert!(store.lock_for(job_id).is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn test_backup_job_writes_and_prunes_dumps() {
    let backups = tempfile::tempdir().unwrap();
    let tools = tempfile::tempdir().unwrap();
    let dump = fake_pg_dump(tools.path());

    let store = Arc::new(MemoryScheduleStore::new());
    let job_id = store.insert_job(backup_job(1));
    let registry = HandlerRegistry::with_defaults(
        Arc::new(FakeCollector::default()),
        backup_settings(backups.path(), &dump),
    );
    let runner = runner(&store, registry, "scheduler-a");

    let first = runner.run(store.job(job_id).unwrap()).await.unwrap();
    assert_eq!(first.status, ExecutionStatus::Completed, "{:?}", first.error_message);
    assert_eq!(first.records_processed, 1);
    let first_file = std::path::PathBuf::from(
        first.result_summary.as_ref().unwrap()["backup_file"]
            .as_str()
            .unwrap(),
    );
    assert!(first_file.exists());

    // Age the first dump past the retention window
    let two_days_ago = std::time::SystemTime::now() - Duration::from_secs(2 * 24 * 60 * 60);
    std::fs::File::options()
        .write(true)
        .open(&first_file)
        .unwrap()
        .set_modified(two_days_ago)
        .unwrap();

    let second = runner.run(store.job(job_id).unwrap()).await.unwrap();
    assert_eq!(second.status, ExecutionStatus::Completed, "{:?}", second.error_message);
    assert_eq!(second.result_summary.as_ref().unwrap()["deleted_files"], 1);
    assert!(!first_file.exists());

    let remaining: Vec<_> = std::fs::read_dir(backups.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("backup_shop_"))
        .collect();
    assert_eq!(remaining.len(), 1);

    assert_eq!(store.executions_for(job_id).len(), 2);
    assert_eq!(store.job(job_id).unwrap().success_count, 2);
}

#[tokio::test]
async fn test_tick_dispatches_only_due_jobs() {
    let store = Arc::new(MemoryScheduleStore::new());
    let now = Utc::now();

    let due_id = store.insert_job(job(JobType::InventorySync));
    let recent_id = store.insert_job(ran_at(
        job(JobType::PriceUpdate),
        ScheduleInterval::Hourly,
        now - ChronoDuration::minutes(5),
    ));
    let paused_id = store.insert_job(job(JobType::ReportGeneration));
    store.update_job(paused_id, |j| j.status = JobStatus::Paused);
    let locked_id = store.insert_job(job(JobType::InventorySync));
    store.put_lock(JobLock {
        job_id: locked_id,
        locked_by: "scheduler-other".to_string(),
        expires_at: now + ChronoDuration::minutes(30),
    });

    let registry = collection_registry(FakeCollector::default(), std::path::Path::new("backups"));
    let settings = SchedulerSettings {
        shutdown_timeout: Duration::from_secs(5),
        ..SchedulerSettings::default()
    };
    let manager = SchedulerManager::with_owner(store.clone(), registry, settings, "scheduler-test");

    let dispatched = manager.tick().await.unwrap();
    manager.stop().await;

    assert_eq!(dispatched, 1);
    assert_eq!(manager.jobs().await.len(), 3);
    assert_eq!(store.executions_for(due_id).len(), 1);
    assert!(store.executions_for(recent_id).is_empty());
    assert!(store.executions_for(paused_id).is_empty());
    assert!(store.executions_for(locked_id).is_empty());
    assert_eq!(manager.active_workers().await, 0);

    let recent = store.job(recent_id).unwrap();
    assert_eq!(
        recent.next_run_at,
        recent.last_run_at.map(|t| t + ChronoDuration::hours(1))
    );
}

#[tokio::test]
async fn test_tick_redispatches_job_with_expired_lock() {
    let store = Arc::new(MemoryScheduleStore::new());
    let job_id = store.insert_job(job(JobType::InventorySync));
    store.put_lock(JobLock {
        job_id,
        locked_by: "scheduler-crashed".to_string(),
        expires_at: Utc::now() - ChronoDuration::seconds(5),
    });

    let registry = collection_registry(FakeCollector::default(), std::path::Path::new("backups"));
    let manager = SchedulerManager::with_owner(
        store.clone(),
        registry,
        SchedulerSettings::default(),
        "scheduler-test",
    );

    assert!(!manager.runner().locks().is_locked(job_id).await);
    assert_eq!(manager.load_jobs().await.unwrap(), 1);
    assert_eq!(manager.due_jobs(Utc::now()).await.len(), 1);

    let dispatched = manager.tick().await.unwrap();
    manager.stop().await;

    assert_eq!(dispatched, 1);
    let executions = store.executions_for(job_id);
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Completed);
    assert!(store.lock_for(job_id).is_none());
    assert_eq!(store.job(job_id).unwrap().success_count, 1);
}

#[tokio::test]
async fn test_run_loop_exits_on_stop() {
    let store = Arc::new(MemoryScheduleStore::new());
    let job_id = store.insert_job(job(JobType::InventorySync));

    let registry = collection_registry(FakeCollector::default(), std::path::Path::new("backups"));
    let settings = SchedulerSettings {
        poll_interval: Duration::from_millis(20),
        ..SchedulerSettings::default()
    };
    let manager = Arc::new(SchedulerManager::with_owner(
        store.clone(),
        registry,
        settings,
        "scheduler-test",
    ));

    let loop_handle = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run().await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(manager.is_running());
    manager.stop().await;

    tokio::time::timeout(Duration::from_secs(2), loop_handle)
        .await
        .expect("poll loop should exit after stop")
        .unwrap();
    assert!(!manager.is_running());

    // A job without a schedule only runs while it has never run
    let job = store.job(job_id).unwrap();
    assert!(job.run_count >= 1);
    assert_eq!(job.run_count, job.success_count + job.error_count);
}
