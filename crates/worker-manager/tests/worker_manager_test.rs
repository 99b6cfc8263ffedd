//! End-to-end tests for WorkerManager lifecycle, submission and shutdown
//!
//! Run with: cargo test -p async-worker-manager --test worker_manager_test

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use async_worker_manager::{
    handler_fn, timeout_callback_fn, EventLevel, RecordingSink, WorkerManager,
    WorkerManagerConfig, WorkerManagerError, WorkerManagerStatus,
};

/// Shared append-only log written by handlers and callbacks
#[derive(Clone, Default)]
struct SharedLog(Arc<Mutex<Vec<String>>>);

impl SharedLog {
    fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

fn logging_manager(config: WorkerManagerConfig, log: SharedLog) -> WorkerManager<String> {
    WorkerManager::new(
        config,
        handler_fn(move |task: String| {
            let log = log.clone();
            async move {
                log.push(task);
                Ok(())
            }
        }),
    )
    .unwrap()
}

/// Manager whose handler waits for a permit on `gate` before finishing
fn gated_manager(config: WorkerManagerConfig, gate: Arc<Semaphore>) -> WorkerManager<u32> {
    WorkerManager::new(
        config,
        handler_fn(move |_task: u32| {
            let gate = Arc::clone(&gate);
            async move {
                let permit = gate.acquire().await?;
                permit.forget();
                Ok::<(), anyhow::Error>(())
            }
        }),
    )
    .unwrap()
}

async fn wait_for_empty_queue<T>(manager: &WorkerManager<T>) {
    while manager.queue_len() > 0 {
        tokio::task::yield_now().await;
    }
}

// ============================================
// Lifecycle
// ============================================

#[test_log::test(tokio::test)]
async fn test_scenario_all_tasks_handled_before_stop_returns() {
    let log = SharedLog::default();
    let config = WorkerManagerConfig::new()
        .with_num_workers(2)
        .with_queue_size(5);
    let manager = logging_manager(config, log.clone());

    manager.start().await.unwrap();
    for i in 0..5 {
        manager.handle(format!("task-{i}")).await.unwrap();
    }
    manager.stop().await;

    let mut entries = log.entries();
    assert_eq!(entries.len(), 5);
    entries.sort();
    let expected: Vec<String> = (0..5).map(|i| format!("task-{i}")).collect();
    assert_eq!(entries, expected);

    assert_eq!(manager.status(), WorkerManagerStatus::Stopped);
    assert_eq!(manager.stats().completed, 5);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_scenario_timeouts_invoke_fallback_for_every_task() {
    let completed = SharedLog::default();
    let timed_out = SharedLog::default();
    let sink = Arc::new(RecordingSink::new());

    let config = WorkerManagerConfig::new()
        .with_num_workers(2)
        .with_queue_size(5)
        .with_timeout(Duration::from_millis(100));

    let handler_log = completed.clone();
    let callback_log = timed_out.clone();
    let manager = WorkerManager::new(
        config,
        handler_fn(move |task: String| {
            let log = handler_log.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                log.push(format!("Processed: {task}"));
                Ok(())
            }
        }),
    )
    .unwrap()
    .with_timeout_callback(timeout_callback_fn(move |task: String| {
        let log = callback_log.clone();
        async move {
            log.push(format!("Timeout task: {task}"));
            Ok(())
        }
    }))
    .with_sink(sink.clone());

    manager.start().await.unwrap();
    for i in 0..5 {
        manager.handle(format!("Task {i}")).await.unwrap();
    }
    manager.stop().await;

    assert_eq!(timed_out.entries().len(), 5);
    assert!(completed.entries().is_empty());
    assert_eq!(manager.stats().timed_out, 5);

    let warnings = sink.messages(EventLevel::Warn);
    assert_eq!(warnings.len(), 5);
    for i in 0..5 {
        let task = format!("\"Task {i}\"");
        assert!(
            warnings.iter().any(|w| w.contains(&task)),
            "no timeout record for {task}"
        );
    }
}

#[tokio::test]
async fn test_start_twice_fails_and_keeps_started() {
    let manager = logging_manager(
        WorkerManagerConfig::new().with_num_workers(1),
        SharedLog::default(),
    );

    manager.start().await.unwrap();
    let err = manager.start().await.unwrap_err();

    assert!(matches!(
        err,
        WorkerManagerError::InvalidState {
            operation: "start",
            status: WorkerManagerStatus::Started
        }
    ));
    assert_eq!(manager.status(), WorkerManagerStatus::Started);

    manager.stop().await;
}

#[tokio::test]
async fn test_stop_before_start_is_noop() {
    let manager = logging_manager(WorkerManagerConfig::default(), SharedLog::default());

    manager.stop().await;
    assert_eq!(manager.status(), WorkerManagerStatus::Init);

    // Still startable afterwards
    manager.start().await.unwrap();
    manager.stop().await;
    assert_eq!(manager.status(), WorkerManagerStatus::Stopped);
}

#[tokio::test]
async fn test_stop_twice_is_noop() {
    let manager = logging_manager(
        WorkerManagerConfig::new().with_num_workers(2),
        SharedLog::default(),
    );

    manager.start().await.unwrap();
    manager.stop().await;
    manager.stop().await;
    assert_eq!(manager.status(), WorkerManagerStatus::Stopped);
}

#[tokio::test]
async fn test_concurrent_stops_both_return() {
    let log = SharedLog::default();
    let manager = Arc::new(logging_manager(
        WorkerManagerConfig::new().with_num_workers(2),
        log.clone(),
    ));

    manager.start().await.unwrap();
    for i in 0..10 {
        manager.handle(i.to_string()).await.unwrap();
    }

    let first = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.stop().await }
    });
    let second = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.stop().await }
    });
    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(manager.status(), WorkerManagerStatus::Stopped);
    assert_eq!(log.entries().len(), 10);
}

#[tokio::test]
async fn test_stop_waits_for_tasks_submitted_while_draining() {
    let gate = Arc::new(Semaphore::new(0));
    let log = SharedLog::default();
    let handler_log = log.clone();
    let handler_gate = Arc::clone(&gate);
    let manager = Arc::new(
        WorkerManager::new(
            WorkerManagerConfig::new()
                .with_num_workers(1)
                .with_queue_size(5),
            handler_fn(move |task: u32| {
                let gate = Arc::clone(&handler_gate);
                let log = handler_log.clone();
                async move {
                    gate.acquire().await?.forget();
                    log.push(task.to_string());
                    Ok::<(), anyhow::Error>(())
                }
            }),
        )
        .unwrap(),
    );
    manager.start().await.unwrap();

    // Task 1 is in the handler, so the first drain cannot finish yet
    manager.handle(1).await.unwrap();
    wait_for_empty_queue(&manager).await;

    let stopper = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.stop().await })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!stopper.is_finished());

    manager.handle(2).await.unwrap();
    assert!(!stopper.is_finished());

    gate.add_permits(2);
    stopper.await.unwrap();

    assert_eq!(log.entries(), vec!["1".to_string(), "2".to_string()]);
    assert_eq!(manager.stats().completed, 2);
    assert_eq!(manager.status(), WorkerManagerStatus::Stopped);
}

// ============================================
// Submission
// ============================================

#[tokio::test]
async fn test_handle_before_start_and_after_stop_fails() {
    let manager = logging_manager(WorkerManagerConfig::default(), SharedLog::default());

    let err = manager.handle("early".to_string()).await.unwrap_err();
    assert_eq!(
        err,
        WorkerManagerError::InvalidState {
            operation: "handle",
            status: WorkerManagerStatus::Init
        }
    );

    manager.start().await.unwrap();
    manager.stop().await;

    let err = manager.handle("late".to_string()).await.unwrap_err();
    assert_eq!(
        err,
        WorkerManagerError::InvalidState {
            operation: "handle",
            status: WorkerManagerStatus::Stopped
        }
    );
    assert!(matches!(
        manager.handle_nowait("late".to_string()),
        Err(WorkerManagerError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_handle_nowait_full_at_capacity() {
    let gate = Arc::new(Semaphore::new(0));
    let config = WorkerManagerConfig::new()
        .with_num_workers(1)
        .with_queue_size(2);
    let manager = gated_manager(config, Arc::clone(&gate));
    manager.start().await.unwrap();

    // The single worker takes the first task and blocks on the gate
    manager.handle_nowait(0).unwrap();
    wait_for_empty_queue(&manager).await;

    manager.handle_nowait(1).unwrap();
    manager.handle_nowait(2).unwrap();
    assert_eq!(manager.queue_len(), 2);

    assert_eq!(manager.handle_nowait(3), Err(WorkerManagerError::Full));
    assert_eq!(manager.queue_len(), 2);

    gate.add_permits(3);
    manager.stop().await;
    assert_eq!(manager.stats().completed, 3);
}

#[tokio::test]
async fn test_blocking_handle_waits_for_space() {
    let gate = Arc::new(Semaphore::new(0));
    let config = WorkerManagerConfig::new()
        .with_num_workers(1)
        .with_queue_size(1);
    let manager = Arc::new(gated_manager(config, Arc::clone(&gate)));
    manager.start().await.unwrap();

    manager.handle(0).await.unwrap();
    wait_for_empty_queue(&manager).await;
    manager.handle(1).await.unwrap();

    let blocked = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.handle(2).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!blocked.is_finished(), "submission should wait for space");

    gate.add_permits(1);
    blocked.await.unwrap().unwrap();

    gate.add_permits(2);
    manager.stop().await;
    assert_eq!(manager.stats().completed, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submitters_each_task_handled_once() {
    let counts: Arc<Mutex<HashMap<u32, usize>>> = Arc::default();
    let handler_counts = Arc::clone(&counts);
    let manager = Arc::new(
        WorkerManager::new(
            WorkerManagerConfig::new()
                .with_num_workers(4)
                .with_queue_size(3),
            handler_fn(move |task: u32| {
                let counts = Arc::clone(&handler_counts);
                async move {
                    tokio::task::yield_now().await;
                    *counts.lock().entry(task).or_default() += 1;
                    Ok(())
                }
            }),
        )
        .unwrap(),
    );
    manager.start().await.unwrap();

    let mut submitters = Vec::new();
    for producer in 0..5u32 {
        let manager = Arc::clone(&manager);
        submitters.push(tokio::spawn(async move {
            for i in 0..40u32 {
                manager.handle(producer * 1000 + i).await.unwrap();
            }
        }));
    }
    for submitter in submitters {
        submitter.await.unwrap();
    }
    manager.stop().await;

    let counts = counts.lock();
    assert_eq!(counts.len(), 200);
    assert!(counts.values().all(|&n| n == 1));
    assert_eq!(manager.stats().completed, 200);
}

// ============================================
// Failure containment
// ============================================

#[test_log::test(tokio::test)]
async fn test_handler_errors_do_not_stop_workers() {
    let sink = Arc::new(RecordingSink::new());
    let manager = WorkerManager::new(
        WorkerManagerConfig::new()
            .with_num_workers(2)
            .with_queue_size(10),
        handler_fn(|task: u32| async move {
            if task % 2 == 0 {
                anyhow::bail!("even task {task} rejected");
            }
            Ok(())
        }),
    )
    .unwrap()
    .with_sink(sink.clone());

    manager.start().await.unwrap();
    for i in 0..10 {
        manager.handle(i).await.unwrap();
    }
    manager.stop().await;

    let stats = manager.stats();
    assert_eq!(stats.completed, 5);
    assert_eq!(stats.failed, 5);

    let errors = sink.messages(EventLevel::Error);
    assert_eq!(errors.len(), 5);
    assert!(errors.iter().all(|e| e.contains("rejected")));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_without_callback_only_logs() {
    let sink = Arc::new(RecordingSink::new());
    let manager = WorkerManager::new(
        WorkerManagerConfig::new()
            .with_num_workers(1)
            .with_queue_size(2)
            .with_timeout(Duration::from_millis(10)),
        handler_fn(|_task: u32| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }),
    )
    .unwrap()
    .with_sink(sink.clone());

    manager.start().await.unwrap();
    manager.handle(1).await.unwrap();
    manager.stop().await;

    assert_eq!(manager.stats().timed_out, 1);
    assert_eq!(sink.messages(EventLevel::Warn).len(), 1);
    assert!(sink.messages(EventLevel::Error).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failing_timeout_callback_is_contained() {
    let sink = Arc::new(RecordingSink::new());
    let manager = WorkerManager::new(
        WorkerManagerConfig::new()
            .with_num_workers(1)
            .with_timeout(Duration::from_millis(10)),
        handler_fn(|_task: u32| async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        }),
    )
    .unwrap()
    .with_timeout_callback(timeout_callback_fn(|task: u32| async move {
        if task == 1 {
            panic!("fallback crashed");
        }
        Err::<(), _>(anyhow::anyhow!("fallback refused {task}"))
    }))
    .with_sink(sink.clone());

    manager.start().await.unwrap();
    manager.handle(1).await.unwrap();
    manager.handle(2).await.unwrap();
    manager.stop().await;

    let stats = manager.stats();
    assert_eq!(stats.timed_out, 2);
    assert_eq!(stats.callback_failed, 2);

    let warnings = sink.messages(EventLevel::Warn);
    assert!(warnings
        .iter()
        .any(|w| w.contains("Error on timeout callback") && w.contains("fallback crashed")));
    assert!(warnings
        .iter()
        .any(|w| w.contains("Error on timeout callback") && w.contains("fallback refused 2")));
}

#[tokio::test]
async fn test_custom_worker_prefix_in_records() {
    let sink = Arc::new(RecordingSink::new());
    let manager = WorkerManager::new(
        WorkerManagerConfig::new()
            .with_num_workers(1)
            .with_worker_prefix("ingest"),
        handler_fn(|_task: u32| async move { Err::<(), _>(anyhow::anyhow!("nope")) }),
    )
    .unwrap()
    .with_sink(sink.clone());

    manager.start().await.unwrap();
    manager.handle(9).await.unwrap();
    manager.stop().await;

    let errors = sink.messages(EventLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("ingest-0: "));
}
