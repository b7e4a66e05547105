use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use actor_cluster::{task, ActorFailure, TaskScheduler};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};

fn push(state: Value, item: u64) -> Value {
    let mut items = state.as_array().cloned().unwrap_or_default();
    items.push(json!(item));
    Value::Array(items)
}

#[tokio::test]
async fn tasks_run_in_fifo_order_and_fold_over_state() {
    let (scheduler, _failures) = TaskScheduler::new(json!([]));

    for i in 0..10u64 {
        scheduler.enqueue(task(move |state| async move {
            // Suspend some of the tasks to prove order survives suspension.
            if i % 2 == 0 {
                sleep(Duration::from_millis(2)).await;
            }
            Ok(push(state, i))
        }));
    }
    let (done_tx, done_rx) = oneshot::channel();
    scheduler.enqueue(task(move |state| async move {
        let _ = done_tx.send(());
        Ok(state)
    }));
    timeout(Duration::from_secs(2), done_rx)
        .await
        .expect("tasks must drain")
        .unwrap();

    let expected: Vec<Value> = (0..10u64).map(|i| json!(i)).collect();
    assert_eq!(scheduler.state(), Value::Array(expected));
}

#[tokio::test]
async fn tasks_never_overlap() {
    let (scheduler, _failures) = TaskScheduler::new(json!(null));
    let active = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    for _ in 0..8 {
        let active = Arc::clone(&active);
        let max_seen = Arc::clone(&max_seen);
        scheduler.enqueue(task(move |state| async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(5)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(state)
        }));
    }
    let (done_tx, done_rx) = oneshot::channel();
    scheduler.enqueue(task(move |state| async move {
        let _ = done_tx.send(());
        Ok(state)
    }));
    timeout(Duration::from_secs(2), done_rx)
        .await
        .expect("tasks must drain")
        .unwrap();

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn state_is_initial_before_any_task_completes() {
    let (scheduler, _failures) = TaskScheduler::new(json!({"k": "v"}));
    assert_eq!(scheduler.state(), json!({"k": "v"}));
}

#[tokio::test]
async fn failure_discards_pending_work_and_fires_once() {
    let (scheduler, failures) = TaskScheduler::new(json!([]));
    let after_failure_ran = Arc::new(AtomicUsize::new(0));

    scheduler.enqueue(task(|state| async move { Ok(push(state, 1)) }));
    scheduler.enqueue(task(|state| async move { Ok(push(state, 2)) }));
    scheduler.enqueue(task(|_state| async move {
        Err(ActorFailure::new("handler blew up"))
    }));
    let ran = Arc::clone(&after_failure_ran);
    scheduler.enqueue(task(move |state| async move {
        ran.fetch_add(1, Ordering::SeqCst);
        Ok(state)
    }));

    let failure = timeout(Duration::from_secs(2), failures)
        .await
        .expect("failure must surface")
        .expect("failure channel must fire");
    assert_eq!(failure, ActorFailure::new("handler blew up"));

    // Tasks enqueued before the failing one completed in order.
    assert_eq!(scheduler.state(), json!([1, 2]));
    assert!(scheduler.is_terminal());

    // Post-terminal enqueues are no-ops.
    let ran = Arc::clone(&after_failure_ran);
    scheduler.enqueue(task(move |state| async move {
        ran.fetch_add(1, Ordering::SeqCst);
        Ok(state)
    }));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(after_failure_ran.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.state(), json!([1, 2]));
}

#[tokio::test]
async fn termination_discards_work_enqueued_before_it() {
    let (scheduler, _failures) = TaskScheduler::new(json!(null));
    let ran = Arc::new(AtomicUsize::new(0));

    // Enqueue first, terminate second, without yielding in between: the run
    // loop sees both at its first poll and must choose termination.
    let flag = Arc::clone(&ran);
    scheduler.enqueue(task(move |state| async move {
        flag.fetch_add(1, Ordering::SeqCst);
        Ok(state)
    }));
    scheduler.terminate();

    sleep(Duration::from_millis(50)).await;
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(scheduler.is_terminal());
}

struct DropProbe {
    dropped: Option<oneshot::Sender<()>>,
}

impl Drop for DropProbe {
    fn drop(&mut self) {
        if let Some(tx) = self.dropped.take() {
            let _ = tx.send(());
        }
    }
}

#[tokio::test]
async fn termination_abandons_a_suspended_task_promptly() {
    let (scheduler, _failures) = TaskScheduler::new(json!(null));
    let (started_tx, started_rx) = oneshot::channel();
    let (dropped_tx, dropped_rx) = oneshot::channel();

    scheduler.enqueue(task(move |state| async move {
        let _probe = DropProbe {
            dropped: Some(dropped_tx),
        };
        let _ = started_tx.send(());
        // Would suspend for a minute; termination must not wait for it.
        sleep(Duration::from_secs(60)).await;
        Ok(state)
    }));
    timeout(Duration::from_secs(2), started_rx)
        .await
        .expect("task must start")
        .unwrap();

    scheduler.terminate();

    timeout(Duration::from_secs(1), dropped_rx)
        .await
        .expect("suspended task must be abandoned promptly")
        .unwrap();
    assert!(scheduler.is_terminal());
}
