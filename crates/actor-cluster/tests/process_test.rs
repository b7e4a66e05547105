use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use actor_cluster::queues::{process_queue, CLUSTER_QUEUE, PROCESSES_COLLECTION};
use actor_cluster::{
    ActorFailure, Broker, Envelope, ExitOptions, MemoryBroker, MemoryRegistry, ProbeReply,
    Process, ProcessBehavior, ProcessContext, ProcessIdentity, Registry, CHILD_PROCESS_EXIT,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::{sleep, timeout, Instant};

// --- Test behaviors ---

/// Appends every inbound message (and its sender) to the state array.
struct Recorder;

#[async_trait]
impl ProcessBehavior for Recorder {
    async fn did_receive_message(
        &self,
        state: Value,
        message: Value,
        source_process_name: &str,
        _ctx: &ProcessContext,
    ) -> Result<Value, ActorFailure> {
        let mut items = state.as_array().cloned().unwrap_or_default();
        items.push(json!({"from": source_process_name, "message": message}));
        Ok(Value::Array(items))
    }
}

/// Suspends for a minute on every message; used to prove preemption.
struct Sluggish;

#[async_trait]
impl ProcessBehavior for Sluggish {
    async fn did_receive_message(
        &self,
        state: Value,
        _message: Value,
        _source_process_name: &str,
        _ctx: &ProcessContext,
    ) -> Result<Value, ActorFailure> {
        sleep(Duration::from_secs(60)).await;
        Ok(state)
    }
}

/// Fails before ever becoming active.
struct FailingStartup;

#[async_trait]
impl ProcessBehavior for FailingStartup {
    async fn will_run(&self, _state: Value, _ctx: &ProcessContext) -> Result<Value, ActorFailure> {
        Err(ActorFailure::new("startup rejected"))
    }
}

/// All hooks defaulted.
struct Noop;

#[async_trait]
impl ProcessBehavior for Noop {}

// --- Helpers ---

fn identity(name: &str, parent: &str, module: &str) -> ProcessIdentity {
    ProcessIdentity {
        process_name: name.into(),
        parent_process_name: parent.into(),
        module_name: module.into(),
    }
}

fn harness() -> (Arc<dyn Broker>, Arc<dyn Registry>) {
    (
        Arc::new(MemoryBroker::new()),
        Arc::new(MemoryRegistry::new()),
    )
}

async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if check().await {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn send_direct(
    broker: &Arc<dyn Broker>,
    target: &str,
    source: &str,
    message: Value,
) {
    let envelope = Envelope::ProcessDirectMessage {
        source_process_name: source.into(),
        message,
    };
    broker
        .send_to_queue(&process_queue(target), envelope.to_wire().unwrap())
        .await
        .unwrap();
}

// --- Tests ---

#[tokio::test]
async fn spawn_records_children_synchronously() {
    let (broker, registry) = harness();
    broker.declare_queue(CLUSTER_QUEUE).await.unwrap();
    let cluster_feed = broker.consume(CLUSTER_QUEUE).await.unwrap();

    let process = Process::new(
        identity("parent-1", "root", "Sup"),
        json!([]),
        Arc::new(Recorder),
        Arc::clone(&broker),
        Arc::clone(&registry),
    );
    process.run().await;
    let ctx = process.context();

    let first = ctx.spawn("childmod", json!({"n": 1})).await;
    let second = ctx.spawn("childmod", json!({"n": 2})).await;

    assert_ne!(first, second);
    assert!(first.starts_with("childmod:"));
    assert!(second.starts_with("childmod:"));
    let children = ctx.children_process_names();
    assert!(children.contains(&first) && children.contains(&second));

    for expected in [&first, &second] {
        let body = timeout(Duration::from_secs(1), cluster_feed.recv())
            .await
            .expect("spawn request must reach the cluster queue")
            .unwrap();
        match Envelope::from_wire(&body).unwrap() {
            Envelope::ClusterSpawnProcess {
                process_name,
                parent_process_name,
                module_name,
                ..
            } => {
                assert_eq!(&process_name, expected);
                assert_eq!(parent_process_name, "parent-1");
                assert_eq!(module_name, "childmod");
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }
}

#[tokio::test]
async fn probe_replies_without_touching_state() {
    let (broker, registry) = harness();
    let process = Process::new(
        identity("probed-1", "root", "Sup"),
        json!([]),
        Arc::new(Recorder),
        Arc::clone(&broker),
        Arc::clone(&registry),
    );
    process.run().await;
    let ctx = process.context();
    let a = ctx.spawn("childmod", json!({})).await;
    let b = ctx.spawn("childmod", json!({})).await;

    broker.declare_queue("probe-reply-1").await.unwrap();
    let reply_feed = broker.consume("probe-reply-1").await.unwrap();
    let probe = Envelope::ProcessProbeState {
        reply_queue_name: "probe-reply-1".into(),
    };
    broker
        .send_to_queue(&process_queue("probed-1"), probe.to_wire().unwrap())
        .await
        .unwrap();

    let body = timeout(Duration::from_secs(1), reply_feed.recv())
        .await
        .expect("probe must be answered")
        .unwrap();
    let reply = ProbeReply::from_wire(&body).unwrap();
    assert_eq!(reply.process_name, "probed-1");
    assert_eq!(reply.parent_process_name, "root");
    assert_eq!(reply.children_process_names.len(), 2);
    assert!(reply.children_process_names.contains(&a));
    assert!(reply.children_process_names.contains(&b));

    // Introspection never mutated the handler state.
    assert_eq!(ctx.state(), json!([]));
}

#[tokio::test]
async fn direct_messages_are_handled_in_arrival_order() {
    let (broker, registry) = harness();
    let process = Process::new(
        identity("recorder-1", "root", "Rec"),
        json!([]),
        Arc::new(Recorder),
        Arc::clone(&broker),
        Arc::clone(&registry),
    );
    process.run().await;

    for i in 0..3 {
        send_direct(&broker, "recorder-1", "tester", json!(i)).await;
    }

    let ctx = process.context();
    assert!(
        eventually(|| {
            let state = ctx.state();
            async move { state.as_array().map(|items| items.len()) == Some(3) }
        })
        .await,
        "all three messages must be handled"
    );
    let state = ctx.state();
    let received: Vec<&Value> = state
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| &entry["message"])
        .collect();
    assert_eq!(received, [&json!(0), &json!(1), &json!(2)]);
}

#[tokio::test]
async fn parent_exit_cascades_and_preempts_pending_tasks() {
    let (broker, registry) = harness();

    let parent = Process::new(
        identity("boss-1", "root", "Sup"),
        json!([]),
        Arc::new(Recorder),
        Arc::clone(&broker),
        Arc::clone(&registry),
    );
    parent.run().await;
    let child_name = parent.context().spawn("slowmod", json!({})).await;

    let child = Process::new(
        identity(&child_name, "boss-1", "slowmod"),
        json!({}),
        Arc::new(Sluggish),
        Arc::clone(&broker),
        Arc::clone(&registry),
    );
    child.run().await;
    assert!(registry
        .get(PROCESSES_COLLECTION, &child_name)
        .await
        .unwrap()
        .is_some());

    // One message suspends the child for a minute, another queues behind it.
    send_direct(&broker, &child_name, "tester", json!("block")).await;
    send_direct(&broker, &child_name, "tester", json!("pending")).await;
    sleep(Duration::from_millis(50)).await;

    parent
        .context()
        .exit(ActorFailure::new("shutting down"), ExitOptions::default())
        .await;

    // The parent-exit notification must not wait behind the suspended task.
    let reg = Arc::clone(&registry);
    let name = child_name.clone();
    assert!(
        eventually(|| {
            let reg = Arc::clone(&reg);
            let name = name.clone();
            async move {
                reg.get(PROCESSES_COLLECTION, &name)
                    .await
                    .unwrap()
                    .is_none()
            }
        })
        .await,
        "child must terminate promptly after parent exit"
    );
    assert!(registry
        .get(PROCESSES_COLLECTION, "boss-1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn failed_startup_never_registers_and_notifies_parent() {
    let (broker, registry) = harness();
    broker
        .declare_queue(&process_queue("boss-2"))
        .await
        .unwrap();
    let parent_feed = broker.consume(&process_queue("boss-2")).await.unwrap();

    let process = Process::new(
        identity("doomed-1", "boss-2", "Bad"),
        json!({}),
        Arc::new(FailingStartup),
        Arc::clone(&broker),
        Arc::clone(&registry),
    );
    process.run().await;

    assert!(registry
        .get(PROCESSES_COLLECTION, "doomed-1")
        .await
        .unwrap()
        .is_none());

    let body = timeout(Duration::from_secs(1), parent_feed.recv())
        .await
        .expect("parent must hear about the failed start")
        .unwrap();
    match Envelope::from_wire(&body).unwrap() {
        Envelope::ProcessDirectMessage {
            source_process_name,
            message,
        } => {
            assert_eq!(source_process_name, "doomed-1");
            assert_eq!(message["type"], CHILD_PROCESS_EXIT);
            assert_eq!(message["payload"]["err"]["cause"], "startup rejected");
        }
        other => panic!("unexpected envelope: {other:?}"),
    }
}

#[tokio::test]
async fn child_exit_surfaces_to_the_parent_handler() {
    let (broker, registry) = harness();
    let parent = Process::new(
        identity("watcher-1", "root", "Sup"),
        json!([]),
        Arc::new(Recorder),
        Arc::clone(&broker),
        Arc::clone(&registry),
    );
    parent.run().await;

    let child = Process::new(
        identity("noop-1", "watcher-1", "Noop"),
        json!({}),
        Arc::new(Noop),
        Arc::clone(&broker),
        Arc::clone(&registry),
    );
    child.run().await;
    child
        .context()
        .exit(ActorFailure::new("bye"), ExitOptions::default())
        .await;

    let ctx = parent.context();
    assert!(
        eventually(|| {
            let state = ctx.state();
            async move {
                state
                    .as_array()
                    .and_then(|items| items.first())
                    .map(|entry| {
                        entry["from"] == json!("noop-1")
                            && entry["message"]["type"] == json!(CHILD_PROCESS_EXIT)
                            && entry["message"]["payload"]["err"]["cause"] == json!("bye")
                    })
                    .unwrap_or(false)
            }
        })
        .await,
        "parent handler must observe the child exit"
    );
}
