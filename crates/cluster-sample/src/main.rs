//! # Cluster Sample
//!
//! A complete single-host cluster wired up in one process:
//!
//! 1. In-memory broker and registry.
//! 2. A cluster coordinator and a node with a small worker pool.
//! 3. Sample modules registered and spawned through the coordinator.
//! 4. A message exchange with the key-value and fanout actors, a state
//!    probe, and a process-tree listing.
//!
//! The demo poses as a process named `demo` by declaring the matching
//! private queue, so actor replies land somewhere observable.

use std::sync::Arc;
use std::time::Duration;

use actor_cluster::queues::{process_queue, CLUSTER_QUEUE};
use actor_cluster::telemetry::setup_tracing;
use actor_cluster::{
    Broker, ClusterClient, ClusterError, ClusterServer, Envelope, MemoryBroker, MemoryRegistry,
    ModuleLibrary, NodeConfig, NodeServer, ProbeReply, Registry,
};
use cluster_sample::{install, paths};
use serde_json::json;
use tokio::time::{sleep, timeout};
use tracing::{error, info};

const DEMO_PROCESS_NAME: &str = "demo";

#[tokio::main]
async fn main() -> Result<(), ClusterError> {
    // Setup tracing once for the entire application
    setup_tracing();

    info!("starting single-host cluster demo");

    let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
    let registry: Arc<dyn Registry> = Arc::new(MemoryRegistry::new());

    let library = Arc::new(ModuleLibrary::new());
    install(&library);

    broker.declare_queue(CLUSTER_QUEUE).await?;
    let coordinator = ClusterServer::new(Arc::clone(&broker), Arc::clone(&registry));
    tokio::spawn(coordinator.run());

    let node = NodeServer::new(
        NodeConfig::new("demo-node").with_workers(2),
        Arc::clone(&broker),
        Arc::clone(&registry),
        Arc::clone(&library),
    );
    node.run();

    let client = ClusterClient::new(Arc::clone(&broker), Arc::clone(&registry));
    client.load_module("KeyValue", paths::KEY_VALUE).await?;
    client.load_module("Fanout", paths::FANOUT).await?;
    client.load_module("FanoutWorker", paths::FANOUT_WORKER).await?;
    // Let the load-module broadcasts reach the worker caches.
    sleep(Duration::from_millis(100)).await;

    client
        .spawn_root_process("KeyValue", json!({}), "kv")
        .await?;
    client
        .spawn_root_process(
            "Fanout",
            json!({"workerModuleName": "FanoutWorker"}),
            "dispatcher",
        )
        .await?;
    sleep(Duration::from_millis(100)).await;

    // Pose as a process so replies have somewhere to go.
    let demo_queue = process_queue(DEMO_PROCESS_NAME);
    broker.declare_queue(&demo_queue).await?;
    let replies = broker.consume(&demo_queue).await?;

    // Key-value: set then get.
    send(
        &broker,
        "kv",
        json!({"type": "set", "key": "greeting", "value": "world"}),
    )
    .await?;
    send(&broker, "kv", json!({"type": "get", "key": "greeting"})).await?;
    match timeout(Duration::from_secs(2), replies.recv()).await {
        Ok(Some(body)) => {
            if let Envelope::ProcessDirectMessage { message, .. } = Envelope::from_wire(&body)? {
                info!(value = %message["value"], "key-value replied");
            }
        }
        _ => error!("key-value actor did not reply"),
    }

    // Fanout: one request, answered by a freshly spawned worker child.
    send(
        &broker,
        "dispatcher",
        json!({"type": "request", "name": "demo"}),
    )
    .await?;
    match timeout(Duration::from_secs(2), replies.recv()).await {
        Ok(Some(body)) => {
            if let Envelope::ProcessDirectMessage { message, .. } = Envelope::from_wire(&body)? {
                info!(response = %message["response"], "dispatcher replied");
            }
        }
        _ => error!("dispatcher did not reply"),
    }

    // Probe the dispatcher without touching its state.
    broker.declare_queue("demo-probe").await?;
    let probe_replies = broker.consume("demo-probe").await?;
    let probe = Envelope::ProcessProbeState {
        reply_queue_name: "demo-probe".to_string(),
    };
    broker
        .send_to_queue(&process_queue("dispatcher"), probe.to_wire()?)
        .await?;
    if let Ok(Some(body)) = timeout(Duration::from_secs(2), probe_replies.recv()).await {
        let reply = ProbeReply::from_wire(&body)?;
        info!(
            process_name = %reply.process_name,
            children = reply.children_process_names.len(),
            "probe answered"
        );
    }

    // The registry-backed view of everything alive right now.
    let tree = client.list_processes().await?;
    info!(?tree, "process tree");

    info!("demo completed");
    Ok(())
}

async fn send(
    broker: &Arc<dyn Broker>,
    target: &str,
    message: serde_json::Value,
) -> Result<(), ClusterError> {
    let envelope = Envelope::ProcessDirectMessage {
        source_process_name: DEMO_PROCESS_NAME.to_string(),
        message,
    };
    broker
        .send_to_queue(&process_queue(target), envelope.to_wire()?)
        .await
}
