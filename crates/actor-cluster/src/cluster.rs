//! # Cluster Coordinator
//!
//! The cluster-wide singleton serializing the two cross-cutting operations:
//! module registration and process spawning. [`ClusterServer`] consumes the
//! cluster queue; [`ClusterClient`] is the external interface that feeds it
//! and reads the registries.
//!
//! The coordinator never picks a worker. Spawn requests are relayed
//! unchanged onto the spawn-assignment queue and the broker's
//! competing-consumer delivery assigns exactly one worker host.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::envelope::Envelope;
use crate::error::ClusterError;
use crate::queues::{
    CLUSTER_QUEUE, MODULES_COLLECTION, MODULES_QUEUE, PROCESSES_COLLECTION, ROOT_PROCESS_NAME,
    SPAWN_PROCESS_QUEUE,
};
use crate::registry::{ProcessRecord, Registry};

/// The in-memory reconstruction of the persisted process tree, rooted at
/// `"root"`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessTree {
    pub process_name: String,
    /// `None` for the synthetic root, which is never a live actor.
    pub module_name: Option<String>,
    pub children: Vec<ProcessTree>,
}

impl ProcessTree {
    /// Depth-first lookup by process name.
    pub fn find(&self, process_name: &str) -> Option<&ProcessTree> {
        if self.process_name == process_name {
            return Some(self);
        }
        self.children
            .iter()
            .find_map(|child| child.find(process_name))
    }
}

/// Consumes the cluster queue and fans work out to the worker pool.
pub struct ClusterServer {
    broker: Arc<dyn Broker>,
    registry: Arc<dyn Registry>,
}

impl ClusterServer {
    pub fn new(broker: Arc<dyn Broker>, registry: Arc<dyn Registry>) -> Self {
        Self { broker, registry }
    }

    /// Runs the coordinator loop until the cluster queue is gone. Spawn this
    /// with `tokio::spawn`.
    pub async fn run(self) -> Result<(), ClusterError> {
        self.broker.declare_fanout(MODULES_QUEUE).await?;
        self.broker.declare_queue(SPAWN_PROCESS_QUEUE).await?;
        let consumer = self.broker.consume(CLUSTER_QUEUE).await?;
        info!("cluster coordinator running");
        while let Some(body) = consumer.recv().await {
            if let Err(err) = self.handle(&body).await {
                warn!(error = %err, "cluster request failed");
            }
        }
        Ok(())
    }

    async fn handle(&self, body: &str) -> Result<(), ClusterError> {
        match Envelope::from_wire(body)? {
            Envelope::ClusterLoadModule {
                module_name,
                module_path,
            } => {
                // Overwrite is the idempotent reload path; actors already
                // running the old code are unaffected.
                self.registry
                    .put(MODULES_COLLECTION, &module_name, module_path.clone())
                    .await?;
                let notify = Envelope::WorkerLoadModule {
                    module_name: module_name.clone(),
                };
                self.broker
                    .publish(MODULES_QUEUE, notify.to_wire()?)
                    .await?;
                info!(%module_name, %module_path, "module registered");
                Ok(())
            }
            Envelope::ClusterSpawnProcess {
                module_name,
                initial_state,
                process_name,
                parent_process_name,
            } => {
                let directive = Envelope::WorkerSpawnProcess {
                    module_name,
                    initial_state,
                    process_name: process_name.clone(),
                    parent_process_name,
                };
                self.broker
                    .send_to_queue(SPAWN_PROCESS_QUEUE, directive.to_wire()?)
                    .await?;
                debug!(%process_name, "spawn relayed to worker pool");
                Ok(())
            }
            other => {
                warn!(envelope = ?other, "unexpected envelope on cluster queue");
                Ok(())
            }
        }
    }
}

/// Client-facing coordinator interface: load modules, spawn root processes,
/// inspect the registries.
#[derive(Clone)]
pub struct ClusterClient {
    broker: Arc<dyn Broker>,
    registry: Arc<dyn Registry>,
}

impl ClusterClient {
    pub fn new(broker: Arc<dyn Broker>, registry: Arc<dyn Registry>) -> Self {
        Self { broker, registry }
    }

    /// Registers `module_name` at `module_path` and notifies every worker.
    pub async fn load_module(
        &self,
        module_name: &str,
        module_path: &str,
    ) -> Result<(), ClusterError> {
        let envelope = Envelope::ClusterLoadModule {
            module_name: module_name.to_string(),
            module_path: module_path.to_string(),
        };
        self.broker
            .send_to_queue(CLUSTER_QUEUE, envelope.to_wire()?)
            .await
    }

    /// Spawns an actor with no live parent; it becomes a child of the
    /// implicit root.
    pub async fn spawn_root_process(
        &self,
        module_name: &str,
        initial_state: Value,
        process_name: &str,
    ) -> Result<(), ClusterError> {
        let envelope = Envelope::ClusterSpawnProcess {
            module_name: module_name.to_string(),
            initial_state,
            process_name: process_name.to_string(),
            parent_process_name: ROOT_PROCESS_NAME.to_string(),
        };
        self.broker
            .send_to_queue(CLUSTER_QUEUE, envelope.to_wire()?)
            .await
    }

    /// The module registry as currently persisted.
    pub async fn list_modules(&self) -> Result<HashMap<String, String>, ClusterError> {
        self.registry.all(MODULES_COLLECTION).await
    }

    /// Rebuilds the process tree from the flat registry.
    ///
    /// The registry may transiently hold orphaned leaves (their parent's
    /// record already deleted) or, after a crash, arbitrary fragments. Those
    /// are skipped with a warning; this never fails on a missing parent key.
    pub async fn list_processes(&self) -> Result<ProcessTree, ClusterError> {
        let raw = self.registry.all(PROCESSES_COLLECTION).await?;
        let mut records = HashMap::new();
        for (key, body) in &raw {
            match ProcessRecord::from_wire(body) {
                Ok(record) => {
                    records.insert(record.process_name.clone(), record);
                }
                Err(err) => warn!(%key, error = %err, "skipping undecodable process record"),
            }
        }

        let mut children_of: HashMap<String, Vec<String>> = HashMap::new();
        for record in records.values() {
            if record.parent_process_name != ROOT_PROCESS_NAME
                && !records.contains_key(&record.parent_process_name)
            {
                warn!(
                    process_name = %record.process_name,
                    parent_process_name = %record.parent_process_name,
                    "skipping orphaned process record"
                );
                continue;
            }
            children_of
                .entry(record.parent_process_name.clone())
                .or_default()
                .push(record.process_name.clone());
        }
        for names in children_of.values_mut() {
            names.sort();
        }

        let mut visited = HashSet::new();
        Ok(build_subtree(
            ROOT_PROCESS_NAME,
            &records,
            &children_of,
            &mut visited,
        ))
    }
}

fn build_subtree(
    process_name: &str,
    records: &HashMap<String, ProcessRecord>,
    children_of: &HashMap<String, Vec<String>>,
    visited: &mut HashSet<String>,
) -> ProcessTree {
    // A corrupt registry could hold a parent cycle; the visited set keeps
    // reconstruction terminating instead of recursing forever.
    visited.insert(process_name.to_string());
    let children = children_of
        .get(process_name)
        .map(|names| {
            let mut subtrees = Vec::new();
            for name in names {
                if !visited.contains(name) {
                    subtrees.push(build_subtree(name, records, children_of, visited));
                }
            }
            subtrees
        })
        .unwrap_or_default();
    ProcessTree {
        process_name: process_name.to_string(),
        module_name: records
            .get(process_name)
            .map(|record| record.module_name.clone()),
        children,
    }
}
