//! # Node Bootstrap
//!
//! A [`NodeServer`] is one host's worker pool: it spins up `num_workers`
//! [`WorkerServer`](crate::worker::WorkerServer)s sharing the host's broker
//! and registry handles and its module library. Worker names are generated;
//! the pool size defaults to the host's hardware parallelism.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::behavior::ModuleLibrary;
use crate::broker::Broker;
use crate::registry::Registry;
use crate::worker::spawn_worker;

/// Recognized bootstrap options for one node. Log verbosity is not a field:
/// it is controlled through `RUST_LOG` (see [`crate::telemetry`]).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_name: String,
    pub num_workers: usize,
}

impl NodeConfig {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            num_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }
}

pub struct NodeServer {
    config: NodeConfig,
    broker: Arc<dyn Broker>,
    registry: Arc<dyn Registry>,
    library: Arc<ModuleLibrary>,
}

impl NodeServer {
    pub fn new(
        config: NodeConfig,
        broker: Arc<dyn Broker>,
        registry: Arc<dyn Registry>,
        library: Arc<ModuleLibrary>,
    ) -> Self {
        Self {
            config,
            broker,
            registry,
            library,
        }
    }

    /// Starts the worker pool. Workers keep running in the background.
    pub fn run(&self) {
        for _ in 0..self.config.num_workers {
            let worker_name = Uuid::new_v4().to_string();
            spawn_worker(
                &self.config.node_name,
                &worker_name,
                Arc::clone(&self.broker),
                Arc::clone(&self.registry),
                Arc::clone(&self.library),
            );
        }
        info!(
            node_name = %self.config.node_name,
            num_workers = self.config.num_workers,
            "node started"
        );
    }
}
