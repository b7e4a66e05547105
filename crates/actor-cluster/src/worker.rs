//! # Worker Host Runtime
//!
//! A [`WorkerServer`] hosts many [`Process`](crate::process::Process)
//! instances. On startup it caches every registered module by resolving the
//! persisted module path through its injected [`ModuleLibrary`], then serves
//! two streams: load-module broadcasts (cache refresh) and spawn directives
//! from the competing-consumer assignment queue.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::behavior::{ModuleLibrary, ProcessBehavior};
use crate::broker::Broker;
use crate::envelope::{child_exit_message, Envelope};
use crate::error::{ActorFailure, ClusterError};
use crate::process::{Process, ProcessIdentity};
use crate::queues::{process_queue, MODULES_COLLECTION, MODULES_QUEUE, SPAWN_PROCESS_QUEUE};
use crate::registry::Registry;

pub struct WorkerServer {
    node_name: String,
    worker_name: String,
    broker: Arc<dyn Broker>,
    registry: Arc<dyn Registry>,
    library: Arc<ModuleLibrary>,
    // Module cache keyed by module name; refreshed by load-module
    // broadcasts, overwritten idempotently.
    modules: Mutex<HashMap<String, Arc<dyn ProcessBehavior>>>,
}

impl WorkerServer {
    pub fn new(
        node_name: impl Into<String>,
        worker_name: impl Into<String>,
        broker: Arc<dyn Broker>,
        registry: Arc<dyn Registry>,
        library: Arc<ModuleLibrary>,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            worker_name: worker_name.into(),
            broker,
            registry,
            library,
            modules: Mutex::new(HashMap::new()),
        }
    }

    /// Runs the worker loops until the broker goes away. Spawn this with
    /// `tokio::spawn`.
    pub async fn run(self: Arc<Self>) -> Result<(), ClusterError> {
        // Subscribe before the catch-up read so a module registered during
        // startup is seen on one path or the other.
        let mut modules_feed = self.broker.subscribe(MODULES_QUEUE).await?;
        let registered = self.registry.all(MODULES_COLLECTION).await?;
        for (module_name, module_path) in registered {
            self.cache_module(&module_name, &module_path).await;
        }

        let spawn_feed = self.broker.consume(SPAWN_PROCESS_QUEUE).await?;
        info!(
            node_name = %self.node_name,
            worker_name = %self.worker_name,
            "worker running"
        );

        loop {
            tokio::select! {
                broadcast = modules_feed.recv() => match broadcast {
                    Some(body) => self.handle_module_notification(&body).await,
                    None => return Err(ClusterError::BrokerClosed),
                },
                directive = spawn_feed.recv() => match directive {
                    Some(body) => self.handle_spawn_directive(&body).await,
                    None => return Err(ClusterError::BrokerClosed),
                },
            }
        }
    }

    async fn handle_module_notification(&self, body: &str) {
        match Envelope::from_wire(body) {
            Ok(Envelope::WorkerLoadModule { module_name }) => {
                match self.registry.get(MODULES_COLLECTION, &module_name).await {
                    Ok(Some(module_path)) => self.cache_module(&module_name, &module_path).await,
                    Ok(None) => {
                        warn!(%module_name, "load notification for unregistered module")
                    }
                    Err(err) => warn!(%module_name, error = %err, "module lookup failed"),
                }
            }
            Ok(other) => warn!(envelope = ?other, "unexpected envelope on modules fanout"),
            Err(err) => warn!(error = %err, "skipping undecodable modules broadcast"),
        }
    }

    async fn cache_module(&self, module_name: &str, module_path: &str) {
        match self.library.resolve(module_path) {
            Some(behavior) => {
                self.modules
                    .lock()
                    .await
                    .insert(module_name.to_string(), behavior);
                info!(
                    worker_name = %self.worker_name,
                    module_name,
                    module_path,
                    "module cached"
                );
            }
            None => warn!(
                worker_name = %self.worker_name,
                module_name,
                module_path,
                "module path not linked into this worker"
            ),
        }
    }

    async fn handle_spawn_directive(self: &Arc<Self>, body: &str) {
        let envelope = match Envelope::from_wire(body) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "skipping undecodable spawn directive");
                return;
            }
        };
        let (module_name, initial_state, process_name, parent_process_name) = match envelope {
            Envelope::WorkerSpawnProcess {
                module_name,
                initial_state,
                process_name,
                parent_process_name,
            } => (module_name, initial_state, process_name, parent_process_name),
            other => {
                warn!(envelope = ?other, "unexpected envelope on spawn queue");
                return;
            }
        };

        let behavior = self.modules.lock().await.get(&module_name).cloned();
        let Some(behavior) = behavior else {
            // The would-be parent must not wait on a dangling expectation:
            // the failed spawn surfaces exactly like a crashed child.
            let err = ActorFailure::from(ClusterError::ModuleNotFound(module_name.clone()));
            warn!(
                worker_name = %self.worker_name,
                %module_name,
                %process_name,
                "spawn failed, notifying parent"
            );
            self.notify_spawn_failure(&process_name, &parent_process_name, &err)
                .await;
            return;
        };

        let process = Process::new(
            ProcessIdentity {
                process_name: process_name.clone(),
                parent_process_name,
                module_name,
            },
            initial_state,
            behavior,
            Arc::clone(&self.broker),
            Arc::clone(&self.registry),
        );
        info!(
            worker_name = %self.worker_name,
            %process_name,
            "spawning process"
        );
        tokio::spawn(async move { process.run().await });
    }

    async fn notify_spawn_failure(
        &self,
        process_name: &str,
        parent_process_name: &str,
        err: &ActorFailure,
    ) {
        let envelope = Envelope::ProcessDirectMessage {
            // The failure speaks as the process that never started, so the
            // parent can correlate it with the name `spawn` returned.
            source_process_name: process_name.to_string(),
            message: child_exit_message(err),
        };
        match envelope.to_wire() {
            Ok(body) => {
                let _ = self
                    .broker
                    .send_to_queue(&process_queue(parent_process_name), body)
                    .await;
            }
            Err(encode_err) => {
                warn!(error = %encode_err, "spawn failure notification encoding failed")
            }
        }
    }
}

/// Convenience used by tests and sample wiring where no worker identity
/// matters.
pub fn spawn_worker(
    node_name: &str,
    worker_name: &str,
    broker: Arc<dyn Broker>,
    registry: Arc<dyn Registry>,
    library: Arc<ModuleLibrary>,
) -> Arc<WorkerServer> {
    let worker = Arc::new(WorkerServer::new(
        node_name,
        worker_name,
        broker,
        registry,
        library,
    ));
    let runner = Arc::clone(&worker);
    tokio::spawn(async move {
        if let Err(err) = runner.run().await {
            warn!(error = %err, "worker stopped");
        }
    });
    worker
}
