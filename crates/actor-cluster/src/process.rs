//! # Actor Lifecycle
//!
//! A [`Process`] binds one behavior instance to the messaging substrate and
//! the supervision protocol. Its life is a one-way state machine:
//!
//! - **created** - identity, initial state and injected capabilities, not
//!   yet visible to the system;
//! - **starting** - `will_run` executes as the first task; on success the
//!   scheduler is created, the process record is persisted and the private
//!   queue is consumed; on failure the process exits without ever becoming
//!   active;
//! - **active** - each inbound direct message becomes exactly one scheduled
//!   task; parent-exit and probe-state envelopes bypass the scheduler;
//! - **exiting** - `will_exit` best-effort, optional parent notification,
//!   parent-exit cascade to every child, queue and record cleanup, scheduler
//!   termination;
//! - **terminated** - messages for this name are undeliverable no-ops.
//!
//! Failures escalate only through the explicit notification protocol, never
//! as shared errors across actors: a dying child surfaces to its parent as a
//! `CHILD_PROCESS_EXIT` direct message, a dying parent reaches its children
//! as a parent-exit envelope that preempts their pending work.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::behavior::ProcessBehavior;
use crate::broker::Broker;
use crate::envelope::{child_exit_message, Envelope, ProbeReply};
use crate::error::ActorFailure;
use crate::queues::{process_queue, CLUSTER_QUEUE, PROCESSES_COLLECTION};
use crate::registry::{ProcessRecord, Registry};
use crate::scheduler::{task, TaskScheduler};

/// Who a process is: globally unique name, parent, and the module it runs.
#[derive(Debug, Clone)]
pub struct ProcessIdentity {
    pub process_name: String,
    pub parent_process_name: String,
    pub module_name: String,
}

/// Options for [`ProcessContext::exit`]. Parent notification defaults on;
/// it is suppressed when the exit was *caused* by the parent's own death.
#[derive(Debug, Clone, Copy)]
pub struct ExitOptions {
    pub notify_parent: bool,
}

impl Default for ExitOptions {
    fn default() -> Self {
        Self {
            notify_parent: true,
        }
    }
}

struct ProcessInner {
    identity: ProcessIdentity,
    behavior: Arc<dyn ProcessBehavior>,
    initial_state: Value,
    broker: Arc<dyn Broker>,
    registry: Arc<dyn Registry>,
    process_queue: String,
    scheduler: OnceLock<TaskScheduler>,
    children: Mutex<BTreeSet<String>>,
    exited: AtomicBool,
}

/// One live actor, owned by exactly one worker host.
pub struct Process {
    inner: Arc<ProcessInner>,
}

/// The capability set handed to behavior hooks: state and identity access,
/// fire-and-forget sends, child spawning, and exit.
///
/// Cloneable so a hook can move it into a spawned future if it needs to.
#[derive(Clone)]
pub struct ProcessContext {
    inner: Arc<ProcessInner>,
}

impl Process {
    pub fn new(
        identity: ProcessIdentity,
        initial_state: Value,
        behavior: Arc<dyn ProcessBehavior>,
        broker: Arc<dyn Broker>,
        registry: Arc<dyn Registry>,
    ) -> Self {
        let process_queue = process_queue(&identity.process_name);
        Self {
            inner: Arc::new(ProcessInner {
                identity,
                behavior,
                initial_state,
                broker,
                registry,
                process_queue,
                scheduler: OnceLock::new(),
                children: Mutex::new(BTreeSet::new()),
                exited: AtomicBool::new(false),
            }),
        }
    }

    /// A context for this process, usable from outside the hooks (tests,
    /// embedding code).
    pub fn context(&self) -> ProcessContext {
        ProcessContext {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Drives the starting transition. On return the process is either
    /// active (record persisted, private queue consuming in the background)
    /// or already fully exited.
    pub async fn run(&self) {
        let inner = &self.inner;
        let ctx = self.context();

        let state = match inner
            .behavior
            .will_run(inner.initial_state.clone(), &ctx)
            .await
        {
            Ok(state) => state,
            Err(err) => {
                warn!(
                    process_name = %inner.identity.process_name,
                    error = %err,
                    "will_run failed, exiting before activation"
                );
                inner.exit(err, true).await;
                return;
            }
        };

        let (scheduler, failure_rx) = TaskScheduler::new(state);
        let _ = inner.scheduler.set(scheduler);

        // Any task failure escalates into the exit protocol, exactly once.
        let watcher = Arc::clone(inner);
        tokio::spawn(async move {
            if let Ok(err) = failure_rx.await {
                watcher.exit(err, true).await;
            }
        });

        let record = ProcessRecord {
            process_name: inner.identity.process_name.clone(),
            parent_process_name: inner.identity.parent_process_name.clone(),
            module_name: inner.identity.module_name.clone(),
        };
        let persisted = match record.to_wire() {
            Ok(body) => {
                inner
                    .registry
                    .put(PROCESSES_COLLECTION, &inner.identity.process_name, body)
                    .await
            }
            Err(err) => Err(err),
        };
        if let Err(err) = persisted {
            inner.exit(ActorFailure::from(err), true).await;
            return;
        }

        let consumer = match inner.broker.consume(&inner.process_queue).await {
            Ok(consumer) => consumer,
            Err(err) => {
                inner.exit(ActorFailure::from(err), true).await;
                return;
            }
        };

        info!(
            process_name = %inner.identity.process_name,
            parent_process_name = %inner.identity.parent_process_name,
            module_name = %inner.identity.module_name,
            "process active"
        );

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            while let Some(body) = consumer.recv().await {
                if inner.dispatch(&body).await {
                    break;
                }
            }
        });
    }
}

impl ProcessInner {
    /// Handles one inbound envelope. Returns `true` once the process is
    /// exiting and consumption must stop.
    async fn dispatch(self: &Arc<Self>, body: &str) -> bool {
        let envelope = match Envelope::from_wire(body) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(
                    process_name = %self.identity.process_name,
                    error = %err,
                    "skipping undecodable message"
                );
                return false;
            }
        };
        match envelope {
            Envelope::ProcessDirectMessage {
                source_process_name,
                message,
            } => {
                let behavior = Arc::clone(&self.behavior);
                let ctx = ProcessContext {
                    inner: Arc::clone(self),
                };
                if let Some(scheduler) = self.scheduler.get() {
                    scheduler.enqueue(task(move |state| async move {
                        behavior
                            .did_receive_message(state, message, &source_process_name, &ctx)
                            .await
                    }));
                }
                false
            }
            // The parent is dead; serving its prior protocol is meaningless,
            // so this does not wait behind pending tasks.
            Envelope::ProcessParentExit { err } => {
                self.exit(err, false).await;
                true
            }
            // Introspection only: replies synchronously, touches no state,
            // schedules nothing.
            Envelope::ProcessProbeState { reply_queue_name } => {
                let reply = ProbeReply {
                    process_name: self.identity.process_name.clone(),
                    parent_process_name: self.identity.parent_process_name.clone(),
                    children_process_names: self.children_process_names(),
                };
                match reply.to_wire() {
                    Ok(body) => {
                        let _ = self.broker.send_to_queue(&reply_queue_name, body).await;
                    }
                    Err(err) => warn!(error = %err, "probe reply encoding failed"),
                }
                false
            }
            other => {
                warn!(
                    process_name = %self.identity.process_name,
                    envelope = ?other,
                    "unexpected envelope on process queue"
                );
                false
            }
        }
    }

    fn state(&self) -> Value {
        match self.scheduler.get() {
            Some(scheduler) => scheduler.state(),
            None => self.initial_state.clone(),
        }
    }

    fn children_process_names(&self) -> Vec<String> {
        self.children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    async fn send_message(&self, target_process_name: &str, message: Value) {
        let envelope = Envelope::ProcessDirectMessage {
            source_process_name: self.identity.process_name.clone(),
            message,
        };
        match envelope.to_wire() {
            Ok(body) => {
                let _ = self
                    .broker
                    .send_to_queue(&process_queue(target_process_name), body)
                    .await;
                debug!(
                    source_process_name = %self.identity.process_name,
                    target_process_name,
                    "send"
                );
            }
            Err(err) => warn!(error = %err, "message encoding failed"),
        }
    }

    async fn spawn_child(&self, module_name: &str, initial_state: Value) -> String {
        let process_name = format!("{module_name}:{}", Uuid::new_v4());
        // Membership is recorded synchronously; the child is part of the
        // cascade set even if it never starts.
        self.children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(process_name.clone());
        let envelope = Envelope::ClusterSpawnProcess {
            module_name: module_name.to_string(),
            initial_state,
            process_name: process_name.clone(),
            parent_process_name: self.identity.process_name.clone(),
        };
        match envelope.to_wire() {
            Ok(body) => {
                let _ = self.broker.send_to_queue(CLUSTER_QUEUE, body).await;
                debug!(
                    parent_process_name = %self.identity.process_name,
                    process_name = %process_name,
                    module_name,
                    "spawn"
                );
            }
            Err(err) => warn!(error = %err, "spawn request encoding failed"),
        }
        process_name
    }

    /// The exiting transition. Idempotent: the first caller wins, every
    /// later call returns immediately.
    async fn exit(self: &Arc<Self>, err: ActorFailure, notify_parent: bool) {
        if self.exited.swap(true, Ordering::SeqCst) {
            return;
        }
        let ctx = ProcessContext {
            inner: Arc::clone(self),
        };
        if let Err(hook_err) = self.behavior.will_exit(self.state(), &err, &ctx).await {
            warn!(
                process_name = %self.identity.process_name,
                error = %hook_err,
                "will_exit failed"
            );
        }
        if notify_parent {
            self.send_message(
                &self.identity.parent_process_name,
                child_exit_message(&err),
            )
            .await;
        }
        let children = self.children_process_names();
        for child in children {
            if let Ok(body) = (Envelope::ProcessParentExit { err: err.clone() }).to_wire() {
                let _ = self.broker.send_to_queue(&process_queue(&child), body).await;
            }
        }
        let _ = self.broker.delete_queue(&self.process_queue).await;
        if let Err(reg_err) = self
            .registry
            .delete(PROCESSES_COLLECTION, &self.identity.process_name)
            .await
        {
            warn!(
                process_name = %self.identity.process_name,
                error = %reg_err,
                "process record cleanup failed"
            );
        }
        // Last, with no await after it: a handler may itself be the caller
        // of `exit`, and terminating the scheduler makes the next suspension
        // point of the running task its point of no return.
        if let Some(scheduler) = self.scheduler.get() {
            scheduler.terminate();
        }
        info!(
            process_name = %self.identity.process_name,
            error = %err,
            "process exited"
        );
    }
}

impl ProcessContext {
    /// The most recently committed state, or the initial state before the
    /// first task completes.
    pub fn state(&self) -> Value {
        self.inner.state()
    }

    pub fn process_name(&self) -> &str {
        &self.inner.identity.process_name
    }

    pub fn parent_process_name(&self) -> &str {
        &self.inner.identity.parent_process_name
    }

    pub fn module_name(&self) -> &str {
        &self.inner.identity.module_name
    }

    pub fn children_process_names(&self) -> Vec<String> {
        self.inner.children_process_names()
    }

    /// Fire-and-forget delivery to another process's private queue.
    pub async fn send(&self, target_process_name: &str, message: Value) {
        self.inner.send_message(target_process_name, message).await;
    }

    /// Requests a child spawn through the coordinator and returns the
    /// generated `module:uuid` name. The name is in this process's children
    /// set before the call returns.
    pub async fn spawn(&self, module_name: &str, initial_state: Value) -> String {
        self.inner.spawn_child(module_name, initial_state).await
    }

    /// Triggers the exiting transition.
    pub async fn exit(&self, err: ActorFailure, options: ExitOptions) {
        self.inner.exit(err, options.notify_parent).await;
    }
}
