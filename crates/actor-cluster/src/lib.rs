//! # Actor Cluster
//!
//! A distributed actor runtime: lightweight named processes run across a
//! pool of worker hosts, communicate exclusively via asynchronous messages
//! routed through a broker, and are organized in a supervision tree. A
//! shared registry persists the process tree and a module catalog so any
//! worker can instantiate any actor type.
//!
//! ## Architecture Overview
//!
//! - [`scheduler::TaskScheduler`] - serializes one actor's handler
//!   executions into strict FIFO order, one at a time, with a one-way
//!   terminal transition.
//! - [`process::Process`] - binds one [`behavior::ProcessBehavior`] to the
//!   messaging substrate and the supervision protocol, driving the
//!   run → active → exiting → terminated state machine.
//! - [`cluster::ClusterServer`] / [`cluster::ClusterClient`] - the
//!   cluster-wide coordinator for module registration and spawning, and its
//!   client-facing interface.
//! - [`worker::WorkerServer`] - hosts many processes and materializes new
//!   ones on demand; [`node::NodeServer`] boots a pool of them.
//! - [`broker::Broker`] / [`registry::Registry`] - the injected boundaries
//!   to the message-queue substrate and the shared key-value store, with
//!   in-process implementations ([`broker::MemoryBroker`],
//!   [`registry::MemoryRegistry`]).
//!
//! ## Concurrency Model
//!
//! Within one actor execution is strictly sequential: the task scheduler is
//! the sole serialization point and the only suspension point. Across actors
//! there is no shared mutable state at all; the only coupling is message
//! passing through the broker and the two shared registry collections.
//!
//! Delivery is at-most-once, best-effort: messages addressed to a terminated
//! process are dropped by the broker, and per sender→receiver pairs arrive
//! in send order.
//!
//! ## Supervision
//!
//! Parents spawn children through the coordinator; a child's death surfaces
//! to its parent as a `CHILD_PROCESS_EXIT` direct message, and a parent's
//! death cascades to every child via a parent-exit notification that
//! preempts the child's pending work.

pub mod behavior;
pub mod broker;
pub mod cluster;
pub mod envelope;
pub mod error;
pub mod node;
pub mod process;
pub mod queues;
pub mod registry;
pub mod scheduler;
pub mod telemetry;
pub mod worker;

pub use behavior::{ModuleLibrary, ProcessBehavior};
pub use broker::{Broker, FanoutConsumer, MemoryBroker, QueueConsumer};
pub use cluster::{ClusterClient, ClusterServer, ProcessTree};
pub use envelope::{child_exit_message, Envelope, ProbeReply, CHILD_PROCESS_EXIT};
pub use error::{ActorFailure, ClusterError};
pub use node::{NodeConfig, NodeServer};
pub use process::{ExitOptions, Process, ProcessContext, ProcessIdentity};
pub use registry::{MemoryRegistry, ProcessRecord, Registry};
pub use scheduler::{task, Task, TaskScheduler};
pub use worker::{spawn_worker, WorkerServer};
