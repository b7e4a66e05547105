//! # Queue & Collection Naming
//!
//! Every queue name in the system is derived deterministically so that any
//! component on any host can address any other without coordination. The
//! registry collection names live here too, next to the queue names they
//! mirror.

/// Queue carrying client requests (load-module, spawn) to the coordinator.
pub const CLUSTER_QUEUE: &str = "cluster";

/// Fanout on which the coordinator broadcasts load-module notifications to
/// every worker host.
pub const MODULES_QUEUE: &str = "modules";

/// Competing-consumer queue carrying spawn directives to the worker pool.
/// The broker, not the coordinator, picks which worker serves a directive.
pub const SPAWN_PROCESS_QUEUE: &str = "spawn-process";

/// Registry collection holding one record per live process.
pub const PROCESSES_COLLECTION: &str = "processes";

/// Registry collection mapping module names to module paths.
pub const MODULES_COLLECTION: &str = "modules";

/// The implicit root of the supervision tree. It is never a live actor;
/// records spawned from outside the cluster name it as their parent.
pub const ROOT_PROCESS_NAME: &str = "root";

/// The private inbound queue of one process.
pub fn process_queue(process_name: &str) -> String {
    format!("process:{process_name}")
}
