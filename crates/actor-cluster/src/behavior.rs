//! # Process Behaviors
//!
//! A [`ProcessBehavior`] is the user-supplied half of an actor: three
//! optional hooks over `(state, ctx)`. The runtime guarantees that at most
//! one hook body executes per actor at any time, and that suspension inside
//! one hook never blocks another actor.
//!
//! Module code is never loaded from disk at runtime. The [`ModuleLibrary`]
//! is the statically-linked replacement: an injected catalog mapping the
//! opaque module *path* persisted in the module registry to a behavior
//! implementation compiled into the worker binary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ActorFailure;
use crate::process::ProcessContext;

/// The three lifecycle hooks of an actor. All are optional; the defaults
/// leave the state untouched.
#[async_trait]
pub trait ProcessBehavior: Send + Sync {
    /// First task of the actor's life; its result becomes the working state.
    /// Failure here means the actor never becomes active.
    async fn will_run(&self, state: Value, ctx: &ProcessContext) -> Result<Value, ActorFailure> {
        let _ = ctx;
        Ok(state)
    }

    /// One inbound direct message. Runs under the actor's scheduler, so
    /// invocations never overlap and arrive in queue order.
    async fn did_receive_message(
        &self,
        state: Value,
        message: Value,
        source_process_name: &str,
        ctx: &ProcessContext,
    ) -> Result<Value, ActorFailure> {
        let _ = (message, source_process_name, ctx);
        Ok(state)
    }

    /// Best-effort shutdown hook. Its own failure is logged and never blocks
    /// the rest of the exit protocol.
    async fn will_exit(
        &self,
        state: Value,
        err: &ActorFailure,
        ctx: &ProcessContext,
    ) -> Result<(), ActorFailure> {
        let _ = (state, err, ctx);
        Ok(())
    }
}

/// Statically-linked module catalog, keyed by module path.
///
/// Workers resolve the path stored in a `ModuleRecord` through this library
/// instead of loading code from the filesystem; the path is just a lookup
/// key.
#[derive(Default)]
pub struct ModuleLibrary {
    entries: Mutex<HashMap<String, Arc<dyn ProcessBehavior>>>,
}

impl ModuleLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the behavior linked at `module_path`.
    pub fn register(&self, module_path: impl Into<String>, behavior: Arc<dyn ProcessBehavior>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(module_path.into(), behavior);
        }
    }

    pub fn resolve(&self, module_path: &str) -> Option<Arc<dyn ProcessBehavior>> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(module_path).cloned())
    }
}
