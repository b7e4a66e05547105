//! # Cluster Sample App Library
//!
//! Example actor behaviors for the cluster runtime, exposed for integration
//! testing:
//!
//! - [`echo::EchoBehavior`] - sends every message straight back.
//! - [`key_value::KeyValueBehavior`] - a tiny per-actor key-value store.
//! - [`fanout::FanoutBehavior`] - a supervising dispatcher that spawns one
//!   short-lived worker child per request.
//!
//! [`install`] links all of them into a [`ModuleLibrary`] under the paths in
//! [`paths`], ready to be registered with `load_module`.

pub mod echo;
pub mod fanout;
pub mod key_value;

use std::sync::Arc;

use actor_cluster::ModuleLibrary;

/// Module paths the sample behaviors are linked under.
pub mod paths {
    pub const ECHO: &str = "sample/echo";
    pub const KEY_VALUE: &str = "sample/key-value";
    pub const FANOUT: &str = "sample/fanout";
    pub const FANOUT_WORKER: &str = "sample/fanout-worker";
}

/// Links every sample behavior into `library`.
pub fn install(library: &ModuleLibrary) {
    library.register(paths::ECHO, Arc::new(echo::EchoBehavior));
    library.register(paths::KEY_VALUE, Arc::new(key_value::KeyValueBehavior));
    library.register(paths::FANOUT, Arc::new(fanout::FanoutBehavior));
    library.register(paths::FANOUT_WORKER, Arc::new(fanout::FanoutWorkerBehavior));
}
