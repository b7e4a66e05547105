//! # Fanout Behavior
//!
//! A supervising dispatcher: each inbound request is handed to a freshly
//! spawned worker child, and the worker's answer is relayed back to the
//! original requester. The dispatcher keeps a `pending` map from child name
//! to requester name so it can route replies and clean up after children
//! that die before answering.
//!
//! Dispatcher messages:
//!
//! - `{"type": "request", "name": N}` - spawns a worker for this request.
//! - `{"type": "workerResponse", "response": R}` (from a child) - forwards
//!   `{"type": "response", "response": R}` to the requester and dismisses
//!   the child.
//! - `CHILD_PROCESS_EXIT` for a still-pending child - forwards
//!   `{"type": "response", "error": ...}` to the requester instead.
//!
//! The worker module to spawn is read from the dispatcher's initial state
//! (`workerModuleName`), so the same behavior works under any registered
//! module name.

use actor_cluster::{
    ActorFailure, ExitOptions, ProcessBehavior, ProcessContext, CHILD_PROCESS_EXIT,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

pub struct FanoutBehavior;

#[async_trait]
impl ProcessBehavior for FanoutBehavior {
    async fn will_run(&self, mut state: Value, _ctx: &ProcessContext) -> Result<Value, ActorFailure> {
        if !state.is_object() {
            state = json!({});
        }
        if state["workerModuleName"].as_str().is_none() {
            return Err(ActorFailure::new(
                "fanout dispatcher needs workerModuleName in its initial state",
            ));
        }
        state["pending"] = json!({});
        Ok(state)
    }

    async fn did_receive_message(
        &self,
        mut state: Value,
        message: Value,
        source_process_name: &str,
        ctx: &ProcessContext,
    ) -> Result<Value, ActorFailure> {
        match message["type"].as_str() {
            Some("request") => {
                let worker_module = state["workerModuleName"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                let child = ctx
                    .spawn(&worker_module, json!({"request": message.clone()}))
                    .await;
                state["pending"][&child] = json!(source_process_name);
                debug!(child = %child, requester = source_process_name, "request dispatched");
            }
            Some("workerResponse") => {
                let Some(requester) = state["pending"][source_process_name].as_str() else {
                    return Ok(state);
                };
                let reply = json!({
                    "type": "response",
                    "response": message["response"].clone(),
                });
                let requester = requester.to_string();
                ctx.send(&requester, reply).await;
                if let Some(pending) = state["pending"].as_object_mut() {
                    pending.remove(source_process_name);
                }
                ctx.send(source_process_name, json!({"type": "finish"})).await;
            }
            Some(CHILD_PROCESS_EXIT) => {
                // Only a child that died *before* answering owes its
                // requester anything; dismissed workers were already
                // removed from the pending map.
                if let Some(requester) = state["pending"][source_process_name]
                    .as_str()
                    .map(str::to_string)
                {
                    let reply = json!({
                        "type": "response",
                        "error": message["payload"]["err"].clone(),
                    });
                    ctx.send(&requester, reply).await;
                    if let Some(pending) = state["pending"].as_object_mut() {
                        pending.remove(source_process_name);
                    }
                }
            }
            _ => {}
        }
        Ok(state)
    }
}

/// The short-lived half of the fanout pair: answers its parent once, then
/// exits when dismissed.
pub struct FanoutWorkerBehavior;

#[async_trait]
impl ProcessBehavior for FanoutWorkerBehavior {
    async fn will_run(&self, state: Value, ctx: &ProcessContext) -> Result<Value, ActorFailure> {
        let name = state["request"]["name"].as_str().unwrap_or("stranger");
        let reply = json!({
            "type": "workerResponse",
            "response": format!("hello {name}"),
        });
        ctx.send(ctx.parent_process_name(), reply).await;
        Ok(state)
    }

    async fn did_receive_message(
        &self,
        state: Value,
        message: Value,
        _source_process_name: &str,
        ctx: &ProcessContext,
    ) -> Result<Value, ActorFailure> {
        if message["type"] == json!("finish") {
            ctx.exit(ActorFailure::new("response sent"), ExitOptions::default())
                .await;
        }
        Ok(state)
    }
}
