//! # Key-Value Behavior
//!
//! One actor, one store: the actor's state object is the store itself.
//! Because handler executions are strictly serialized, `set` and `get`
//! interleave safely without any locking here.
//!
//! Messages:
//!
//! - `{"type": "set", "key": K, "value": V}` - writes, no reply.
//! - `{"type": "get", "key": K}` - replies to the sender with
//!   `{"type": "entry", "key": K, "value": V|null}`.

use actor_cluster::{ActorFailure, ProcessBehavior, ProcessContext};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct KeyValueBehavior;

#[async_trait]
impl ProcessBehavior for KeyValueBehavior {
    async fn will_run(&self, state: Value, _ctx: &ProcessContext) -> Result<Value, ActorFailure> {
        // Tolerate a null initial state; the store must be an object.
        if state.is_object() {
            Ok(state)
        } else {
            Ok(json!({}))
        }
    }

    async fn did_receive_message(
        &self,
        mut state: Value,
        message: Value,
        source_process_name: &str,
        ctx: &ProcessContext,
    ) -> Result<Value, ActorFailure> {
        let Some(key) = message["key"].as_str() else {
            return Ok(state);
        };
        match message["type"].as_str() {
            Some("set") => {
                state[key] = message["value"].clone();
            }
            Some("get") => {
                let reply = json!({
                    "type": "entry",
                    "key": key,
                    "value": state[key].clone(),
                });
                ctx.send(source_process_name, reply).await;
            }
            _ => {}
        }
        Ok(state)
    }
}
