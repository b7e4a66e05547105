//! # Echo Behavior
//!
//! The smallest possible actor: every inbound message is sent straight back
//! to whoever sent it, state never changes. Useful for liveness checks and
//! as the hello-world of the message round-trip.

use actor_cluster::{ActorFailure, ProcessBehavior, ProcessContext};
use async_trait::async_trait;
use serde_json::Value;

pub struct EchoBehavior;

#[async_trait]
impl ProcessBehavior for EchoBehavior {
    async fn did_receive_message(
        &self,
        state: Value,
        message: Value,
        source_process_name: &str,
        ctx: &ProcessContext,
    ) -> Result<Value, ActorFailure> {
        ctx.send(source_process_name, message).await;
        Ok(state)
    }
}
