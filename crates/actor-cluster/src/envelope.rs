//! # Message Envelopes
//!
//! The typed wire protocol. Every message crossing the broker is an
//! [`Envelope`] serialized as UTF-8 JSON text of the shape
//! `{"type": "...", "payload": {...}}`, except the probe reply which is sent
//! bare to an ad-hoc reply queue.
//!
//! Envelopes are immutable once sent: nothing in the runtime mutates a
//! decoded envelope, it is only matched and consumed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ActorFailure, ClusterError};

/// Tag of the direct-message body a dying child sends to its parent.
///
/// This is not an [`Envelope`] variant: supervision failures surface to the
/// *parent's own handler* as an ordinary direct message, so the parent
/// decides how to react.
pub const CHILD_PROCESS_EXIT: &str = "CHILD_PROCESS_EXIT";

/// Every message exchanged over the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Envelope {
    /// Client → coordinator: register a module.
    ClusterLoadModule {
        module_name: String,
        module_path: String,
    },
    /// Client or actor → coordinator: request a spawn.
    ClusterSpawnProcess {
        module_name: String,
        initial_state: Value,
        process_name: String,
        parent_process_name: String,
    },
    /// Coordinator → every worker: cache this module.
    WorkerLoadModule { module_name: String },
    /// Coordinator → one worker: materialize this actor.
    WorkerSpawnProcess {
        module_name: String,
        initial_state: Value,
        process_name: String,
        parent_process_name: String,
    },
    /// Actor → actor: a payload for `did_receive_message`.
    ProcessDirectMessage {
        source_process_name: String,
        message: Value,
    },
    /// Dying parent → child: terminate, ahead of any pending tasks.
    ProcessParentExit { err: ActorFailure },
    /// External prober → actor: reply with identity and children.
    ProcessProbeState { reply_queue_name: String },
}

impl Envelope {
    pub fn to_wire(&self) -> Result<String, ClusterError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_wire(text: &str) -> Result<Self, ClusterError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Reply to a probe-state request. Sent bare (no envelope) to the
/// caller-specified reply queue; carries no actor state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReply {
    pub process_name: String,
    pub parent_process_name: String,
    pub children_process_names: Vec<String>,
}

impl ProbeReply {
    pub fn to_wire(&self) -> Result<String, ClusterError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_wire(text: &str) -> Result<Self, ClusterError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// The direct-message body announcing a child's death to its parent.
pub fn child_exit_message(err: &ActorFailure) -> Value {
    serde_json::json!({
        "type": CHILD_PROCESS_EXIT,
        "payload": { "err": err },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_matches_protocol() {
        let env = Envelope::ClusterLoadModule {
            module_name: "Echo".into(),
            module_path: "sample/echo".into(),
        };
        let wire = env.to_wire().unwrap();
        let json: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(json["type"], "CLUSTER_LOAD_MODULE");
        assert_eq!(json["payload"]["moduleName"], "Echo");
        assert_eq!(json["payload"]["modulePath"], "sample/echo");
    }

    #[test]
    fn direct_message_fields_are_camel_case() {
        let env = Envelope::ProcessDirectMessage {
            source_process_name: "kv:1".into(),
            message: serde_json::json!({"type": "get", "key": "k"}),
        };
        let json: Value = serde_json::from_str(&env.to_wire().unwrap()).unwrap();
        assert_eq!(json["type"], "PROCESS_DIRECT_MESSAGE");
        assert_eq!(json["payload"]["sourceProcessName"], "kv:1");
    }

    #[test]
    fn garbled_wire_text_is_an_error_not_a_panic() {
        assert!(Envelope::from_wire("not json").is_err());
        assert!(Envelope::from_wire(r#"{"type":"NO_SUCH_TYPE","payload":{}}"#).is_err());
    }

    #[test]
    fn child_exit_message_carries_the_cause() {
        let body = child_exit_message(&ActorFailure::new("boom"));
        assert_eq!(body["type"], CHILD_PROCESS_EXIT);
        assert_eq!(body["payload"]["err"]["cause"], "boom");
    }
}
