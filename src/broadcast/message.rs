use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An opaque broadcast value. Only ever compared for set membership.
pub type Message = i64;

/// Externally assigned node identifier.
pub type NodeId = String;

/// Request and reply payloads, for clients and for node-to-node gossip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Body {
    Init {
        node_id: NodeId,
        node_ids: Vec<NodeId>,
    },
    InitOk,
    Broadcast {
        message: Message,
    },
    BroadcastOk,
    Read,
    ReadOk {
        messages: Vec<Message>,
    },
    Topology {
        topology: HashMap<NodeId, Vec<NodeId>>,
    },
    TopologyOk,
    Gossip {
        messages: Vec<Message>,
    },
    GossipOk,
    Error {
        code: u32,
        text: String,
    },
}

impl Body {
    /// Every `type` tag this node understands.
    pub const KINDS: &'static [&'static str] = &[
        "init",
        "init_ok",
        "broadcast",
        "broadcast_ok",
        "read",
        "read_ok",
        "topology",
        "topology_ok",
        "gossip",
        "gossip_ok",
        "error",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Body::Init { .. } => "init",
            Body::InitOk => "init_ok",
            Body::Broadcast { .. } => "broadcast",
            Body::BroadcastOk => "broadcast_ok",
            Body::Read => "read",
            Body::ReadOk { .. } => "read_ok",
            Body::Topology { .. } => "topology",
            Body::TopologyOk => "topology_ok",
            Body::Gossip { .. } => "gossip",
            Body::GossipOk => "gossip_ok",
            Body::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_wire_shape() {
        let body: Body = serde_json::from_str(r#"{"type":"broadcast","message":7}"#).unwrap();
        assert_eq!(body, Body::Broadcast { message: 7 });

        let read: Body = serde_json::from_str(r#"{"type":"read"}"#).unwrap();
        assert_eq!(read, Body::Read);

        let json = serde_json::to_value(Body::ReadOk { messages: vec![1, 2] }).unwrap();
        assert_eq!(json["type"], "read_ok");
        assert_eq!(json["messages"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_kinds_cover_every_variant() {
        let samples = [
            Body::InitOk,
            Body::Read,
            Body::GossipOk,
            Body::Gossip { messages: vec![] },
            Body::Error { code: 10, text: String::new() },
        ];
        for body in samples {
            let json = serde_json::to_value(&body).unwrap();
            assert_eq!(json["type"], body.kind());
            assert!(Body::KINDS.contains(&body.kind()));
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(serde_json::from_str::<Body>(r#"{"type":"txn","txn":[]}"#).is_err());
    }
}
