use std::{collections::HashMap, sync::Arc};

use tokio::sync::mpsc::{self, error::TrySendError, Sender};
use tracing::{debug, info, warn};

use crate::{
    broadcast::{
        message::{Body, Message, NodeId},
        processor::GossipProcessor,
        state::{GossipState, SharedState},
    },
    common::{
        config::Config,
        error::{Error, Result},
    },
};

use super::transport::RpcGateway;

/// Handle to a running node. Cheap to clone; the gossip processor stops once
/// the last handle is dropped.
#[derive(Clone)]
pub struct Node {
    id: NodeId,
    state: SharedState,
    wake_tx: Sender<()>,
}

impl Node {
    /// Starts the node's gossip processor on the current runtime.
    pub fn spawn(id: impl Into<NodeId>, gateway: Arc<dyn RpcGateway>, config: &Config) -> Self {
        let id = id.into();
        let state = GossipState::shared();
        // Capacity one: a pending wake absorbs any further ones.
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let processor = GossipProcessor::new(id.clone(), state.clone(), gateway, wake_rx, config);
        tokio::spawn(processor.run());

        Node { id, state, wake_tx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Client submit.
    pub fn submit(&self, message: Message) {
        let learned = self.state.lock().insert(message);
        if learned {
            debug!(node = %self.id, message, "learned message from client");
            self.wake();
        }
    }

    /// Client query, sorted ascending.
    pub fn query(&self) -> Vec<Message> {
        let mut messages = self.state.lock().store.snapshot();
        messages.sort_unstable();
        messages
    }

    /// Takes this node's entry from a cluster-wide adjacency map.
    pub fn set_topology(&self, topology: &HashMap<NodeId, Vec<NodeId>>) {
        let neighbors: Vec<NodeId> = match topology.get(&self.id) {
            Some(neighbors) => neighbors.iter().filter(|n| **n != self.id).cloned().collect(),
            None => {
                warn!(node = %self.id, "topology has no entry for this node");
                Vec::new()
            }
        };
        info!(node = %self.id, ?neighbors, "neighbors set");
        self.state.lock().set_neighbors(neighbors);
        // New neighbors may be owed a backlog.
        self.wake();
    }

    /// Applies a batch from a peer and reports whether anything was new.
    pub fn receive_gossip(&self, from: &str, messages: &[Message]) -> bool {
        let learned = self.state.lock().receive_gossip(from, messages);
        if learned {
            self.wake();
        }
        learned
    }

    /// Serves a request body, producing the reply body.
    pub fn handle(&self, src: &str, body: Body) -> Result<Body> {
        match body {
            Body::Broadcast { message } => {
                self.submit(message);
                Ok(Body::BroadcastOk)
            }
            Body::Read => Ok(Body::ReadOk { messages: self.query() }),
            Body::Topology { topology } => {
                self.set_topology(&topology);
                Ok(Body::TopologyOk)
            }
            Body::Gossip { messages } => {
                self.receive_gossip(src, &messages);
                Ok(Body::GossipOk)
            }
            other => Err(Error::Unsupported(other.kind().to_string())),
        }
    }

    fn wake(&self) {
        match self.wake_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => debug!(node = %self.id, "gossip processor gone"),
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &SharedState {
        &self.state
    }
}
