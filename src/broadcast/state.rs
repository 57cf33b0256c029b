use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{
    message::{Message, NodeId},
    peers::{PeerKnowledge, TopologyStore},
    store::MessageStore,
};

/// The node's one synchronization domain.
pub type SharedState = Arc<Mutex<GossipState>>;

/// A neighbor and the messages we believe it lacks. Built fresh per round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GossipRound {
    pub neighbor: NodeId,
    pub messages: HashSet<Message>,
}

#[derive(Debug, Default)]
pub struct GossipState {
    pub store: MessageStore,
    pub knowledge: PeerKnowledge,
    pub topology: TopologyStore,
}

impl GossipState {
    pub fn new() -> Self {
        GossipState {
            store: MessageStore::new(),
            knowledge: PeerKnowledge::new(),
            topology: TopologyStore::new(),
        }
    }

    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(GossipState::new()))
    }

    pub fn insert(&mut self, message: Message) -> bool {
        self.store.insert(message)
    }

    pub fn set_neighbors(&mut self, neighbors: Vec<NodeId>) {
        self.topology.set_neighbors(neighbors);
        self.knowledge.sync_neighbors(self.topology.neighbors());
    }

    /// One round per neighbor with a non-empty diff.
    pub fn rounds(&self) -> Vec<GossipRound> {
        if self.store.is_empty() {
            return Vec::new();
        }
        self.topology
            .neighbors()
            .iter()
            .filter_map(|neighbor| {
                let messages = self.knowledge.missing(neighbor, &self.store);
                if messages.is_empty() {
                    None
                } else {
                    Some(GossipRound {
                        neighbor: neighbor.clone(),
                        messages,
                    })
                }
            })
            .collect()
    }

    /// Credits `neighbor` with exactly the batch it confirmed.
    pub fn confirm(&mut self, neighbor: &str, sent: &HashSet<Message>) {
        self.knowledge.mark_known(neighbor, sent);
        trace!(neighbor, count = sent.len(), "peer knowledge advanced");
    }

    /// Applies a batch shared by `from`. Returns true if anything was new.
    pub fn receive_gossip(&mut self, from: &str, messages: &[Message]) -> bool {
        let mut learned = 0;
        for message in messages {
            if self.store.insert(*message) {
                learned += 1;
            }
        }
        // The sender had these, so it does not need them back.
        self.knowledge.mark_known(from, messages);
        debug!(from, received = messages.len(), learned, "gossip applied");
        learned > 0
    }
}
