use std::collections::{HashMap, HashSet};

use super::{message::{Message, NodeId}, store::MessageStore};

/// What we believe each neighbor already has.
///
/// Entries only exist for current neighbors. A known-set only grows, and only
/// when a neighbor confirms a batch or sends us messages itself.
#[derive(Debug, Default)]
pub struct PeerKnowledge {
    known: HashMap<NodeId, HashSet<Message>>,
}

impl PeerKnowledge {
    pub fn new() -> Self {
        PeerKnowledge {
            known: HashMap::new(),
        }
    }

    /// Unions `messages` into the neighbor's known-set. Peers we do not track
    /// (never a neighbor, or since removed) are ignored.
    pub fn mark_known<'a>(&mut self, neighbor: &str, messages: impl IntoIterator<Item = &'a Message>) {
        if let Some(known) = self.known.get_mut(neighbor) {
            known.extend(messages);
        }
    }

    /// `store - known(neighbor)`, recomputed on every call.
    pub fn missing(&self, neighbor: &str, store: &MessageStore) -> HashSet<Message> {
        match self.known.get(neighbor) {
            Some(known) => store.iter().filter(|m| !known.contains(*m)).copied().collect(),
            None => store.iter().copied().collect(),
        }
    }

    pub fn known(&self, neighbor: &str) -> Option<&HashSet<Message>> {
        self.known.get(neighbor)
    }

    /// Aligns tracked peers with `neighbors`: new ones start empty, existing
    /// ones keep their knowledge, removed ones are dropped.
    pub fn sync_neighbors(&mut self, neighbors: &[NodeId]) {
        self.known.retain(|peer, _| neighbors.contains(peer));
        for neighbor in neighbors {
            self.known.entry(neighbor.clone()).or_default();
        }
    }
}

/// This node's neighbor list, as last assigned.
#[derive(Debug, Default)]
pub struct TopologyStore {
    neighbors: Vec<NodeId>,
}

impl TopologyStore {
    pub fn new() -> Self {
        TopologyStore { neighbors: Vec::new() }
    }

    /// Replaces the neighbor list. Duplicates are collapsed, order kept.
    pub fn set_neighbors(&mut self, neighbors: Vec<NodeId>) {
        let mut seen = HashSet::new();
        self.neighbors = neighbors
            .into_iter()
            .filter(|n| seen.insert(n.clone()))
            .collect();
    }

    pub fn neighbors(&self) -> &[NodeId] {
        &self.neighbors
    }
}
