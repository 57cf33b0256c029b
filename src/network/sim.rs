use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use parking_lot::{Mutex, RwLock};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::{
    broadcast::message::{Body, NodeId},
    common::config::Config,
};

use super::{node::Node, transport::RpcGateway};

/// How a simulated link misbehaves.
#[derive(Clone, Debug)]
pub enum LossPolicy {
    Reliable,
    /// Drops requests number n, 2n, 3n... sent through each gateway.
    DropEveryNth(u64),
    /// Drops requests and replies independently at random.
    Random { drop_probability: f64, seed: u64 },
}

enum Dropper {
    Reliable,
    EveryNth { n: u64, sent: u64 },
    Random { p: f64, rng: StdRng },
}

impl Dropper {
    fn new(policy: &LossPolicy, salt: u64) -> Self {
        match *policy {
            LossPolicy::Reliable => Dropper::Reliable,
            LossPolicy::DropEveryNth(n) => Dropper::EveryNth { n: n.max(1), sent: 0 },
            LossPolicy::Random { drop_probability, seed } => Dropper::Random {
                p: drop_probability.clamp(0.0, 1.0),
                rng: StdRng::seed_from_u64(seed.wrapping_add(salt)),
            },
        }
    }

    fn drop_request(&mut self) -> bool {
        match self {
            Dropper::Reliable => false,
            Dropper::EveryNth { n, sent } => {
                *sent += 1;
                *sent % *n == 0
            }
            Dropper::Random { p, rng } => rng.gen_bool(*p),
        }
    }

    fn drop_reply(&mut self) -> bool {
        match self {
            Dropper::Random { p, rng } => rng.gen_bool(*p),
            _ => false,
        }
    }
}

type Registry = RwLock<HashMap<NodeId, Node>>;

/// Carries one node's outbound traffic to the other simulated nodes.
pub struct SimGateway {
    from: NodeId,
    nodes: Weak<Registry>,
    dropper: Arc<Mutex<Dropper>>,
    delivered: AtomicU64,
    dropped: Arc<AtomicU64>,
}

impl SimGateway {
    fn target(&self, target: &str) -> Option<Node> {
        self.nodes.upgrade()?.read().get(target).cloned()
    }
}

impl RpcGateway for SimGateway {
    fn send(&self, target: &str, body: Body) {
        // Unknown targets must not consume a slot in the drop pattern.
        let Some(node) = self.target(target) else {
            return;
        };
        if self.dropper.lock().drop_request() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.delivered.fetch_add(1, Ordering::Relaxed);
        let from = self.from.clone();
        tokio::spawn(async move {
            if let Err(err) = node.handle(&from, body) {
                debug!(%from, target = node.id(), error = %err, "simulated send rejected");
            }
        });
    }

    fn request(&self, target: &str, body: Body) -> oneshot::Receiver<Body> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let Some(node) = self.target(target) else {
            return reply_rx;
        };
        if self.dropper.lock().drop_request() {
            trace!(from = %self.from, %target, "simulated request loss");
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return reply_rx;
        }
        self.delivered.fetch_add(1, Ordering::Relaxed);

        let from = self.from.clone();
        let dropper = self.dropper.clone();
        let dropped = self.dropped.clone();
        tokio::spawn(async move {
            let reply = match node.handle(&from, body) {
                Ok(reply) => reply,
                Err(err) => {
                    debug!(%from, target = node.id(), error = %err, "simulated request rejected");
                    return;
                }
            };
            if dropper.lock().drop_reply() {
                trace!(%from, "simulated reply loss");
                dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            let _ = reply_tx.send(reply);
        });
        reply_rx
    }
}

/// A cluster of nodes wired through [`SimGateway`]s in one runtime.
pub struct SimNetwork {
    nodes: Arc<Registry>,
    gateways: Vec<Arc<SimGateway>>,
}

impl SimNetwork {
    pub fn new(ids: &[&str], policy: LossPolicy, config: &Config) -> Self {
        let nodes: Arc<Registry> = Arc::new(RwLock::new(HashMap::new()));
        let mut gateways = Vec::with_capacity(ids.len());

        for (salt, id) in ids.iter().enumerate() {
            let gateway = Arc::new(SimGateway {
                from: id.to_string(),
                nodes: Arc::downgrade(&nodes),
                dropper: Arc::new(Mutex::new(Dropper::new(&policy, salt as u64))),
                delivered: AtomicU64::new(0),
                dropped: Arc::new(AtomicU64::new(0)),
            });
            let node = Node::spawn(*id, gateway.clone(), config);
            nodes.write().insert(id.to_string(), node);
            gateways.push(gateway);
        }

        SimNetwork { nodes, gateways }
    }

    pub fn node(&self, id: &str) -> Option<Node> {
        self.nodes.read().get(id).cloned()
    }

    /// Hands the same adjacency map to every node.
    pub fn set_topology(&self, topology: &HashMap<NodeId, Vec<NodeId>>) {
        for node in self.nodes.read().values() {
            node.set_topology(topology);
        }
    }

    pub fn delivered(&self) -> u64 {
        self.gateways.iter().map(|g| g.delivered.load(Ordering::Relaxed)).sum()
    }

    pub fn dropped(&self) -> u64 {
        self.gateways.iter().map(|g| g.dropped.load(Ordering::Relaxed)).sum()
    }
}
