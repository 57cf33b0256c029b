use std::{sync::Arc, time::Duration};

use tokio::{
    sync::mpsc::Receiver,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, trace};

use super::{
    message::{Body, Message, NodeId},
    state::{GossipRound, SharedState},
};
use crate::{common::config::Config, network::transport::RpcGateway};

/*
    One dispatcher per node. Rounds never overlap: the loop waits for a
    trigger (a collapsed wake or the periodic tick), computes every neighbor's
    diff under the state lock, fires one request per non-empty diff and goes
    back to waiting. Completions run on their own tasks and only ever union
    the batch they were created with into peer knowledge.
*/

pub struct GossipProcessor {
    pub id: NodeId,
    pub state: SharedState,
    pub gateway: Arc<dyn RpcGateway>,
    pub wake_rx: Receiver<()>,
    pub gossip_interval: Duration,
    pub rpc_timeout: Duration,
}

impl GossipProcessor {
    pub fn new(
        id: NodeId,
        state: SharedState,
        gateway: Arc<dyn RpcGateway>,
        wake_rx: Receiver<()>,
        config: &Config,
    ) -> Self {
        GossipProcessor {
            id,
            state,
            gateway,
            wake_rx,
            gossip_interval: config.gossip_interval,
            rpc_timeout: config.rpc_timeout,
        }
    }

    /// Runs until every wake sender is dropped.
    pub async fn run(mut self) {
        info!(node = %self.id, interval = ?self.gossip_interval, "gossip processor started");
        let mut ticker = time::interval(self.gossip_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                wake = self.wake_rx.recv() => {
                    if wake.is_none() {
                        break;
                    }
                    trace!(node = %self.id, "woken by new message");
                }
                _ = ticker.tick() => {}
            }
            self.dispatch_round();
        }

        info!(node = %self.id, "gossip processor stopped");
    }

    /// Computes fresh diffs and sends one batch per neighbor that needs one.
    pub fn dispatch_round(&self) -> usize {
        let rounds = self.state.lock().rounds();
        let sent = rounds.len();
        for round in rounds {
            self.send_round(round);
        }
        if sent > 0 {
            debug!(node = %self.id, batches = sent, "gossip round dispatched");
        }
        sent
    }

    fn send_round(&self, round: GossipRound) {
        let GossipRound { neighbor, messages } = round;
        let mut batch: Vec<Message> = messages.iter().copied().collect();
        batch.sort_unstable();
        trace!(node = %self.id, %neighbor, count = batch.len(), "sending gossip");

        let reply = self.gateway.request(&neighbor, Body::Gossip { messages: batch });
        let state = self.state.clone();
        let timeout = self.rpc_timeout;

        tokio::spawn(async move {
            match time::timeout(timeout, reply).await {
                Ok(Ok(Body::GossipOk)) => state.lock().confirm(&neighbor, &messages),
                Ok(Ok(other)) => {
                    debug!(%neighbor, kind = other.kind(), "unexpected gossip reply");
                }
                // Dropped or timed out; the next tick resends.
                Ok(Err(_)) | Err(_) => trace!(%neighbor, "gossip unconfirmed"),
            }
        });
    }
}
