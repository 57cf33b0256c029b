use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::{mpsc, oneshot},
};
use tracing::{debug, info, trace, warn};

use crate::{
    broadcast::message::{Body, NodeId},
    common::{
        config::Config,
        error::{Error, Result},
    },
};

use super::{node::Node, transport::RpcGateway};

/// One line on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub src: NodeId,
    pub dest: NodeId,
    pub body: Payload,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<u64>,
    #[serde(flatten)]
    pub body: Body,
}

/// Writes outbound envelopes and matches replies to pending requests.
pub struct StdioGateway {
    id: NodeId,
    next_msg_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Body>>>,
    out: mpsc::UnboundedSender<Envelope>,
}

impl StdioGateway {
    pub fn new(id: NodeId, out: mpsc::UnboundedSender<Envelope>) -> Self {
        StdioGateway {
            id,
            next_msg_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            out,
        }
    }

    fn emit(&self, dest: &str, msg_id: Option<u64>, body: Body) {
        let envelope = Envelope {
            src: self.id.clone(),
            dest: dest.to_string(),
            body: Payload { msg_id, in_reply_to: None, body },
        };
        if self.out.send(envelope).is_err() {
            debug!(node = %self.id, "output closed, dropping outbound message");
        }
    }

    /// Resolves the request `in_reply_to` refers to. Unknown ids are ignored.
    pub fn complete(&self, in_reply_to: u64, body: Body) -> bool {
        match self.pending.lock().remove(&in_reply_to) {
            Some(reply_tx) => reply_tx.send(body).is_ok(),
            None => {
                trace!(in_reply_to, "reply for unknown or finished request");
                false
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

impl RpcGateway for StdioGateway {
    fn send(&self, target: &str, body: Body) {
        self.emit(target, None, body);
    }

    fn request(&self, target: &str, body: Body) -> oneshot::Receiver<Body> {
        let msg_id = self.next_msg_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            // Callers that gave up leave closed senders behind.
            pending.retain(|_, tx| !tx.is_closed());
            pending.insert(msg_id, reply_tx);
        }
        self.emit(target, Some(msg_id), body);
        reply_rx
    }
}

struct Session {
    node: Node,
    gateway: Arc<StdioGateway>,
}

/// Decodes inbound lines, serves them and writes replies.
pub struct StdioDriver {
    config: Config,
    out: mpsc::UnboundedSender<Envelope>,
    session: Option<Session>,
}

impl StdioDriver {
    pub fn new(config: Config, out: mpsc::UnboundedSender<Envelope>) -> Self {
        StdioDriver {
            config,
            out,
            session: None,
        }
    }

    pub fn node(&self) -> Option<&Node> {
        self.session.as_ref().map(|s| &s.node)
    }

    pub fn handle_line(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        match serde_json::from_str::<Envelope>(line) {
            Ok(envelope) => self.handle_envelope(envelope),
            Err(err) => self.reject_malformed(line, err),
        }
    }

    pub fn handle_envelope(&mut self, envelope: Envelope) -> Result<()> {
        let Envelope { src, dest, body } = envelope;

        if let Some(in_reply_to) = body.in_reply_to {
            if let Some(session) = &self.session {
                session.gateway.complete(in_reply_to, body.body);
            }
            return Ok(());
        }

        let reply = match body.body {
            Body::Init { node_id, node_ids } => Ok(self.init(node_id, node_ids)),
            request => match &self.session {
                Some(session) => session.node.handle(&src, request),
                None => Err(Error::NotInitialized),
            },
        };

        let reply = reply.unwrap_or_else(|err| {
            warn!(%src, error = %err, "request failed");
            Body::Error {
                code: err.code(),
                text: err.to_string(),
            }
        });
        self.reply(&dest, &src, body.msg_id, reply)
    }

    fn init(&mut self, node_id: NodeId, node_ids: Vec<NodeId>) -> Body {
        if let Some(session) = &self.session {
            if session.node.id() != node_id {
                warn!(current = session.node.id(), requested = %node_id, "ignoring re-init with a different id");
            }
            return Body::InitOk;
        }

        info!(node = %node_id, cluster = node_ids.len(), "node initialized");
        let gateway = Arc::new(StdioGateway::new(node_id.clone(), self.out.clone()));
        let node = Node::spawn(node_id, gateway.clone(), &self.config);
        self.session = Some(Session { node, gateway });
        Body::InitOk
    }

    fn reject_malformed(&self, line: &str, err: serde_json::Error) -> Result<()> {
        warn!(error = %err, "undecodable message");
        // Answer if there is enough left to address a reply.
        let Ok(raw) = serde_json::from_str::<serde_json::Value>(line) else {
            return Ok(());
        };
        let (Some(src), Some(dest)) = (raw["src"].as_str(), raw["dest"].as_str()) else {
            return Ok(());
        };
        let Some(msg_id) = raw["body"]["msg_id"].as_u64() else {
            return Ok(());
        };
        let err = match raw["body"]["type"].as_str() {
            Some(kind) if !Body::KINDS.contains(&kind) => Error::Unsupported(kind.to_string()),
            _ => Error::from(err),
        };
        let body = Body::Error {
            code: err.code(),
            text: err.to_string(),
        };
        self.reply(dest, src, Some(msg_id), body)
    }

    fn reply(&self, src: &str, dest: &str, in_reply_to: Option<u64>, body: Body) -> Result<()> {
        let envelope = Envelope {
            src: src.to_string(),
            dest: dest.to_string(),
            body: Payload {
                msg_id: None,
                in_reply_to,
                body,
            },
        };
        self.out.send(envelope).map_err(|_| Error::ChannelClosed)
    }
}

/// Serves a node over stdin/stdout until stdin closes.
pub async fn run(config: Config) -> Result<()> {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Envelope>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(envelope) = out_rx.recv().await {
            let mut line = serde_json::to_vec(&envelope)?;
            line.push(b'\n');
            stdout.write_all(&line).await?;
            stdout.flush().await?;
        }
        Ok::<(), Error>(())
    });

    let mut driver = StdioDriver::new(config, out_tx);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        driver.handle_line(&line)?;
    }
    info!("stdin closed, shutting down");
    drop(driver);

    match writer.await {
        Ok(result) => result,
        Err(_) => Err(Error::ChannelClosed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> (StdioDriver, mpsc::UnboundedReceiver<Envelope>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (StdioDriver::new(Config::default(), out_tx), out_rx)
    }

    fn init_line() -> &'static str {
        r#"{"src":"c0","dest":"n1","body":{"type":"init","msg_id":1,"node_id":"n1","node_ids":["n1","n2"]}}"#
    }

    #[tokio::test]
    async fn test_init_broadcast_read() {
        let (mut driver, mut out) = driver();

        driver.handle_line(init_line()).unwrap();
        let reply = out.recv().await.unwrap();
        assert_eq!(reply.src, "n1");
        assert_eq!(reply.dest, "c0");
        assert_eq!(reply.body.in_reply_to, Some(1));
        assert_eq!(reply.body.body, Body::InitOk);

        driver
            .handle_line(r#"{"src":"c1","dest":"n1","body":{"type":"broadcast","msg_id":2,"message":42}}"#)
            .unwrap();
        assert_eq!(out.recv().await.unwrap().body.body, Body::BroadcastOk);

        driver
            .handle_line(r#"{"src":"c1","dest":"n1","body":{"type":"read","msg_id":3}}"#)
            .unwrap();
        let read = out.recv().await.unwrap();
        assert_eq!(read.body.in_reply_to, Some(3));
        assert_eq!(read.body.body, Body::ReadOk { messages: vec![42] });
    }

    #[tokio::test]
    async fn test_request_before_init_is_rejected() {
        let (mut driver, mut out) = driver();

        driver
            .handle_line(r#"{"src":"c1","dest":"n1","body":{"type":"read","msg_id":5}}"#)
            .unwrap();

        let reply = out.recv().await.unwrap();
        assert_eq!(reply.body.in_reply_to, Some(5));
        assert!(matches!(reply.body.body, Body::Error { code: 11, .. }));
    }

    #[tokio::test]
    async fn test_malformed_request_gets_error_reply() {
        let (mut driver, mut out) = driver();
        driver.handle_line(init_line()).unwrap();
        out.recv().await.unwrap();

        driver
            .handle_line(r#"{"src":"c1","dest":"n1","body":{"type":"broadcast","msg_id":9,"message":"seven"}}"#)
            .unwrap();
        driver.handle_line("not json at all").unwrap();

        let reply = out.recv().await.unwrap();
        assert_eq!(reply.dest, "c1");
        assert_eq!(reply.body.in_reply_to, Some(9));
        assert!(matches!(reply.body.body, Body::Error { code: 12, .. }));
        assert!(out.try_recv().is_err());
        assert!(driver.node().unwrap().query().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_kind_gets_not_supported() {
        let (mut driver, mut out) = driver();
        driver.handle_line(init_line()).unwrap();
        out.recv().await.unwrap();

        driver
            .handle_line(r#"{"src":"c1","dest":"n1","body":{"type":"echo","msg_id":2,"echo":"x"}}"#)
            .unwrap();

        let reply = out.recv().await.unwrap();
        assert_eq!(reply.body.in_reply_to, Some(2));
        match reply.body.body {
            Body::Error { code, text } => {
                assert_eq!(code, 10);
                assert!(text.contains("echo"));
            }
            other => panic!("expected error reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_gossip_reply_completes_pending_request() {
        let (out_tx, mut out) = mpsc::unbounded_channel();
        let gateway = StdioGateway::new("n1".to_string(), out_tx);

        let reply = gateway.request("n2", Body::Gossip { messages: vec![1] });
        let sent = out.recv().await.unwrap();
        assert_eq!(sent.dest, "n2");
        let msg_id = sent.body.msg_id.unwrap();

        assert!(!gateway.complete(msg_id + 100, Body::GossipOk));
        assert!(gateway.complete(msg_id, Body::GossipOk));
        assert!(!gateway.complete(msg_id, Body::GossipOk));
        assert_eq!(reply.await.unwrap(), Body::GossipOk);
        assert_eq!(gateway.pending(), 0);
    }

    #[tokio::test]
    async fn test_send_carries_no_msg_id() {
        let (out_tx, mut out) = mpsc::unbounded_channel();
        let gateway = StdioGateway::new("n1".to_string(), out_tx);

        gateway.send("n2", Body::Gossip { messages: vec![3] });

        let sent = out.recv().await.unwrap();
        assert_eq!(sent.src, "n1");
        assert_eq!(sent.body.msg_id, None);
        assert_eq!(gateway.pending(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_requests_are_pruned() {
        let (out_tx, _out) = mpsc::unbounded_channel();
        let gateway = StdioGateway::new("n1".to_string(), out_tx);

        drop(gateway.request("n2", Body::Gossip { messages: vec![1] }));
        let _live = gateway.request("n2", Body::Gossip { messages: vec![2] });

        assert_eq!(gateway.pending(), 1);
    }

    #[tokio::test]
    async fn test_inbound_gossip_is_acked() {
        let (mut driver, mut out) = driver();
        driver.handle_line(init_line()).unwrap();
        out.recv().await.unwrap();

        driver
            .handle_line(r#"{"src":"n2","dest":"n1","body":{"type":"gossip","msg_id":4,"messages":[1,2]}}"#)
            .unwrap();

        let reply = out.recv().await.unwrap();
        assert_eq!(reply.dest, "n2");
        assert_eq!(reply.body.body, Body::GossipOk);
        assert_eq!(driver.node().unwrap().query(), vec![1, 2]);
    }
}
