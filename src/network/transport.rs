use tokio::sync::oneshot;

use crate::broadcast::message::Body;

/// Outbound primitives a node needs from whatever carries its messages.
///
/// Neither call guarantees delivery. `request` resolves at most once; a
/// receiver that errors or never resolves means "no confirmation".
pub trait RpcGateway: Send + Sync + 'static {
    fn send(&self, target: &str, body: Body);

    fn request(&self, target: &str, body: Body) -> oneshot::Receiver<Body>;
}
