pub mod node;
pub mod sim;
pub mod stdio;
pub mod transport;

pub use node::*;
pub use transport::*;

/*
    Network communication is point-to-point and unreliable: a request may be
    lost, duplicated by a retry, or answered long after the sender stopped
    caring. Nothing above this layer assumes ordering or completion. A
    confirmation, when one arrives, is the only evidence that a peer holds
    what we sent it.
*/
