pub mod message;
pub mod peers;
pub mod processor;
pub mod state;
pub mod store;

pub use message::*;
pub use peers::*;
pub use processor::*;
pub use state::*;
pub use store::*;
