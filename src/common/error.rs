use thiserror::Error;

/// Errors surfaced by a single handler invocation.
///
/// Lost or unanswered gossip RPCs are not represented here; the periodic tick
/// absorbs them.
#[derive(Debug, Error)]
pub enum Error {
    /// Inbound payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Reading stdin or writing stdout failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A request arrived before `init`.
    #[error("node not initialized")]
    NotInitialized,

    /// A body kind this node does not serve as a request.
    #[error("unsupported request: {0}")]
    Unsupported(String),

    /// The node's dispatcher or output channel is gone.
    #[error("channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

pub const CODE_NOT_SUPPORTED: u32 = 10;
pub const CODE_TEMPORARILY_UNAVAILABLE: u32 = 11;
pub const CODE_MALFORMED_REQUEST: u32 = 12;
pub const CODE_CRASH: u32 = 13;

impl Error {
    /// Wire error code reported back to the requester.
    pub fn code(&self) -> u32 {
        match self {
            Error::Decode(_) => CODE_MALFORMED_REQUEST,
            Error::NotInitialized => CODE_TEMPORARILY_UNAVAILABLE,
            Error::Unsupported(_) => CODE_NOT_SUPPORTED,
            Error::Io(_) | Error::ChannelClosed => CODE_CRASH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let decode = serde_json::from_str::<u64>("nope").unwrap_err();
        assert_eq!(Error::from(decode).code(), CODE_MALFORMED_REQUEST);
        assert_eq!(Error::NotInitialized.code(), CODE_TEMPORARILY_UNAVAILABLE);
        assert_eq!(Error::Unsupported("read_ok".into()).code(), CODE_NOT_SUPPORTED);
    }
}
