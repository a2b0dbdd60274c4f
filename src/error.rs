use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MockSatelliteError {
    #[error("Failed to bind to address {addr}: {source}")]
    BindError {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server task panicked")]
    ServerPanic(#[from] tokio::task::JoinError),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Ingestion pipeline is closed")]
    PipelineClosed,

    #[error("Ingestion pipeline stopped without signalling drain completion")]
    DrainLost,

    #[error("Timed out after {timeout:?} waiting for {expected} {what}, found {found}")]
    WaitTimeout {
        what: &'static str,
        expected: usize,
        found: usize,
        timeout: Duration,
    },
}

/// A protocol violation found while decoding a framed report stream.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed varint")]
    MalformedVarint,

    #[error("unexpected tag {found} for field {field}: expected {expected}")]
    UnexpectedTag { field: u32, expected: u64, found: u64 },

    #[error("stream ended inside a sub-message")]
    UnexpectedEof,

    #[error("truncated payload: declared {declared} bytes, read {read}")]
    Truncated { declared: u64, read: u64 },

    #[error("failed to decode embedded message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("failed to read report body: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for FrameError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            FrameError::UnexpectedEof
        } else {
            FrameError::Io(err)
        }
    }
}
