use std::net::SocketAddr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to send to {addr}: {source}")]
    Send {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Malformed payload: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Missing message type")]
    MissingType,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Encoding failed: {0}")]
    Encode(#[source] serde_json::Error),
}
