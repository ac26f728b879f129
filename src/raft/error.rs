use thiserror::Error;

use super::NodeId;
use crate::network::NetworkError;

#[derive(Error, Debug)]
pub enum RaftError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}
