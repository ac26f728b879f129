//! JSON datagram encoding for [`RaftMessage`].

use serde_json::Value;

use super::CodecError;
use crate::raft::RaftMessage;

pub fn encode(message: &RaftMessage) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(message).map_err(CodecError::Encode)
}

pub fn decode(payload: &[u8]) -> Result<RaftMessage, CodecError> {
    let value: Value = serde_json::from_slice(payload).map_err(CodecError::Malformed)?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(CodecError::MissingType)?;
    if !RaftMessage::KINDS.contains(&kind) {
        return Err(CodecError::UnknownType(kind.to_string()));
    }

    serde_json::from_value(value).map_err(CodecError::Malformed)
}
