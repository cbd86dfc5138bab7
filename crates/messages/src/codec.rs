//! Message encoding and decoding for network transport.
//!
//! # Wire Format
//!
//! ```text
//! [version: u8][length: u32 le][payload: encoded ConsensusMsg]
//! ```
//!
//! The length prefix covers the payload only, so messages can be framed on
//! stream transports. A decoded message round-trips bit-for-bit.

use crate::ConsensusMsg;
use thiserror::Error;

/// Current wire format version.
pub const WIRE_VERSION: u8 = 1;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Unknown wire version: {0}")]
    UnknownVersion(u8),

    #[error("Message too short")]
    MessageTooShort,

    #[error("Frame length mismatch: prefix {prefix}, payload {payload}")]
    LengthMismatch { prefix: usize, payload: usize },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),
}

/// Encode an outbound message to wire format.
pub fn encode_message(message: &ConsensusMsg) -> Result<Vec<u8>, CodecError> {
    let payload = bincode::serialize(message).map_err(|e| CodecError::Encode(e.to_string()))?;
    let mut bytes = Vec::with_capacity(5 + payload.len());
    bytes.push(WIRE_VERSION);
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode a message from wire format.
pub fn decode_message(data: &[u8]) -> Result<ConsensusMsg, CodecError> {
    if data.len() < 5 {
        return Err(CodecError::MessageTooShort);
    }
    let version = data[0];
    if version != WIRE_VERSION {
        return Err(CodecError::UnknownVersion(version));
    }
    let prefix = u32::from_le_bytes(data[1..5].try_into().expect("4-byte slice")) as usize;
    let payload = &data[5..];
    if payload.len() != prefix {
        return Err(CodecError::LengthMismatch {
            prefix,
            payload: payload.len(),
        });
    }
    bincode::deserialize(payload).map_err(|e| CodecError::Decode(e.to_string()))
}
