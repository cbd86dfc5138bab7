//! Network messages for the consensus protocol.

mod codec;
mod gossip;

pub use codec::{decode_message, encode_message, CodecError, WIRE_VERSION};
pub use gossip::{ConsensusMsg, ConsensusPhase, EndorseMsg, ProposeMsg};
