//! Overlay ingress: wire messages to state-machine events.
//!
//! Sender signatures are checked here, before anything reaches the event
//! queue; delegate membership is the state machine's own guard. Messages
//! with bad signatures are dropped, never errored back to the sender.

use rolldpos_core::ConsensusEvent;
use rolldpos_messages::{ConsensusMsg, ConsensusPhase};
use tracing::warn;

/// Convert a received consensus message into an event, or drop it.
pub fn event_from_message(msg: ConsensusMsg) -> Option<ConsensusEvent> {
    match msg {
        ConsensusMsg::Propose(propose) => {
            if !propose.verify() {
                warn!(proposer = %propose.proposer, "dropping proposal with bad signature");
                return None;
            }
            Some(ConsensusEvent::ProposeBlock {
                proposer: propose.proposer.clone(),
                block: Box::new(propose.block),
            })
        }
        ConsensusMsg::Endorse(endorse) => {
            if !endorse.verify() {
                warn!(endorser = %endorse.endorser, "dropping endorsement with bad signature");
                return None;
            }
            Some(match endorse.phase {
                ConsensusPhase::Prevote => ConsensusEvent::Prevote {
                    block_hash: endorse.block_hash,
                    decision: endorse.decision,
                    voter: endorse.endorser,
                },
                ConsensusPhase::Vote => ConsensusEvent::Vote {
                    block_hash: endorse.block_hash,
                    decision: endorse.decision,
                    voter: endorse.endorser,
                },
            })
        }
    }
}
