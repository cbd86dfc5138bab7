//! The consensus worker loop.
//!
//! One task pulls the FSM event queue and dispatches handlers to
//! completion, one event at a time, so handlers see a serializable view of
//! consensus state. A stop signal exits at the next safe point, between
//! events.

use crate::metrics::CONSENSUS_EVENTS;
use rolldpos_consensus::ConsensusFsm;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Stops a running [`ConsensusRunner`].
pub struct StopHandle {
    stop_tx: oneshot::Sender<()>,
}

impl StopHandle {
    /// Signal the worker to stop after the event it is handling.
    pub fn stop(self) {
        let _ = self.stop_tx.send(());
    }
}

/// The single worker driving the consensus state machine.
pub struct ConsensusRunner {
    fsm: ConsensusFsm,
    stop_rx: oneshot::Receiver<()>,
}

impl ConsensusRunner {
    /// Wrap a state machine; pair with the returned stop handle.
    pub fn new(fsm: ConsensusFsm) -> (Self, StopHandle) {
        let (stop_tx, stop_rx) = oneshot::channel();
        (Self { fsm, stop_rx }, StopHandle { stop_tx })
    }

    /// Produce into the FSM queue from the ingress path.
    pub fn fsm(&self) -> &ConsensusFsm {
        &self.fsm
    }

    /// Run until stopped or the queue closes. Consumes the runner; the
    /// state machine is returned for inspection after shutdown.
    pub async fn run(mut self) -> ConsensusFsm {
        info!("consensus worker starting");
        self.fsm.start();
        loop {
            tokio::select! {
                biased;
                _ = &mut self.stop_rx => {
                    info!("stop signal received, exiting at safe point");
                    break;
                }
                event = self.fsm.next_event() => {
                    let Some(event) = event else {
                        debug!("event queue closed");
                        break;
                    };
                    CONSENSUS_EVENTS
                        .with_label_values(&[event.event.type_name()])
                        .inc();
                    self.fsm.handle_event(event);
                }
            }
        }
        info!("consensus worker stopped");
        self.fsm
    }
}
