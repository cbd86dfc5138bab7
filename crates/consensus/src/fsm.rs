//! The consensus state machine.
//!
//! One handler per transition. Handlers return the next state; any
//! non-retriable error sends the machine to `Invalid` for that event after
//! re-enqueueing `RollDelegates` to restart the epoch. Timeouts are events
//! produced with a delay when their state is entered; a timeout that fires
//! after its enabling condition has been superseded is dropped by the
//! dispatcher, which only routes events valid for the current state.

use crate::context::{EpochCtx, RollDposCtx, RoundCtx};
use rolldpos_core::{ChainError, ConsensusEvent, ConsensusState, TimedEvent};
use rolldpos_messages::{ConsensusMsg, ConsensusPhase, EndorseMsg, ProposeMsg};
use rolldpos_types::{Block, Hash, KeyPair};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Non-retriable state-machine failures.
#[derive(Debug, Error)]
pub enum FsmError {
    /// A collaborator call failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Vote quorum reached without a recorded candidate block.
    #[error("vote quorum reached without a recorded candidate block")]
    MissingCandidate,
}

/// The Roll-DPoS state machine.
///
/// Owns the bounded event queue. The worker loop pulls one event at a time
/// and dispatches it; handlers may produce further events, immediately or
/// with a delay.
pub struct ConsensusFsm {
    ctx: RollDposCtx,
    state: ConsensusState,
    /// Clock reading at the current round's creation. Timeout events armed
    /// before it belong to a superseded round and are dropped, which
    /// cancels a round's timers on transition out of their owning states.
    round_started_at: Duration,
    evt_tx: mpsc::Sender<TimedEvent>,
    evt_rx: mpsc::Receiver<TimedEvent>,
}

impl ConsensusFsm {
    /// Create the state machine in `EpochStart`.
    pub fn new(ctx: RollDposCtx) -> Self {
        let capacity = ctx.cfg.event_chan_size.max(1) as usize;
        let (evt_tx, evt_rx) = mpsc::channel(capacity);
        Self {
            ctx,
            state: ConsensusState::EpochStart,
            round_started_at: Duration::ZERO,
            evt_tx,
            evt_rx,
        }
    }

    /// The shared context.
    pub fn ctx(&self) -> &RollDposCtx {
        &self.ctx
    }

    /// Mutable access to the shared context (test setup).
    pub fn ctx_mut(&mut self) -> &mut RollDposCtx {
        &mut self.ctx
    }

    /// The current state.
    pub fn current_state(&self) -> ConsensusState {
        self.state
    }

    /// Kick off consensus by scheduling the first delegate roll.
    pub fn start(&self) {
        self.produce(ConsensusEvent::RollDelegates, Duration::ZERO);
    }

    /// Enqueue an event, after `delay` if nonzero.
    ///
    /// The queue is bounded; a full queue errors back here and the event is
    /// dropped with an error log rather than blocking the producer.
    pub fn produce(&self, event: ConsensusEvent, delay: Duration) {
        let timed = TimedEvent {
            created_at: self.ctx.clock.now(),
            event,
        };
        if delay.is_zero() {
            if let Err(e) = self.evt_tx.try_send(timed) {
                error!(error = %e, "event queue full, dropping event");
            }
            return;
        }
        let tx = self.evt_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = tx.try_send(timed) {
                error!(error = %e, "event queue full, dropping delayed event");
            }
        });
    }

    /// Await the next queued event. Returns `None` once the queue closes.
    pub async fn next_event(&mut self) -> Option<TimedEvent> {
        self.evt_rx.recv().await
    }

    /// Pop the next queued event without waiting (tests).
    pub fn try_next_event(&mut self) -> Option<TimedEvent> {
        self.evt_rx.try_recv().ok()
    }

    /// Dispatch one event against the current state.
    ///
    /// Events that do not apply to the current state (stale timeouts, late
    /// votes) are dropped.
    pub fn handle_event(&mut self, timed: TimedEvent) {
        use ConsensusEvent as E;
        use ConsensusState as S;

        let is_timeout = matches!(
            timed.event,
            E::ProposeBlockTimeout | E::PrevoteTimeout | E::VoteTimeout
        );
        if is_timeout && timed.created_at < self.round_started_at {
            debug!(event = timed.event.type_name(), "dropping cancelled timer");
            return;
        }

        let event = timed.event;
        let name = event.type_name();
        let result = match (self.state, event) {
            (S::EpochStart | S::Invalid, E::RollDelegates) => self.handle_roll_delegates(),
            (S::DkgGeneration, E::GenerateDkg) => self.handle_generate_dkg(),
            (S::RoundStart, E::StartRound) => self.handle_start_round(),
            (S::RoundStart, E::FinishEpoch) => self.handle_finish_epoch(),
            (S::InitPropose, E::InitBlock) => self.handle_init_block(),
            (S::AcceptPropose, evt @ (E::ProposeBlock { .. } | E::ProposeBlockTimeout)) => {
                self.handle_propose_block(evt)
            }
            (S::AcceptPrevote, evt @ (E::Prevote { .. } | E::PrevoteTimeout)) => {
                self.handle_prevote(evt)
            }
            (S::AcceptVote, evt @ (E::Vote { .. } | E::VoteTimeout)) => self.handle_vote(evt),
            #[cfg(any(test, feature = "backdoor"))]
            (_, E::Backdoor(target)) => Ok(target),
            (state, evt) => {
                debug!(state = %state, event = evt.type_name(), "dropping event");
                Ok(state)
            }
        };

        match result {
            Ok(next) => {
                if next != self.state {
                    debug!(from = %self.state, to = %next, event = name, "state transition");
                }
                self.state = next;
            }
            Err(e) => {
                error!(state = %self.state, event = name, error = %e, "handler failed");
                self.state = ConsensusState::Invalid;
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Handlers
    // ═══════════════════════════════════════════════════════════════════════

    /// `EpochStart`: rotate the delegate set and open the next epoch.
    pub fn handle_roll_delegates(&mut self) -> Result<ConsensusState, FsmError> {
        let (epoch_num, epoch_height) = self.ctx.calc_epoch_num_and_height();
        let seed = self.ctx.update_seed();
        let delegates = match self.ctx.rolling_delegates(epoch_num, &seed) {
            Ok(delegates) => delegates,
            Err(e) => {
                warn!(epoch = epoch_num, error = %e, "delegate roll failed, retrying");
                self.produce(ConsensusEvent::RollDelegates, Duration::ZERO);
                return Err(e.into());
            }
        };

        if !delegates.contains(&self.ctx.addr) {
            debug!(epoch = epoch_num, "not a delegate, pausing");
            self.produce(ConsensusEvent::RollDelegates, self.ctx.cfg.proposer_interval);
            return Ok(ConsensusState::EpochStart);
        }

        info!(
            epoch = epoch_num,
            height = epoch_height,
            delegates = delegates.len(),
            "starting epoch"
        );
        self.ctx.epoch = EpochCtx {
            num: epoch_num,
            height: epoch_height,
            num_sub_epochs: self.ctx.cfg.num_sub_epochs,
            delegates,
            seed,
        };
        self.produce(ConsensusEvent::GenerateDkg, Duration::ZERO);
        Ok(ConsensusState::DkgGeneration)
    }

    /// `DkgGeneration`: run the DKG exchange, then schedule the first
    /// round, aligned to the next proposer-interval boundary when one is
    /// configured.
    pub fn handle_generate_dkg(&mut self) -> Result<ConsensusState, FsmError> {
        if self.ctx.dkg_key.is_none() {
            self.ctx.dkg_key = Some(KeyPair::generate_bls());
        }
        let interval = self.ctx.cfg.proposer_interval.as_secs();
        let delay = if interval == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(interval - self.ctx.clock.unix_secs() % interval)
        };
        self.produce(ConsensusEvent::StartRound, delay);
        Ok(ConsensusState::RoundStart)
    }

    /// `RoundStart`: create the round context and elect the proposer.
    pub fn handle_start_round(&mut self) -> Result<ConsensusState, FsmError> {
        let height = self.ctx.chain.tip_height() + 1;
        let proposer = self.ctx.round_proposer(height);
        self.round_started_at = self.ctx.clock.now();
        self.ctx.round = RoundCtx {
            height,
            number: height.saturating_sub(self.ctx.epoch.height) as u32,
            proposer: proposer.clone(),
            block: None,
            prevotes: HashMap::new(),
            votes: HashMap::new(),
            proof_of_lock: Vec::new(),
        };

        if proposer == self.ctx.addr {
            debug!(height, "proposing this round");
            self.produce(ConsensusEvent::InitBlock, Duration::ZERO);
            Ok(ConsensusState::InitPropose)
        } else {
            debug!(height, proposer = %proposer, "waiting for proposal");
            self.produce(
                ConsensusEvent::ProposeBlockTimeout,
                self.ctx.cfg.accept_propose_ttl,
            );
            Ok(ConsensusState::AcceptPropose)
        }
    }

    /// `InitPropose`: mint a candidate from the pool and gossip it. The
    /// proposal also loops back through the queue so the proposer prevotes
    /// on its own candidate.
    pub fn handle_init_block(&mut self) -> Result<ConsensusState, FsmError> {
        let block = match self.ctx.mint_block() {
            Ok(block) => block,
            Err(e) => {
                self.produce(ConsensusEvent::RollDelegates, Duration::ZERO);
                return Err(e.into());
            }
        };
        info!(
            height = block.header.height,
            transfers = block.transfers.len(),
            votes = block.votes.len(),
            executions = block.executions.len(),
            "minted candidate block"
        );
        let msg = ProposeMsg::new(
            self.ctx.round.height,
            self.ctx.round.number,
            block.clone(),
            self.ctx.addr.clone(),
            &self.ctx.key,
        );
        self.broadcast(ConsensusMsg::Propose(Box::new(msg)));
        self.produce(
            ConsensusEvent::ProposeBlock {
                block: Box::new(block),
                proposer: self.ctx.addr.clone(),
            },
            Duration::ZERO,
        );
        Ok(ConsensusState::AcceptPropose)
    }

    /// `AcceptPropose`: judge the candidate and prevote.
    ///
    /// The expected proposer is evaluated at handling time, so under
    /// time-based rotation a proposal from the next slot's proposer is also
    /// accepted. The proposer skips re-validating its own candidate.
    pub fn handle_propose_block(
        &mut self,
        event: ConsensusEvent,
    ) -> Result<ConsensusState, FsmError> {
        match event {
            ConsensusEvent::ProposeBlock { block, proposer } => {
                let expected = self.ctx.round_proposer(self.ctx.round.height);
                let mut decision = proposer == expected;
                if !decision {
                    warn!(
                        proposer = %proposer,
                        expected = %expected,
                        "proposal from unexpected proposer"
                    );
                }
                if decision && proposer != self.ctx.addr {
                    if let Err(e) = self.ctx.chain.validate_block(&block) {
                        warn!(kind = e.kind(), error = %e, "candidate failed validation");
                        decision = false;
                    }
                }
                let block_hash = block.hash_block();
                if decision {
                    self.ctx.round.block = Some(*block);
                }
                self.endorse(ConsensusPhase::Prevote, block_hash, decision);
            }
            ConsensusEvent::ProposeBlockTimeout => {
                debug!(height = self.ctx.round.height, "no proposal before timeout");
            }
            _ => unreachable!("dispatcher routes only propose events here"),
        }
        self.produce(
            ConsensusEvent::PrevoteTimeout,
            self.ctx.cfg.accept_prevote_ttl,
        );
        Ok(ConsensusState::AcceptPrevote)
    }

    /// `AcceptPrevote`: tally prevotes; a yes-quorum locks the candidate
    /// and unlocks the vote phase, a timeout votes no.
    pub fn handle_prevote(&mut self, event: ConsensusEvent) -> Result<ConsensusState, FsmError> {
        match event {
            ConsensusEvent::Prevote {
                block_hash,
                decision,
                voter,
            } => {
                if !self.ctx.is_delegate(&voter) {
                    debug!(voter = %voter, "prevote from non-delegate");
                    return Ok(ConsensusState::AcceptPrevote);
                }
                // First decision per delegate wins.
                self.ctx.round.prevotes.entry(voter).or_insert(decision);

                let yes = self.ctx.round.prevotes.values().filter(|d| **d).count();
                if yes < self.ctx.quorum() {
                    return Ok(ConsensusState::AcceptPrevote);
                }
                self.ctx.round.proof_of_lock = self
                    .ctx
                    .round
                    .prevotes
                    .iter()
                    .filter(|(_, d)| **d)
                    .map(|(addr, _)| addr.clone())
                    .collect();
                let hash = self.candidate_hash(block_hash);
                info!(height = self.ctx.round.height, prevotes = yes, "prevote quorum");
                self.endorse(ConsensusPhase::Vote, hash, true);
                self.produce(ConsensusEvent::VoteTimeout, self.ctx.cfg.accept_vote_ttl);
                Ok(ConsensusState::AcceptVote)
            }
            ConsensusEvent::PrevoteTimeout => {
                debug!(height = self.ctx.round.height, "prevote quorum timed out");
                let hash = self.candidate_hash(Hash::ZERO);
                self.endorse(ConsensusPhase::Vote, hash, false);
                self.produce(ConsensusEvent::VoteTimeout, self.ctx.cfg.accept_vote_ttl);
                Ok(ConsensusState::AcceptVote)
            }
            _ => unreachable!("dispatcher routes only prevote events here"),
        }
    }

    /// `AcceptVote`: tally votes; a yes-quorum commits, a timeout commits
    /// the dummy block when enabled.
    pub fn handle_vote(&mut self, event: ConsensusEvent) -> Result<ConsensusState, FsmError> {
        match event {
            ConsensusEvent::Vote {
                decision, voter, ..
            } => {
                if !self.ctx.is_delegate(&voter) {
                    debug!(voter = %voter, "vote from non-delegate");
                    return Ok(ConsensusState::AcceptVote);
                }
                self.ctx.round.votes.entry(voter).or_insert(decision);

                let yes = self.ctx.round.votes.values().filter(|d| **d).count();
                if yes < self.ctx.quorum() {
                    return Ok(ConsensusState::AcceptVote);
                }
                let Some(block) = self.ctx.round.block.clone() else {
                    self.produce(ConsensusEvent::RollDelegates, Duration::ZERO);
                    return Err(FsmError::MissingCandidate);
                };
                if let Err(e) = self.ctx.chain.commit_block(&block) {
                    self.produce(ConsensusEvent::RollDelegates, Duration::ZERO);
                    return Err(e.into());
                }
                info!(
                    height = block.header.height,
                    hash = %block.hash_block(),
                    votes = yes,
                    "committed block"
                );
                self.ctx.act_pool.reset();
                // Share the committed block so lagging peers catch up.
                let msg = ProposeMsg::new(
                    self.ctx.round.height,
                    self.ctx.round.number,
                    block,
                    self.ctx.addr.clone(),
                    &self.ctx.key,
                );
                self.broadcast(ConsensusMsg::Propose(Box::new(msg)));
                self.produce(ConsensusEvent::FinishEpoch, Duration::ZERO);
                Ok(ConsensusState::RoundStart)
            }
            ConsensusEvent::VoteTimeout => {
                if self.ctx.cfg.enable_dummy_block {
                    let dummy = self.ctx.chain.mint_new_dummy_block();
                    info!(height = dummy.header.height, "vote quorum timed out, committing dummy");
                    if let Err(e) = self.ctx.chain.commit_block(&dummy) {
                        self.produce(ConsensusEvent::RollDelegates, Duration::ZERO);
                        return Err(e.into());
                    }
                    self.ctx.act_pool.reset();
                    let msg = ProposeMsg::new(
                        dummy.header.height,
                        self.ctx.round.number,
                        dummy,
                        self.ctx.addr.clone(),
                        &self.ctx.key,
                    );
                    self.broadcast(ConsensusMsg::Propose(Box::new(msg)));
                } else {
                    debug!(height = self.ctx.round.height, "vote quorum timed out");
                }
                self.produce(ConsensusEvent::FinishEpoch, Duration::ZERO);
                Ok(ConsensusState::RoundStart)
            }
            _ => unreachable!("dispatcher routes only vote events here"),
        }
    }

    /// `RoundStart` bookkeeping: next round, or roll delegates when the
    /// epoch's block range is complete.
    pub fn handle_finish_epoch(&mut self) -> Result<ConsensusState, FsmError> {
        let tip = self.ctx.chain.tip_height();
        let last = self.ctx.epoch.height + self.ctx.cfg.rounds_per_epoch() - 1;
        if tip < last {
            self.produce(ConsensusEvent::StartRound, Duration::ZERO);
            Ok(ConsensusState::RoundStart)
        } else {
            info!(epoch = self.ctx.epoch.num, tip, "epoch complete");
            self.produce(ConsensusEvent::RollDelegates, Duration::ZERO);
            Ok(ConsensusState::EpochStart)
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════════

    /// Hash of the locked candidate, or `fallback` when none is recorded.
    fn candidate_hash(&self, fallback: Hash) -> Hash {
        self.ctx
            .round
            .block
            .as_ref()
            .map(Block::hash_block)
            .unwrap_or(fallback)
    }

    /// Sign, broadcast, and self-deliver an endorsement.
    fn endorse(&self, phase: ConsensusPhase, block_hash: Hash, decision: bool) {
        let msg = EndorseMsg::new(
            phase,
            self.ctx.round.height,
            self.ctx.round.number,
            block_hash,
            decision,
            self.ctx.addr.clone(),
            &self.ctx.key,
        );
        self.broadcast(ConsensusMsg::Endorse(msg));
        let event = match phase {
            ConsensusPhase::Prevote => ConsensusEvent::Prevote {
                block_hash,
                decision,
                voter: self.ctx.addr.clone(),
            },
            ConsensusPhase::Vote => ConsensusEvent::Vote {
                block_hash,
                decision,
                voter: self.ctx.addr.clone(),
            },
        };
        self.produce(event, Duration::ZERO);
    }

    /// Broadcast with a single retry; failures never block progress.
    fn broadcast(&self, msg: ConsensusMsg) {
        if let Err(e) = self.ctx.overlay.broadcast(msg.clone()) {
            warn!(error = %e, kind = msg.type_name(), "broadcast failed, retrying once");
            if let Err(e) = self.ctx.overlay.broadcast(msg) {
                warn!(error = %e, "broadcast retry failed, continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::sort_candidates;
    use crate::mocks::{MockActPool, MockChain, MockClock, MockOverlay};
    use rolldpos_core::{Candidate, ConsensusConfig};
    use rolldpos_types::test_utils::{test_address, test_keypair, test_transfer, test_vote};
    use rolldpos_types::Address;
    use std::sync::Arc;

    struct Fixture {
        chain: Arc<MockChain>,
        pool: Arc<MockActPool>,
        overlay: Arc<MockOverlay>,
        clock: Arc<MockClock>,
    }

    /// Build a state machine whose chain sits at tip 1 with a staged
    /// candidate block for height 2, mirroring one mid-epoch round.
    fn new_test_fsm(self_seed: u8, delegate_seeds: &[u8]) -> (ConsensusFsm, Fixture) {
        let actor = test_keypair(0xbb);
        let transfer = test_transfer(&actor, 1, 100);
        let vote = test_vote(&actor, 2, test_address(0xbb));

        let last_block = Block::new(1, 1, Hash::ZERO, 0, vec![], vec![], vec![]);
        let block_to_mint = Block::new(
            1,
            2,
            last_block.hash_block(),
            0,
            vec![transfer.clone()],
            vec![vote.clone()],
            vec![],
        );

        let chain = Arc::new(MockChain::new());
        chain.set_tip(1, last_block.hash_block());
        chain.insert_block(last_block);
        chain.set_block_to_mint(block_to_mint);
        chain.set_candidates(
            delegate_seeds
                .iter()
                .map(|&s| Candidate {
                    address: test_address(s),
                    votes: 0,
                })
                .collect(),
        );

        let pool = Arc::new(MockActPool::new());
        pool.set_actions(vec![transfer], vec![vote], vec![]);

        let overlay = Arc::new(MockOverlay::new());
        let clock = Arc::new(MockClock::new());

        let cfg = ConsensusConfig {
            event_chan_size: 16,
            num_delegates: delegate_seeds.len() as u32,
            num_sub_epochs: 1,
            proposer_interval: Duration::ZERO,
            time_based_rotation: false,
            enable_dummy_block: true,
            accept_propose_ttl: Duration::ZERO,
            accept_prevote_ttl: Duration::ZERO,
            accept_vote_ttl: Duration::ZERO,
        };
        let ctx = RollDposCtx::new(
            cfg,
            test_keypair(self_seed),
            Arc::clone(&chain) as _,
            Arc::clone(&pool) as _,
            Arc::clone(&overlay) as _,
            Arc::clone(&clock) as _,
        );
        (
            ConsensusFsm::new(ctx),
            Fixture {
                chain,
                pool,
                overlay,
                clock,
            },
        )
    }

    fn set_epoch(fsm: &mut ConsensusFsm, delegate_seeds: &[u8]) {
        fsm.ctx_mut().epoch = EpochCtx {
            num: 1,
            height: 1,
            num_sub_epochs: 1,
            delegates: delegate_seeds.iter().map(|&s| test_address(s)).collect(),
            seed: vec![0u8; 32],
        };
    }

    fn set_round(fsm: &mut ConsensusFsm, proposer: Address) {
        fsm.ctx_mut().round = RoundCtx {
            height: 2,
            number: 1,
            proposer,
            ..Default::default()
        };
    }

    fn timed(event: ConsensusEvent) -> TimedEvent {
        TimedEvent {
            event,
            created_at: Duration::ZERO,
        }
    }

    fn next_type(fsm: &mut ConsensusFsm) -> &'static str {
        fsm.try_next_event().expect("queue has an event").event.type_name()
    }

    fn prevote(voter: u8, decision: bool) -> ConsensusEvent {
        ConsensusEvent::Prevote {
            block_hash: Hash::from_bytes(b"candidate"),
            decision,
            voter: test_address(voter),
        }
    }

    fn vote(voter: u8, decision: bool) -> ConsensusEvent {
        ConsensusEvent::Vote {
            block_hash: Hash::from_bytes(b"candidate"),
            decision,
            voter: test_address(voter),
        }
    }

    #[test]
    fn test_backdoor_event() {
        let (mut fsm, _fx) = new_test_fsm(0, &[0, 1, 2, 3]);
        assert_eq!(fsm.current_state(), ConsensusState::EpochStart);
        for state in ConsensusState::ALL {
            fsm.handle_event(timed(ConsensusEvent::Backdoor(state)));
            assert_eq!(fsm.current_state(), state);
        }
    }

    #[test]
    fn test_roll_delegates_as_delegate() {
        let (mut fsm, _fx) = new_test_fsm(0, &[0, 1, 2, 3]);
        let next = fsm.handle_roll_delegates().unwrap();
        assert_eq!(next, ConsensusState::DkgGeneration);
        assert_eq!(fsm.ctx().epoch.num, 1);
        assert_eq!(fsm.ctx().epoch.height, 1);
        assert_eq!(fsm.ctx().epoch.num_sub_epochs, 1);

        let mut expected: Vec<Address> = (0u8..4).map(test_address).collect();
        sort_candidates(&mut expected, 1, &[0u8; 32]);
        assert_eq!(fsm.ctx().epoch.delegates, expected);
        assert_eq!(next_type(&mut fsm), "GenerateDkg");
    }

    #[test]
    fn test_roll_delegates_not_a_delegate() {
        let (mut fsm, _fx) = new_test_fsm(0, &[1, 2, 3, 4]);
        let next = fsm.handle_roll_delegates().unwrap();
        assert_eq!(next, ConsensusState::EpochStart);
        // Epoch context is untouched.
        assert_eq!(fsm.ctx().epoch.height, 0);
        assert_eq!(next_type(&mut fsm), "RollDelegates");
    }

    #[test]
    fn test_roll_delegates_candidate_shortfall() {
        let (mut fsm, fx) = new_test_fsm(0, &[0, 1, 2, 3]);
        fx.chain.set_candidates(vec![]);
        assert!(fsm.handle_roll_delegates().is_err());
        assert_eq!(fsm.ctx().epoch.height, 0);
        assert_eq!(next_type(&mut fsm), "RollDelegates");

        // Same failure on a fresh chain.
        fx.chain.set_tip(0, Hash::ZERO);
        assert!(fsm.handle_roll_delegates().is_err());
        assert_eq!(next_type(&mut fsm), "RollDelegates");
    }

    #[test]
    fn test_generate_dkg_without_interval() {
        let (mut fsm, _fx) = new_test_fsm(2, &[0, 1, 2, 3]);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        let next = fsm.handle_generate_dkg().unwrap();
        assert_eq!(next, ConsensusState::RoundStart);
        assert!(fsm.ctx().dkg_key.is_some());
        assert_eq!(next_type(&mut fsm), "StartRound");
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_dkg_aligns_to_interval() {
        let (mut fsm, _fx) = new_test_fsm(2, &[0, 1, 2, 3]);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        fsm.ctx_mut().cfg.proposer_interval = Duration::from_secs(2);

        let next = fsm.handle_generate_dkg().unwrap();
        assert_eq!(next, ConsensusState::RoundStart);
        // The round start is delayed to the next interval boundary.
        assert!(fsm.try_next_event().is_none());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(next_type(&mut fsm), "StartRound");
    }

    #[test]
    fn test_start_round_as_proposer() {
        let (mut fsm, _fx) = new_test_fsm(2, &[0, 1, 2, 3]);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        let next = fsm.handle_start_round().unwrap();
        assert_eq!(next, ConsensusState::InitPropose);
        assert_eq!(fsm.ctx().round.height, 2);
        assert_eq!(fsm.ctx().round.proposer, test_address(2));
        assert!(fsm.ctx().round.prevotes.is_empty());
        assert!(fsm.ctx().round.votes.is_empty());
        assert_eq!(next_type(&mut fsm), "InitBlock");
    }

    #[test]
    fn test_start_round_as_follower() {
        let (mut fsm, _fx) = new_test_fsm(1, &[1, 2, 3, 4]);
        set_epoch(&mut fsm, &[1, 2, 3, 4]);
        let next = fsm.handle_start_round().unwrap();
        assert_eq!(next, ConsensusState::AcceptPropose);
        assert_eq!(fsm.ctx().round.proposer, test_address(3));
        assert_eq!(next_type(&mut fsm), "ProposeBlockTimeout");
    }

    #[test]
    fn test_init_block_mints_and_self_proposes() {
        let (mut fsm, fx) = new_test_fsm(2, &[0, 1, 2, 3]);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        set_round(&mut fsm, test_address(2));

        let next = fsm.handle_init_block().unwrap();
        assert_eq!(next, ConsensusState::AcceptPropose);

        let event = fsm.try_next_event().unwrap().event;
        match event {
            ConsensusEvent::ProposeBlock { block, proposer } => {
                assert_eq!(proposer, test_address(2));
                assert_eq!(block.transfers.len(), 1);
                assert_eq!(block.votes.len(), 1);
            }
            other => panic!("expected ProposeBlock, got {}", other.type_name()),
        }
        let broadcasts = fx.overlay.broadcasts();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(broadcasts[0].type_name(), "propose");
    }

    #[test]
    fn test_propose_block_accepted() {
        let (mut fsm, fx) = new_test_fsm(0, &[0, 1, 2, 3]);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        set_round(&mut fsm, test_address(2));

        let block = fsm.ctx().mint_block().unwrap();
        let next = fsm
            .handle_propose_block(ConsensusEvent::ProposeBlock {
                block: Box::new(block),
                proposer: test_address(2),
            })
            .unwrap();
        assert_eq!(next, ConsensusState::AcceptPrevote);
        assert!(fsm.ctx().round.block.is_some());

        match fsm.try_next_event().unwrap().event {
            ConsensusEvent::Prevote { decision, voter, .. } => {
                assert!(decision);
                assert_eq!(voter, test_address(0));
            }
            other => panic!("expected Prevote, got {}", other.type_name()),
        }
        assert_eq!(next_type(&mut fsm), "PrevoteTimeout");
        assert_eq!(fx.overlay.broadcasts().len(), 1);
        assert_eq!(fx.chain.validate_calls(), 1);
    }

    #[test]
    fn test_propose_block_accepted_across_time_slots() {
        let (mut fsm, fx) = new_test_fsm(0, &[0, 1, 2, 3]);
        fsm.ctx_mut().cfg.time_based_rotation = true;
        fsm.ctx_mut().cfg.proposer_interval = Duration::from_secs(10);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        set_round(&mut fsm, test_address(2));

        fx.clock.add(Duration::from_secs(11));
        let block = fsm.ctx().mint_block().unwrap();
        let next = fsm
            .handle_propose_block(ConsensusEvent::ProposeBlock {
                block: Box::new(block.clone()),
                proposer: test_address(2),
            })
            .unwrap();
        assert_eq!(next, ConsensusState::AcceptPrevote);
        match fsm.try_next_event().unwrap().event {
            ConsensusEvent::Prevote { decision, .. } => assert!(decision),
            other => panic!("expected Prevote, got {}", other.type_name()),
        }
        assert_eq!(next_type(&mut fsm), "PrevoteTimeout");

        // After a slot rollover the next delegate's proposal is accepted
        // as well.
        fx.clock.add(Duration::from_secs(10));
        let next = fsm
            .handle_propose_block(ConsensusEvent::ProposeBlock {
                block: Box::new(block),
                proposer: test_address(3),
            })
            .unwrap();
        assert_eq!(next, ConsensusState::AcceptPrevote);
        match fsm.try_next_event().unwrap().event {
            ConsensusEvent::Prevote { decision, .. } => assert!(decision),
            other => panic!("expected Prevote, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_propose_block_failing_validation_prevotes_no() {
        let (mut fsm, fx) = new_test_fsm(0, &[0, 1, 2, 3]);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        set_round(&mut fsm, test_address(2));
        fx.chain.fail_validation(rolldpos_core::ValidationError::ActionNonce {
            sender: "io1bogus".to_string(),
        });

        let block = fsm.ctx().mint_block().unwrap();
        let next = fsm
            .handle_propose_block(ConsensusEvent::ProposeBlock {
                block: Box::new(block),
                proposer: test_address(2),
            })
            .unwrap();
        assert_eq!(next, ConsensusState::AcceptPrevote);
        assert!(fsm.ctx().round.block.is_none());
        match fsm.try_next_event().unwrap().event {
            ConsensusEvent::Prevote { decision, .. } => assert!(!decision),
            other => panic!("expected Prevote, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_proposer_skips_validating_own_block() {
        let (mut fsm, fx) = new_test_fsm(2, &[0, 1, 2, 3]);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        set_round(&mut fsm, test_address(2));

        let block = fsm.ctx().mint_block().unwrap();
        let next = fsm
            .handle_propose_block(ConsensusEvent::ProposeBlock {
                block: Box::new(block),
                proposer: test_address(2),
            })
            .unwrap();
        assert_eq!(next, ConsensusState::AcceptPrevote);
        assert_eq!(fx.chain.validate_calls(), 0);
        match fsm.try_next_event().unwrap().event {
            ConsensusEvent::Prevote { decision, .. } => assert!(decision),
            other => panic!("expected Prevote, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_propose_block_from_wrong_proposer_prevotes_no() {
        let (mut fsm, _fx) = new_test_fsm(2, &[0, 1, 2, 3]);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        set_round(&mut fsm, test_address(2));

        let block = fsm.ctx().mint_block().unwrap();
        let next = fsm
            .handle_propose_block(ConsensusEvent::ProposeBlock {
                block: Box::new(block),
                proposer: test_address(3),
            })
            .unwrap();
        assert_eq!(next, ConsensusState::AcceptPrevote);
        match fsm.try_next_event().unwrap().event {
            ConsensusEvent::Prevote { decision, .. } => assert!(!decision),
            other => panic!("expected Prevote, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_propose_block_wrong_slot_proposer_prevotes_no() {
        let (mut fsm, fx) = new_test_fsm(2, &[0, 1, 2, 3]);
        fsm.ctx_mut().cfg.time_based_rotation = true;
        fsm.ctx_mut().cfg.proposer_interval = Duration::from_secs(10);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        set_round(&mut fsm, test_address(2));

        fx.clock.add(Duration::from_secs(11));
        let block = fsm.ctx().mint_block().unwrap();
        let next = fsm
            .handle_propose_block(ConsensusEvent::ProposeBlock {
                block: Box::new(block),
                proposer: test_address(3),
            })
            .unwrap();
        assert_eq!(next, ConsensusState::AcceptPrevote);
        match fsm.try_next_event().unwrap().event {
            ConsensusEvent::Prevote { decision, .. } => assert!(!decision),
            other => panic!("expected Prevote, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_propose_timeout_moves_to_prevote() {
        let (mut fsm, fx) = new_test_fsm(2, &[0, 1, 2, 3]);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        set_round(&mut fsm, test_address(2));

        let next = fsm
            .handle_propose_block(ConsensusEvent::ProposeBlockTimeout)
            .unwrap();
        assert_eq!(next, ConsensusState::AcceptPrevote);
        assert_eq!(next_type(&mut fsm), "PrevoteTimeout");
        assert!(fsm.try_next_event().is_none());
        assert!(fx.overlay.broadcasts().is_empty());
        assert_eq!(fx.chain.validate_calls(), 0);
    }

    #[test]
    fn test_prevote_quorum_unlocks_vote_phase() {
        let (mut fsm, fx) = new_test_fsm(0, &[0, 1, 2, 3]);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        set_round(&mut fsm, test_address(2));
        let block = fsm.ctx().mint_block().unwrap();
        fsm.ctx_mut().round.block = Some(block);

        assert_eq!(
            fsm.handle_prevote(prevote(0, true)).unwrap(),
            ConsensusState::AcceptPrevote
        );
        assert_eq!(
            fsm.handle_prevote(prevote(1, true)).unwrap(),
            ConsensusState::AcceptPrevote
        );
        // Third yes reaches 2f+1 = 3.
        assert_eq!(
            fsm.handle_prevote(prevote(2, true)).unwrap(),
            ConsensusState::AcceptVote
        );
        assert_eq!(fsm.ctx().round.proof_of_lock.len(), 3);

        match fsm.try_next_event().unwrap().event {
            ConsensusEvent::Vote { decision, voter, .. } => {
                assert!(decision);
                assert_eq!(voter, test_address(0));
            }
            other => panic!("expected Vote, got {}", other.type_name()),
        }
        assert_eq!(next_type(&mut fsm), "VoteTimeout");
        assert_eq!(fx.overlay.broadcasts().len(), 1);
    }

    #[test]
    fn test_prevote_dedupes_and_ignores_non_delegates() {
        let (mut fsm, _fx) = new_test_fsm(0, &[0, 1, 2, 3]);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        set_round(&mut fsm, test_address(2));

        // Non-delegate prevotes are dropped.
        fsm.handle_prevote(prevote(9, true)).unwrap();
        assert!(fsm.ctx().round.prevotes.is_empty());

        // The first decision per delegate wins.
        fsm.handle_prevote(prevote(1, false)).unwrap();
        fsm.handle_prevote(prevote(1, true)).unwrap();
        assert_eq!(fsm.ctx().round.prevotes.len(), 1);
        assert_eq!(fsm.ctx().round.prevotes[&test_address(1)], false);
    }

    #[test]
    fn test_prevote_timeout_votes_no() {
        let (mut fsm, fx) = new_test_fsm(0, &[0, 1, 2, 3]);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        set_round(&mut fsm, test_address(2));
        let block = fsm.ctx().mint_block().unwrap();
        fsm.ctx_mut().round.block = Some(block);

        let next = fsm.handle_prevote(ConsensusEvent::PrevoteTimeout).unwrap();
        assert_eq!(next, ConsensusState::AcceptVote);
        match fsm.try_next_event().unwrap().event {
            ConsensusEvent::Vote { decision, .. } => assert!(!decision),
            other => panic!("expected Vote, got {}", other.type_name()),
        }
        assert_eq!(next_type(&mut fsm), "VoteTimeout");
        assert_eq!(fx.overlay.broadcasts().len(), 1);
    }

    #[test]
    fn test_vote_quorum_commits() {
        let (mut fsm, fx) = new_test_fsm(0, &[0, 1, 2, 3]);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        set_round(&mut fsm, test_address(2));
        let block = fsm.ctx().mint_block().unwrap();
        fsm.ctx_mut().round.block = Some(block.clone());

        assert_eq!(
            fsm.handle_vote(vote(0, true)).unwrap(),
            ConsensusState::AcceptVote
        );
        assert_eq!(
            fsm.handle_vote(vote(1, true)).unwrap(),
            ConsensusState::AcceptVote
        );
        assert_eq!(
            fsm.handle_vote(vote(2, true)).unwrap(),
            ConsensusState::RoundStart
        );

        let committed = fx.chain.committed();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0], block);
        assert_eq!(fx.pool.resets(), 1);
        assert_eq!(next_type(&mut fsm), "FinishEpoch");
    }

    #[test]
    fn test_vote_timeout_without_dummy_block() {
        let (mut fsm, fx) = new_test_fsm(0, &[0, 1, 2, 3]);
        fsm.ctx_mut().cfg.enable_dummy_block = false;
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        set_round(&mut fsm, test_address(2));
        let block = fsm.ctx().mint_block().unwrap();
        fsm.ctx_mut().round.block = Some(block);

        let next = fsm.handle_vote(ConsensusEvent::VoteTimeout).unwrap();
        assert_eq!(next, ConsensusState::RoundStart);
        assert!(fx.chain.committed().is_empty());
        assert!(fx.overlay.broadcasts().is_empty());
        assert_eq!(next_type(&mut fsm), "FinishEpoch");
    }

    #[test]
    fn test_vote_timeout_commits_dummy_block() {
        let (mut fsm, fx) = new_test_fsm(0, &[0, 1, 2, 3]);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        set_round(&mut fsm, test_address(2));
        let block = fsm.ctx().mint_block().unwrap();
        fsm.ctx_mut().round.block = Some(block);

        let next = fsm.handle_vote(ConsensusEvent::VoteTimeout).unwrap();
        assert_eq!(next, ConsensusState::RoundStart);

        let committed = fx.chain.committed();
        assert_eq!(committed.len(), 1);
        assert!(committed[0].is_dummy());
        assert_eq!(committed[0].header.height, 2);
        assert_eq!(fx.overlay.broadcasts().len(), 1);
        assert_eq!(next_type(&mut fsm), "FinishEpoch");
    }

    #[test]
    fn test_finish_epoch_mid_epoch() {
        let (mut fsm, _fx) = new_test_fsm(0, &[0, 1, 2, 3]);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        set_round(&mut fsm, test_address(2));

        let next = fsm.handle_finish_epoch().unwrap();
        assert_eq!(next, ConsensusState::RoundStart);
        assert_eq!(next_type(&mut fsm), "StartRound");
    }

    #[test]
    fn test_finish_epoch_at_boundary() {
        let (mut fsm, fx) = new_test_fsm(0, &[0, 1, 2, 3]);
        set_epoch(&mut fsm, &[0, 1, 2, 3]);
        set_round(&mut fsm, test_address(2));
        fx.chain.set_tip(4, Hash::from_bytes(b"epoch end"));

        let next = fsm.handle_finish_epoch().unwrap();
        assert_eq!(next, ConsensusState::EpochStart);
        assert_eq!(next_type(&mut fsm), "RollDelegates");
    }

    /// Drive a full round through the dispatcher as the proposer:
    /// RollDelegates -> GenerateDkg -> StartRound -> InitBlock ->
    /// ProposeBlock -> 3 yes-prevotes -> 3 yes-votes -> FinishEpoch.
    #[tokio::test(start_paused = true)]
    async fn test_happy_path_commits_exactly_one_block() {
        let seeds = [0u8, 1, 2, 3];
        // Height 2's proposer is the delegate the epoch ordering puts at
        // index 2; run this node as that delegate.
        let mut ordered: Vec<Address> = seeds.iter().map(|&s| test_address(s)).collect();
        sort_candidates(&mut ordered, 1, &[0u8; 32]);
        let proposer = ordered[2].clone();
        let proposer_seed = seeds
            .iter()
            .copied()
            .find(|&s| test_address(s) == proposer)
            .unwrap();

        let (mut fsm, fx) = new_test_fsm(proposer_seed, &seeds);
        fsm.ctx_mut().cfg.accept_propose_ttl = Duration::from_secs(100);
        fsm.ctx_mut().cfg.accept_prevote_ttl = Duration::from_secs(100);
        fsm.ctx_mut().cfg.accept_vote_ttl = Duration::from_secs(100);

        let step = |fsm: &mut ConsensusFsm, expect: &str| {
            let evt = fsm.try_next_event().expect("queue has an event");
            assert_eq!(evt.event.type_name(), expect);
            fsm.handle_event(evt);
        };

        fsm.start();
        step(&mut fsm, "RollDelegates");
        assert_eq!(fsm.current_state(), ConsensusState::DkgGeneration);
        step(&mut fsm, "GenerateDkg");
        assert_eq!(fsm.current_state(), ConsensusState::RoundStart);
        step(&mut fsm, "StartRound");
        assert_eq!(fsm.current_state(), ConsensusState::InitPropose);
        step(&mut fsm, "InitBlock");
        assert_eq!(fsm.current_state(), ConsensusState::AcceptPropose);
        step(&mut fsm, "ProposeBlock");
        assert_eq!(fsm.current_state(), ConsensusState::AcceptPrevote);

        // Our own prevote plus two peers reach the 2f+1 quorum.
        step(&mut fsm, "Prevote");
        let hash = fsm.ctx().round.block.as_ref().unwrap().hash_block();
        for peer in ordered.iter().filter(|a| **a != proposer).take(2) {
            fsm.handle_event(timed(ConsensusEvent::Prevote {
                block_hash: hash,
                decision: true,
                voter: peer.clone(),
            }));
        }
        assert_eq!(fsm.current_state(), ConsensusState::AcceptVote);

        // Our own vote plus two peers commit the block.
        step(&mut fsm, "Vote");
        for peer in ordered.iter().filter(|a| **a != proposer).take(2) {
            fsm.handle_event(timed(ConsensusEvent::Vote {
                block_hash: hash,
                decision: true,
                voter: peer.clone(),
            }));
        }
        assert_eq!(fsm.current_state(), ConsensusState::RoundStart);
        assert_eq!(fx.chain.committed().len(), 1);

        step(&mut fsm, "FinishEpoch");
        assert_eq!(fsm.current_state(), ConsensusState::RoundStart);
        // The next round is already scheduled.
        assert_eq!(next_type(&mut fsm), "StartRound");
    }
}
