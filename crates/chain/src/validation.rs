//! The block validation kernel.
//!
//! [`validate`] answers one question: is this block acceptable as the child
//! of the current tip? Checks run in a fixed order and the first failure is
//! returned:
//!
//! 1. Chain continuity (height and previous hash)
//! 2. Merkle integrity of the transaction root
//! 3. Producer signature over the block hash
//! 4. Coinbase rule: exactly one coinbase transfer, first in the list
//! 5. Address well-formedness of recipients, votees, and contracts
//! 6. Per-sender nonce continuity against committed state
//! 7. Signature of every non-coinbase action

use crate::StateFactory;
use rolldpos_core::{AddressTarget, ValidationError};
use rolldpos_types::{Action, ActionPayload, Block, Hash};
use std::collections::HashMap;

/// Validate `block` as the next block after `(tip_height, tip_hash)`.
pub fn validate(
    block: &Block,
    tip_height: u64,
    tip_hash: Hash,
    state: &dyn StateFactory,
) -> Result<(), ValidationError> {
    if block.header.height != tip_height + 1 || block.header.prev_hash != tip_hash {
        return Err(ValidationError::ChainDiscontinuity {
            height: block.header.height,
            prev_hash: block.header.prev_hash,
            tip_height,
            tip_hash,
        });
    }

    let computed = block.tx_root();
    if computed != block.header.tx_root {
        return Err(ValidationError::InvalidMerkleRoot {
            declared: block.header.tx_root,
            computed,
        });
    }

    block
        .verify_signature()
        .map_err(|e| ValidationError::InvalidSignature(format!("block producer: {e}")))?;

    verify_coinbase(block)?;
    verify_actions(block, state)
}

/// Run the action-level checks (addresses, nonces, action signatures)
/// without the block-level ones.
pub fn verify_actions(block: &Block, state: &dyn StateFactory) -> Result<(), ValidationError> {
    verify_addresses(block)?;
    verify_nonces(block, state)?;
    verify_action_signatures(block)
}

fn verify_coinbase(block: &Block) -> Result<(), ValidationError> {
    let count = block.transfers.iter().filter(|t| t.is_coinbase()).count();
    let first_is_coinbase = block.transfers.first().is_some_and(Action::is_coinbase);
    if count != 1 || !first_is_coinbase {
        return Err(ValidationError::WrongCoinbase { count });
    }
    Ok(())
}

fn verify_addresses(block: &Block) -> Result<(), ValidationError> {
    for action in block
        .transfers
        .iter()
        .chain(block.votes.iter())
        .chain(block.executions.iter())
    {
        match &action.payload {
            ActionPayload::Transfer { recipient, .. } => {
                if !recipient.is_well_formed() {
                    return Err(ValidationError::InvalidAddress {
                        target: AddressTarget::TransferRecipient,
                        address: recipient.as_str().to_string(),
                    });
                }
            }
            ActionPayload::Vote { votee } => {
                if !votee.is_well_formed() {
                    return Err(ValidationError::InvalidAddress {
                        target: AddressTarget::Votee,
                        address: votee.as_str().to_string(),
                    });
                }
            }
            ActionPayload::Execution { contract, .. } => {
                // The empty address means contract creation.
                if !contract.is_empty() && !contract.is_well_formed() {
                    return Err(ValidationError::InvalidAddress {
                        target: AddressTarget::Contract,
                        address: contract.as_str().to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// For every non-coinbase sender, the block-local nonces sorted ascending
/// must be exactly `{base+1, ..., base+k}` where `base` is the committed
/// nonce. Duplicates, stale values, and gaps all fail.
fn verify_nonces(block: &Block, state: &dyn StateFactory) -> Result<(), ValidationError> {
    let mut by_sender: HashMap<&rolldpos_types::Address, Vec<u64>> = HashMap::new();
    for action in block
        .transfers
        .iter()
        .chain(block.votes.iter())
        .chain(block.executions.iter())
    {
        if action.is_coinbase() {
            continue;
        }
        by_sender.entry(&action.sender).or_default().push(action.nonce);
    }

    for (sender, mut nonces) in by_sender {
        nonces.sort_unstable();
        let base = state.account_state(sender).nonce;
        let consecutive = nonces
            .iter()
            .enumerate()
            .all(|(i, &nonce)| nonce == base + 1 + i as u64);
        if !consecutive {
            return Err(ValidationError::ActionNonce {
                sender: sender.as_str().to_string(),
            });
        }
    }
    Ok(())
}

fn verify_action_signatures(block: &Block) -> Result<(), ValidationError> {
    for action in block
        .transfers
        .iter()
        .chain(block.votes.iter())
        .chain(block.executions.iter())
    {
        action.verify_signature().map_err(|e| {
            ValidationError::InvalidSignature(format!(
                "action {} from {}: {e}",
                action.hash(),
                action.sender
            ))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemStateFactory;
    use rolldpos_types::test_utils::{test_address, test_keypair};
    use rolldpos_types::{Address, KeyPair};

    fn producer() -> KeyPair {
        test_keypair(0)
    }

    fn producer_addr() -> Address {
        Address::from_pubkey(&producer().public_key())
    }

    fn coinbase() -> Action {
        Action::new_coinbase_transfer(50 << 22, producer_addr())
    }

    fn signed_transfer(nonce: u64, amount: u128) -> Action {
        let key = producer();
        Action::new_transfer(
            nonce,
            amount,
            producer_addr(),
            test_address(0xaa),
            vec![],
            100_000,
            10,
        )
        .unwrap()
        .sign(&key)
        .unwrap()
    }

    fn signed_vote(nonce: u64, votee: Address) -> Action {
        Action::new_vote(nonce, producer_addr(), votee, 100_000, 10)
            .unwrap()
            .sign(&producer())
            .unwrap()
    }

    fn signed_block(transfers: Vec<Action>, votes: Vec<Action>) -> Block {
        let mut block = Block::new(1, 3, Hash::from_bytes(b"tip"), 0, transfers, votes, vec![]);
        block.sign(&producer());
        block
    }

    fn tip_hash() -> Hash {
        Hash::from_bytes(b"tip")
    }

    #[test]
    fn test_valid_block_passes() {
        let sf = InMemStateFactory::new();
        let block = signed_block(vec![coinbase(), signed_transfer(1, 20)], vec![]);
        assert!(validate(&block, 2, tip_hash(), &sf).is_ok());
    }

    #[test]
    fn test_chain_discontinuity() {
        let sf = InMemStateFactory::new();
        let block = signed_block(vec![coinbase()], vec![]);

        let err = validate(&block, 7, tip_hash(), &sf).unwrap_err();
        assert_eq!(err.kind(), "ChainDiscontinuity");

        let err = validate(&block, 2, Hash::from_bytes(b"other tip"), &sf).unwrap_err();
        assert_eq!(err.kind(), "ChainDiscontinuity");
    }

    #[test]
    fn test_swapped_transfers_fail_merkle_check() {
        let sf = InMemStateFactory::new();
        let mut block = signed_block(vec![coinbase(), signed_transfer(1, 20)], vec![]);
        assert!(validate(&block, 2, tip_hash(), &sf).is_ok());

        block.transfers.swap(0, 1);
        let err = validate(&block, 2, tip_hash(), &sf).unwrap_err();
        assert_eq!(err.kind(), "InvalidMerkleRoot");
    }

    #[test]
    fn test_producer_signature_required() {
        let sf = InMemStateFactory::new();
        let mut block = signed_block(vec![coinbase()], vec![]);
        block.header.producer_signature = None;
        let err = validate(&block, 2, tip_hash(), &sf).unwrap_err();
        assert_eq!(err.kind(), "InvalidSignature");
    }

    #[test]
    fn test_missing_coinbase_rejected() {
        let sf = InMemStateFactory::new();
        let block = signed_block(vec![signed_transfer(1, 20)], vec![]);
        let err = validate(&block, 2, tip_hash(), &sf).unwrap_err();
        assert!(err
            .to_string()
            .contains("wrong number of coinbase transfers"));
    }

    #[test]
    fn test_extra_coinbase_rejected() {
        let sf = InMemStateFactory::new();
        let block = signed_block(vec![coinbase(), coinbase(), signed_transfer(1, 20)], vec![]);
        let err = validate(&block, 2, tip_hash(), &sf).unwrap_err();
        assert!(err
            .to_string()
            .contains("wrong number of coinbase transfers"));
    }

    #[test]
    fn test_no_transfers_rejected() {
        let sf = InMemStateFactory::new();
        let block = signed_block(vec![], vec![]);
        let err = validate(&block, 2, tip_hash(), &sf).unwrap_err();
        assert!(err
            .to_string()
            .contains("wrong number of coinbase transfers"));
    }

    #[test]
    fn test_misplaced_coinbase_rejected() {
        let sf = InMemStateFactory::new();
        let block = signed_block(vec![signed_transfer(1, 20), coinbase()], vec![]);
        let err = validate(&block, 2, tip_hash(), &sf).unwrap_err();
        assert_eq!(err.kind(), "WrongCoinbase");
    }

    #[test]
    fn test_invalid_recipient_address() {
        let key = producer();
        let mut tsf = Action::new_transfer(
            1,
            1,
            producer_addr(),
            test_address(0xaa),
            vec![],
            100_000,
            10,
        )
        .unwrap();
        tsf.payload = ActionPayload::Transfer {
            amount: 1,
            recipient: Address::new("io1qyqsyqcyq5narhapakcsrhksfajfcpl24us3xp38zwvsep"),
            payload: vec![],
        };
        let tsf = tsf.sign(&key).unwrap();
        let block = Block::new(1, 3, Hash::ZERO, 0, vec![tsf], vec![], vec![]);

        let err = verify_actions(&block, &InMemStateFactory::new()).unwrap_err();
        assert!(err
            .to_string()
            .contains("failed to validate transfer recipient's address"));
    }

    #[test]
    fn test_invalid_votee_address() {
        let vote = signed_vote(1, Address::new("ioaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"));
        let block = Block::new(1, 3, Hash::ZERO, 0, vec![], vec![vote], vec![]);

        let err = verify_actions(&block, &InMemStateFactory::new()).unwrap_err();
        assert!(err
            .to_string()
            .contains("failed to validate votee's address"));
    }

    #[test]
    fn test_invalid_contract_address() {
        let exec = Action::new_execution(
            1,
            producer_addr(),
            Address::new("123"),
            1,
            vec![],
            100_000,
            10,
        )
        .unwrap()
        .sign(&producer())
        .unwrap();
        let block = Block::new(1, 3, Hash::ZERO, 0, vec![], vec![], vec![exec]);

        let err = verify_actions(&block, &InMemStateFactory::new()).unwrap_err();
        assert!(err
            .to_string()
            .contains("failed to validate contract's address"));
    }

    #[test]
    fn test_empty_contract_address_means_creation() {
        let exec = Action::new_execution(
            1,
            producer_addr(),
            Address::empty(),
            0,
            vec![1, 2, 3],
            100_000,
            10,
        )
        .unwrap()
        .sign(&producer())
        .unwrap();
        let block = signed_block(vec![coinbase()], vec![]);
        let mut block = block;
        block.executions.push(exec);
        block.header.tx_root = block.tx_root();
        block.sign(&producer());

        assert!(validate(&block, 2, tip_hash(), &InMemStateFactory::new()).is_ok());
    }

    #[test]
    fn test_duplicate_transfer_nonce_rejected() {
        let sf = InMemStateFactory::new();
        let block = signed_block(
            vec![coinbase(), signed_transfer(2, 30), signed_transfer(2, 30)],
            vec![],
        );
        let err = validate(&block, 2, tip_hash(), &sf).unwrap_err();
        assert_eq!(err.kind(), "ErrActionNonce");
    }

    #[test]
    fn test_duplicate_vote_nonce_rejected() {
        let sf = InMemStateFactory::new();
        let block = signed_block(
            vec![coinbase()],
            vec![signed_vote(2, test_address(1)), signed_vote(2, test_address(2))],
        );
        let err = validate(&block, 2, tip_hash(), &sf).unwrap_err();
        assert_eq!(err.kind(), "ErrActionNonce");
    }

    #[test]
    fn test_low_nonce_rejected() {
        // Committed nonce 1; re-submitting nonce 1 is stale.
        let sf = InMemStateFactory::new();
        let committed = Block::new(
            1,
            1,
            Hash::ZERO,
            0,
            vec![signed_transfer(1, 20)],
            vec![],
            vec![],
        );
        sf.apply_block(&committed);

        let block = signed_block(vec![coinbase(), signed_transfer(1, 30)], vec![]);
        let err = validate(&block, 2, tip_hash(), &sf).unwrap_err();
        assert_eq!(err.kind(), "ErrActionNonce");
    }

    #[test]
    fn test_nonce_gap_rejected() {
        let sf = InMemStateFactory::new();
        let block = signed_block(
            vec![coinbase(), signed_transfer(2, 30), signed_transfer(4, 30)],
            vec![],
        );
        let err = validate(&block, 2, tip_hash(), &sf).unwrap_err();
        assert_eq!(err.kind(), "ErrActionNonce");

        let block = signed_block(
            vec![coinbase()],
            vec![signed_vote(2, test_address(1)), signed_vote(4, test_address(2))],
        );
        let err = validate(&block, 2, tip_hash(), &sf).unwrap_err();
        assert_eq!(err.kind(), "ErrActionNonce");
    }

    #[test]
    fn test_consecutive_nonces_pass() {
        let sf = InMemStateFactory::new();
        let block = signed_block(
            vec![coinbase(), signed_transfer(1, 10), signed_transfer(3, 10)],
            vec![signed_vote(2, test_address(1))],
        );
        // Nonces {1, 2, 3} across transfers and votes are consecutive.
        assert!(validate(&block, 2, tip_hash(), &sf).is_ok());
    }

    #[test]
    fn test_forged_action_signature_rejected() {
        let sf = InMemStateFactory::new();
        let mut tsf = signed_transfer(1, 20);
        tsf.signature = Some(rolldpos_types::Signature::zero());
        let block = signed_block(vec![coinbase(), tsf], vec![]);
        let err = validate(&block, 2, tip_hash(), &sf).unwrap_err();
        assert_eq!(err.kind(), "InvalidSignature");
    }
}
