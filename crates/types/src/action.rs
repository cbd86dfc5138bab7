//! Ledger actions: transfers, votes, and contract executions.
//!
//! Every action carries the common envelope (version, nonce, sender, gas
//! limit, gas price) plus a class-specific payload. The action hash is the
//! domain-separated BLAKE2b of the canonical serialization of all
//! non-signature fields; the signature covers the same bytes.
//!
//! Nonce zero is reserved for coinbase transfers, which are identified by
//! the canonical sentinel sender and are never signed.

use crate::{Address, Hash, KeyPair, PublicKey, Signature};
use serde::{Deserialize, Serialize};

/// Maximum size of a transfer payload in bytes.
pub const MAX_TRANSFER_PAYLOAD_BYTES: usize = 32 * 1024;

/// Domain tag mixed into every action hash.
const ACTION_HASH_DOMAIN: &[u8] = b"rolldpos.action";

/// Class-specific action payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionPayload {
    /// Move `amount` to `recipient`, with an opaque attachment.
    Transfer {
        amount: u128,
        recipient: Address,
        payload: Vec<u8>,
    },
    /// Vote for a candidate (the votee may equal the voter).
    Vote { votee: Address },
    /// Invoke `contract` with `data`, or create a contract when the
    /// contract address is the empty sentinel.
    Execution {
        contract: Address,
        amount: u128,
        data: Vec<u8>,
    },
}

impl ActionPayload {
    fn tag(&self) -> u8 {
        match self {
            ActionPayload::Transfer { .. } => 0,
            ActionPayload::Vote { .. } => 1,
            ActionPayload::Execution { .. } => 2,
        }
    }
}

/// A signed, nonce-bearing ledger action.
///
/// Actions are immutable once constructed; [`Action::sign`] consumes and
/// returns the signed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Protocol version.
    pub version: u32,
    /// Per-sender sequence number; zero only for coinbase transfers.
    pub nonce: u64,
    /// Originating account.
    pub sender: Address,
    /// Gas ceiling for this action.
    pub gas_limit: u64,
    /// Price per gas unit.
    pub gas_price: u128,
    /// Class-specific payload.
    pub payload: ActionPayload,
    /// Public key of the sender; absent on coinbase transfers.
    pub sender_pubkey: Option<PublicKey>,
    /// Signature over the canonical byte stream; absent on coinbase.
    pub signature: Option<Signature>,
}

impl Action {
    /// Create an unsigned transfer.
    pub fn new_transfer(
        nonce: u64,
        amount: u128,
        sender: Address,
        recipient: Address,
        payload: Vec<u8>,
        gas_limit: u64,
        gas_price: u128,
    ) -> Result<Self, ActionError> {
        if nonce == 0 {
            return Err(ActionError::ReservedNonce);
        }
        if payload.len() > MAX_TRANSFER_PAYLOAD_BYTES {
            return Err(ActionError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_TRANSFER_PAYLOAD_BYTES,
            });
        }
        Ok(Self {
            version: crate::PROTOCOL_VERSION,
            nonce,
            sender,
            gas_limit,
            gas_price,
            payload: ActionPayload::Transfer {
                amount,
                recipient,
                payload,
            },
            sender_pubkey: None,
            signature: None,
        })
    }

    /// Create an unsigned vote.
    pub fn new_vote(
        nonce: u64,
        voter: Address,
        votee: Address,
        gas_limit: u64,
        gas_price: u128,
    ) -> Result<Self, ActionError> {
        if nonce == 0 {
            return Err(ActionError::ReservedNonce);
        }
        Ok(Self {
            version: crate::PROTOCOL_VERSION,
            nonce,
            sender: voter,
            gas_limit,
            gas_price,
            payload: ActionPayload::Vote { votee },
            sender_pubkey: None,
            signature: None,
        })
    }

    /// Create an unsigned contract execution.
    pub fn new_execution(
        nonce: u64,
        sender: Address,
        contract: Address,
        amount: u128,
        data: Vec<u8>,
        gas_limit: u64,
        gas_price: u128,
    ) -> Result<Self, ActionError> {
        if nonce == 0 {
            return Err(ActionError::ReservedNonce);
        }
        Ok(Self {
            version: crate::PROTOCOL_VERSION,
            nonce,
            sender,
            gas_limit,
            gas_price,
            payload: ActionPayload::Execution {
                contract,
                amount,
                data,
            },
            sender_pubkey: None,
            signature: None,
        })
    }

    /// Create the coinbase transfer crediting `recipient` with the block
    /// reward. Coinbase transfers bypass signing entirely.
    pub fn new_coinbase_transfer(amount: u128, recipient: Address) -> Self {
        Self {
            version: crate::PROTOCOL_VERSION,
            nonce: 0,
            sender: Address::coinbase_sentinel(),
            gas_limit: 0,
            gas_price: 0,
            payload: ActionPayload::Transfer {
                amount,
                recipient,
                payload: vec![],
            },
            sender_pubkey: None,
            signature: None,
        }
    }

    /// Check whether this is the coinbase transfer.
    pub fn is_coinbase(&self) -> bool {
        self.nonce == 0
            && self.sender == Address::coinbase_sentinel()
            && matches!(self.payload, ActionPayload::Transfer { .. })
    }

    /// Canonical serialization of the non-signature fields.
    ///
    /// This is the preimage of both the action hash and the signature.
    pub fn byte_stream(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
        put_bytes(&mut out, self.sender.as_str().as_bytes());
        out.extend_from_slice(&self.gas_limit.to_le_bytes());
        out.extend_from_slice(&self.gas_price.to_le_bytes());
        out.push(self.payload.tag());
        match &self.payload {
            ActionPayload::Transfer {
                amount,
                recipient,
                payload,
            } => {
                out.extend_from_slice(&amount.to_le_bytes());
                put_bytes(&mut out, recipient.as_str().as_bytes());
                put_bytes(&mut out, payload);
            }
            ActionPayload::Vote { votee } => {
                put_bytes(&mut out, votee.as_str().as_bytes());
            }
            ActionPayload::Execution {
                contract,
                amount,
                data,
            } => {
                put_bytes(&mut out, contract.as_str().as_bytes());
                out.extend_from_slice(&amount.to_le_bytes());
                put_bytes(&mut out, data);
            }
        }
        match &self.sender_pubkey {
            Some(pk) => {
                out.push(1);
                put_bytes(&mut out, &pk.to_bytes());
            }
            None => out.push(0),
        }
        out
    }

    /// Domain-separated hash of the canonical byte stream.
    pub fn hash(&self) -> Hash {
        Hash::from_parts(&[ACTION_HASH_DOMAIN, &self.byte_stream()])
    }

    /// Sign the action, attaching the sender public key and signature.
    ///
    /// Coinbase transfers must not be signed.
    pub fn sign(mut self, key: &KeyPair) -> Result<Self, ActionError> {
        if self.is_coinbase() {
            return Err(ActionError::CoinbaseSigning);
        }
        self.sender_pubkey = Some(key.public_key());
        let stream = self.byte_stream();
        self.signature = Some(key.sign(&stream));
        Ok(self)
    }

    /// Verify the signature against the sender public key, and the sender
    /// address against that key.
    ///
    /// Coinbase transfers verify vacuously.
    pub fn verify_signature(&self) -> Result<(), ActionError> {
        if self.is_coinbase() {
            return Ok(());
        }
        let pubkey = self
            .sender_pubkey
            .as_ref()
            .ok_or(ActionError::MissingSignature)?;
        if Address::from_pubkey(pubkey) != self.sender {
            return Err(ActionError::InvalidSignature);
        }
        let signature = self
            .signature
            .as_ref()
            .ok_or(ActionError::MissingSignature)?;
        if pubkey.verify(&self.byte_stream(), signature) {
            Ok(())
        } else {
            Err(ActionError::InvalidSignature)
        }
    }

}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

/// Errors from action construction and verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// Nonce zero is reserved for coinbase transfers.
    #[error("nonce zero is reserved for coinbase transfers")]
    ReservedNonce,

    /// Transfer payload exceeds the size cap.
    #[error("transfer payload too large: {len} > {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// Coinbase transfers are never signed.
    #[error("coinbase transfers cannot be signed")]
    CoinbaseSigning,

    /// Signature or public key absent on a non-coinbase action.
    #[error("action is missing signature or public key")]
    MissingSignature,

    /// Signature does not verify against the sender public key.
    #[error("action signature verification failed")]
    InvalidSignature,
}
