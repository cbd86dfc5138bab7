//! Cryptographic key pairs and signatures.
//!
//! Two families are in play: ED25519 signs producers, actions, and
//! consensus messages; BLS12-381 signs DKG shares, whose signatures
//! aggregate into the epoch seed. Keys and signatures are tagged unions so
//! the two never mix silently.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported key types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    /// ED25519, the default signing scheme.
    Ed25519,
    /// BLS12-381, aggregatable.
    Bls12381,
}

/// A signing key pair.
#[derive(Clone)]
pub enum KeyPair {
    /// ED25519 key pair.
    Ed25519(ed25519_dalek::SigningKey),
    /// BLS12-381 key pair.
    Bls12381(blst::min_pk::SecretKey),
}

impl KeyPair {
    /// Generate a random Ed25519 keypair from the OS entropy source.
    pub fn generate_ed25519() -> Self {
        KeyPair::Ed25519(ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng))
    }

    /// Generate a random BLS12-381 keypair from the OS entropy source.
    pub fn generate_bls() -> Self {
        let mut ikm = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut ikm);
        Self::bls_from_ikm(&ikm)
    }

    /// Derive a keypair from a 32-byte seed. Deterministic; meant for
    /// tests and simulation.
    pub fn from_seed(key_type: KeyType, seed: &[u8; 32]) -> Self {
        match key_type {
            KeyType::Ed25519 => KeyPair::Ed25519(ed25519_dalek::SigningKey::from_bytes(seed)),
            KeyType::Bls12381 => Self::bls_from_ikm(seed),
        }
    }

    fn bls_from_ikm(ikm: &[u8; 32]) -> Self {
        let sk = blst::min_pk::SecretKey::key_gen(ikm, &[]).expect("32-byte ikm is sufficient");
        KeyPair::Bls12381(sk)
    }

    /// Sign a message with the matching signature family.
    pub fn sign(&self, message: &[u8]) -> Signature {
        match self {
            KeyPair::Ed25519(sk) => {
                use ed25519_dalek::Signer;
                Signature::Ed25519(sk.sign(message).to_bytes().to_vec())
            }
            KeyPair::Bls12381(sk) => Signature::Bls12381(sk.sign(message, &[], &[]).to_bytes().to_vec()),
        }
    }

    /// The verifying half of this key pair.
    pub fn public_key(&self) -> PublicKey {
        match self {
            KeyPair::Ed25519(sk) => PublicKey::Ed25519(sk.verifying_key().to_bytes()),
            KeyPair::Bls12381(sk) => PublicKey::Bls12381(sk.sk_to_pk().to_bytes().to_vec()),
        }
    }
}

/// A public key for signature verification.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PublicKey {
    /// ED25519 public key (32 bytes).
    Ed25519([u8; 32]),
    /// BLS12-381 public key (48 bytes compressed).
    Bls12381(Vec<u8>),
}

impl PublicKey {
    /// Key bytes (compressed form for BLS).
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PublicKey::Ed25519(bytes) => bytes.to_vec(),
            PublicKey::Bls12381(bytes) => bytes.clone(),
        }
    }

    /// Verify `signature` over `message`. Mismatched families and
    /// malformed key or signature bytes verify as false.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        match (self, signature) {
            (PublicKey::Ed25519(pk), Signature::Ed25519(sig)) => {
                verify_ed25519(pk, message, sig)
            }
            (PublicKey::Bls12381(pk), Signature::Bls12381(sig)) => {
                verify_bls(pk, message, sig)
            }
            _ => false,
        }
    }

    /// Aggregate BLS public keys into the group key.
    pub fn aggregate_bls(pubkeys: &[PublicKey]) -> Result<Self, AggregateError> {
        if pubkeys.is_empty() {
            return Err(AggregateError::Empty);
        }
        let mut parsed = Vec::with_capacity(pubkeys.len());
        for pk in pubkeys {
            let PublicKey::Bls12381(bytes) = pk else {
                return Err(AggregateError::MixedTypes);
            };
            parsed.push(
                blst::min_pk::PublicKey::from_bytes(bytes)
                    .map_err(|_| AggregateError::AggregationFailed)?,
            );
        }
        let refs: Vec<&blst::min_pk::PublicKey> = parsed.iter().collect();
        let agg = blst::min_pk::AggregatePublicKey::aggregate(&refs, false)
            .map_err(|_| AggregateError::AggregationFailed)?;
        Ok(PublicKey::Bls12381(agg.to_public_key().to_bytes().to_vec()))
    }
}

fn verify_ed25519(pk_bytes: &[u8; 32], message: &[u8], sig_bytes: &[u8]) -> bool {
    use ed25519_dalek::Verifier;
    let Ok(pk) = ed25519_dalek::VerifyingKey::from_bytes(pk_bytes) else {
        return false;
    };
    let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes) else {
        return false;
    };
    pk.verify(message, &ed25519_dalek::Signature::from_bytes(&sig_array))
        .is_ok()
}

fn verify_bls(pk_bytes: &[u8], message: &[u8], sig_bytes: &[u8]) -> bool {
    let Ok(pk) = blst::min_pk::PublicKey::from_bytes(pk_bytes) else {
        return false;
    };
    let Ok(sig) = blst::min_pk::Signature::from_bytes(sig_bytes) else {
        return false;
    };
    sig.verify(true, message, &[], &[], &pk, true) == blst::BLST_ERROR::BLST_SUCCESS
}

/// A signature, tagged with its family.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signature {
    /// ED25519 signature (64 bytes).
    Ed25519(Vec<u8>),
    /// BLS12-381 signature (96 bytes compressed).
    Bls12381(Vec<u8>),
}

impl Signature {
    /// An all-zero placeholder signature (never verifies).
    pub fn zero() -> Self {
        Signature::Ed25519(vec![0u8; 64])
    }

    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Signature::Ed25519(bytes) | Signature::Bls12381(bytes) => bytes,
        }
    }

    /// Aggregate BLS signatures over the same message.
    pub fn aggregate_bls(signatures: &[Signature]) -> Result<Self, AggregateError> {
        if signatures.is_empty() {
            return Err(AggregateError::Empty);
        }
        let mut parsed = Vec::with_capacity(signatures.len());
        for sig in signatures {
            let Signature::Bls12381(bytes) = sig else {
                return Err(AggregateError::MixedTypes);
            };
            parsed.push(
                blst::min_pk::Signature::from_bytes(bytes)
                    .map_err(|_| AggregateError::AggregationFailed)?,
            );
        }
        let refs: Vec<&blst::min_pk::Signature> = parsed.iter().collect();
        let agg = blst::min_pk::AggregateSignature::aggregate(&refs, true)
            .map_err(|_| AggregateError::AggregationFailed)?;
        Ok(Signature::Bls12381(agg.to_signature().to_bytes().to_vec()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (family, bytes): (&str, &[u8]) = match self {
            PublicKey::Ed25519(bytes) => ("ed25519", bytes),
            PublicKey::Bls12381(bytes) => ("bls12381", bytes),
        };
        write!(f, "PublicKey({family}:{})", hex::encode(&bytes[..8.min(bytes.len())]))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (family, bytes): (&str, &[u8]) = match self {
            Signature::Ed25519(bytes) => ("ed25519", bytes),
            Signature::Bls12381(bytes) => ("bls12381", bytes),
        };
        write!(f, "Signature({family}:{}..)", hex::encode(&bytes[..8.min(bytes.len())]))
    }
}

/// Errors that can occur during aggregation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    /// Nothing to aggregate.
    #[error("cannot aggregate an empty list")]
    Empty,

    /// ED25519 material mixed into a BLS aggregation.
    #[error("cannot aggregate mixed signature families")]
    MixedTypes,

    /// The underlying aggregation failed.
    #[error("aggregation failed")]
    AggregationFailed,
}
