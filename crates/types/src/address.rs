//! Bech32 account addresses.
//!
//! Addresses are printable strings with the `io` human-readable prefix, a
//! `1` separator, and a bech32-encoded 20-byte payload derived from the
//! account public key. Well-formedness (charset, checksum, payload length)
//! is decidable without any state lookup.

use crate::{Hash, PublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Human-readable prefix of every account address.
pub const ADDRESS_HRP: &str = "io";

/// Length of the decoded address payload in bytes.
const PAYLOAD_BYTES: usize = 20;

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// A printable account address.
///
/// The inner string is not guaranteed to be well-formed: addresses arrive
/// over the wire and are validated explicitly with [`Address::validate`].
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wrap a raw address string without validating it.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The distinguished empty address: as an execution contract it means
    /// contract creation.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// The canonical sentinel sender of coinbase transfers.
    ///
    /// Coinbase transfers are never signed; they are identified by this
    /// sender (and nonce zero).
    pub fn coinbase_sentinel() -> Self {
        Self::from_payload(&[0u8; PAYLOAD_BYTES])
    }

    /// Derive the address of a public key.
    pub fn from_pubkey(pubkey: &PublicKey) -> Self {
        let digest = Hash::from_bytes(&pubkey.to_bytes());
        let mut payload = [0u8; PAYLOAD_BYTES];
        payload.copy_from_slice(&digest.as_bytes()[..PAYLOAD_BYTES]);
        Self::from_payload(&payload)
    }

    /// Encode a 20-byte payload as a bech32 address.
    pub fn from_payload(payload: &[u8; PAYLOAD_BYTES]) -> Self {
        let data = convert_bits(payload, 8, 5, true).expect("8->5 with padding cannot fail");
        let checksum = create_checksum(ADDRESS_HRP, &data);
        let mut out = String::with_capacity(ADDRESS_HRP.len() + 1 + data.len() + 6);
        out.push_str(ADDRESS_HRP);
        out.push('1');
        for v in data.iter().chain(checksum.iter()) {
            out.push(CHARSET[*v as usize] as char);
        }
        Self(out)
    }

    /// Get the raw address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check for the empty-address sentinel.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check well-formedness without distinguishing failure causes.
    pub fn is_well_formed(&self) -> bool {
        self.validate().is_ok()
    }

    /// Validate prefix, charset, checksum, and payload length.
    pub fn validate(&self) -> Result<(), AddressError> {
        let raw = &self.0;
        let sep = raw.rfind('1').ok_or(AddressError::MissingSeparator)?;
        let (hrp, data_part) = (&raw[..sep], &raw[sep + 1..]);
        if hrp != ADDRESS_HRP {
            return Err(AddressError::InvalidHrp(hrp.to_string()));
        }
        if data_part.len() < 6 {
            return Err(AddressError::TooShort);
        }
        let mut values = Vec::with_capacity(data_part.len());
        for c in data_part.chars() {
            let v = CHARSET
                .iter()
                .position(|&b| b as char == c)
                .ok_or(AddressError::InvalidCharacter(c))?;
            values.push(v as u8);
        }
        if !verify_checksum(hrp, &values) {
            return Err(AddressError::ChecksumMismatch);
        }
        let payload = convert_bits(&values[..values.len() - 6], 5, 8, false)
            .ok_or(AddressError::InvalidPadding)?;
        if payload.len() != PAYLOAD_BYTES {
            return Err(AddressError::InvalidPayloadLength(payload.len()));
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from address validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// No `1` separator between prefix and data.
    #[error("missing separator")]
    MissingSeparator,

    /// Wrong human-readable prefix.
    #[error("invalid address prefix: {0}")]
    InvalidHrp(String),

    /// Data part shorter than the checksum.
    #[error("address too short")]
    TooShort,

    /// Character outside the bech32 charset.
    #[error("invalid address character: {0}")]
    InvalidCharacter(char),

    /// Checksum verification failed.
    #[error("address checksum mismatch")]
    ChecksumMismatch,

    /// Non-zero padding bits in the data part.
    #[error("invalid address padding")]
    InvalidPadding,

    /// Decoded payload is not 20 bytes.
    #[error("invalid address payload length: {0}")]
    InvalidPayloadLength(usize),
}

fn polymod(values: &[u8]) -> u32 {
    const GEN: [u32; 5] = [
        0x3b6a_57b2,
        0x2650_8e6d,
        0x1ea1_19fa,
        0x3d42_33dd,
        0x2a14_62b3,
    ];
    let mut chk: u32 = 1;
    for &v in values {
        let b = chk >> 25;
        chk = ((chk & 0x01ff_ffff) << 5) ^ u32::from(v);
        for (i, g) in GEN.iter().enumerate() {
            if (b >> i) & 1 == 1 {
                chk ^= g;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(hrp.len() * 2 + 1);
    for c in hrp.bytes() {
        out.push(c >> 5);
    }
    out.push(0);
    for c in hrp.bytes() {
        out.push(c & 31);
    }
    out
}

fn verify_checksum(hrp: &str, values: &[u8]) -> bool {
    let mut buf = hrp_expand(hrp);
    buf.extend_from_slice(values);
    polymod(&buf) == 1
}

fn create_checksum(hrp: &str, values: &[u8]) -> [u8; 6] {
    let mut buf = hrp_expand(hrp);
    buf.extend_from_slice(values);
    buf.extend_from_slice(&[0u8; 6]);
    let m = polymod(&buf) ^ 1;
    let mut checksum = [0u8; 6];
    for (i, c) in checksum.iter_mut().enumerate() {
        *c = ((m >> (5 * (5 - i))) & 31) as u8;
    }
    checksum
}

fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);
    let max: u32 = (1 << to) - 1;
    for &b in data {
        if u32::from(b) >> from != 0 {
            return None;
        }
        acc = (acc << from) | u32::from(b);
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max) as u8);
        }
    }
    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & max) != 0 {
        return None;
    }
    Some(out)
}
