//! Leaf encoding for eligibility entries
//!
//! A leaf is `keccak256(identity || amount)` where `identity` is the raw
//! 20-byte address and `amount` is a 32-byte big-endian unsigned integer.
//! This is the same packing as Solidity's `abi.encodePacked(address, uint256)`,
//! so an on-chain verifier can recompute leaves without any extra rules.

use core::fmt;
use core::str::FromStr;

use k256::ecdsa::VerifyingKey;
use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::hash::{hash_bytes, Hash};
use crate::types::{CoreError, Result};

/// Identity width in bytes
pub const IDENTITY_LEN: usize = 20;

/// Amount width in bytes (uint256)
pub const AMOUNT_LEN: usize = 32;

/// Width of an encoded leaf record
pub const LEAF_ENCODING_LEN: usize = IDENTITY_LEN + AMOUNT_LEN;

/// A 20-byte recipient identifier (Ethereum-style address)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Identity([u8; IDENTITY_LEN]);

impl Identity {
    /// The all-zero identity
    pub const ZERO: Self = Self([0u8; IDENTITY_LEN]);

    pub const fn new(bytes: [u8; IDENTITY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from exactly 40 hex digits, with or without `0x`
    ///
    /// No implicit padding or truncation: anything that is not exactly
    /// 20 bytes is rejected.
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let raw = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if raw.len() != IDENTITY_LEN * 2 {
            return Err(CoreError::InvalidIdentity(s.to_string()));
        }
        let mut bytes = [0u8; IDENTITY_LEN];
        hex::decode_to_slice(raw, &mut bytes).map_err(|_| CoreError::InvalidIdentity(s.to_string()))?;
        Ok(Self(bytes))
    }

    /// Derive the identity controlled by a secp256k1 public key
    ///
    /// Last 20 bytes of keccak256 over the uncompressed point without its
    /// `0x04` tag.
    pub fn from_public_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let digest = hash_bytes(&point.as_bytes()[1..]);
        let mut bytes = [0u8; IDENTITY_LEN];
        bytes.copy_from_slice(&digest[12..]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; IDENTITY_LEN]
    }

    /// Left-pad to a 32-byte ABI word
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self)
    }
}

impl FromStr for Identity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Parse a decimal string into a 256-bit unsigned integer
///
/// The error carries the offending input; overflow and bad digits are
/// reported separately so callers can tell them apart.
pub(crate) fn parse_u256(s: &str) -> Result<U256> {
    let trimmed = s.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoreError::InvalidAmount(s.to_string()));
    }
    U256::from_dec_str(trimmed).map_err(|_| CoreError::AmountOverflow(s.to_string()))
}

/// Big-endian 32-byte encoding of a U256
pub(crate) fn u256_word(value: &U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

/// Reward amount (uint256)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Amount(U256);

impl Amount {
    pub const fn new(value: U256) -> Self {
        Self(value)
    }

    /// Parse a decimal amount
    ///
    /// Fails with `AmountOverflow` above 2^256 - 1.
    pub fn from_dec_str(s: &str) -> Result<Self> {
        parse_u256(s).map(Self)
    }

    pub fn value(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// 32-byte big-endian encoding
    pub fn to_be_bytes(&self) -> [u8; AMOUNT_LEN] {
        u256_word(&self.0)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Self(U256::from(value))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self.0)
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_dec_str(s)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_dec_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Encode an (identity, amount) pair into its fixed-width leaf record
pub fn encode(identity: &Identity, amount: &Amount) -> [u8; LEAF_ENCODING_LEN] {
    let mut out = [0u8; LEAF_ENCODING_LEN];
    out[..IDENTITY_LEN].copy_from_slice(identity.as_bytes());
    out[IDENTITY_LEN..].copy_from_slice(&amount.to_be_bytes());
    out
}

/// Encode from textual inputs (hex identity, decimal amount)
pub fn encode_str(identity: &str, amount: &str) -> Result<[u8; LEAF_ENCODING_LEN]> {
    let identity = Identity::from_hex(identity)?;
    let amount = Amount::from_dec_str(amount)?;
    Ok(encode(&identity, &amount))
}

/// Leaf hash: keccak256(encode(identity, amount))
#[inline]
pub fn hash_leaf(identity: &Identity, amount: &Amount) -> Hash {
    hash_bytes(&encode(identity, amount))
}
