//! Claim intents and their EIP-712 typed-data encoding
//!
//! A claimant signs `Claim(address recipient,uint256 amount,uint256 nonce,uint256 deadline)`
//! under a domain bound to the system name, version, chain id and verifying
//! contract. `ClaimIntent::signing_digest` is the only place the signed bytes
//! are produced; signing and verification both go through it.

use core::fmt;
use core::str::FromStr;

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::hash::{keccak_hash, Hash};
use crate::leaf::{parse_u256, u256_word, Amount, Identity};
use crate::types::{CoreError, Result};

/// EIP-712 domain type string
pub const DOMAIN_TYPE: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Claim type string
pub const CLAIM_TYPE: &[u8] =
    b"Claim(address recipient,uint256 amount,uint256 nonce,uint256 deadline)";

/// EIP-712 signing domain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimDomain {
    /// System name (e.g. "Dropclaim")
    pub name: String,
    /// Domain version; bump to invalidate outstanding signatures
    pub version: String,
    /// Network identifier
    pub chain_id: u64,
    /// Enforcement point the signature is meant for
    pub verifying_contract: Identity,
}

impl ClaimDomain {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        chain_id: u64,
        verifying_contract: Identity,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            chain_id,
            verifying_contract,
        }
    }

    /// Check every field is set
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidDomain("name is empty".into()));
        }
        if self.version.trim().is_empty() {
            return Err(CoreError::InvalidDomain("version is empty".into()));
        }
        if self.chain_id == 0 {
            return Err(CoreError::InvalidDomain("chain id is zero".into()));
        }
        if self.verifying_contract.is_zero() {
            return Err(CoreError::InvalidDomain("verifying contract is zero".into()));
        }
        Ok(())
    }

    /// EIP-712 domain separator
    pub fn separator(&self) -> Hash {
        let type_hash = keccak_hash(&[DOMAIN_TYPE]);
        let name_hash = keccak_hash(&[self.name.as_bytes()]);
        let version_hash = keccak_hash(&[self.version.as_bytes()]);
        let chain_id = u256_word(&U256::from(self.chain_id));

        keccak_hash(&[
            &type_hash,
            &name_hash,
            &version_hash,
            &chain_id,
            &self.verifying_contract.to_word(),
        ])
    }
}

/// Single-use intent nonce (uint256)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Nonce(U256);

impl Nonce {
    pub const fn new(value: U256) -> Self {
        Self(value)
    }

    pub fn from_dec_str(s: &str) -> Result<Self> {
        parse_u256(s)
            .map(Self)
            .map_err(|_| CoreError::Malformed(format!("nonce: {}", s)))
    }

    pub fn value(&self) -> U256 {
        self.0
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        u256_word(&self.0)
    }
}

impl From<u64> for Nonce {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", self.0)
    }
}

impl FromStr for Nonce {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_dec_str(s)
    }
}

impl Serialize for Nonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Nonce {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_dec_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A signed, time-bounded request to claim a reward
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimIntent {
    /// Identity that receives the reward and must sign the intent
    pub recipient: Identity,
    /// Amount listed for the recipient
    pub amount: Amount,
    /// Single-use nonce
    pub nonce: Nonce,
    /// Absolute expiry, unix seconds
    pub deadline: u64,
}

impl ClaimIntent {
    pub fn new(recipient: Identity, amount: Amount, nonce: Nonce, deadline: u64) -> Self {
        Self {
            recipient,
            amount,
            nonce,
            deadline,
        }
    }

    /// Reject intents that can never be valid
    pub fn validate_shape(&self) -> Result<()> {
        if self.recipient.is_zero() {
            return Err(CoreError::Malformed("recipient is the zero identity".into()));
        }
        if self.amount.is_zero() {
            return Err(CoreError::Malformed("amount is zero".into()));
        }
        Ok(())
    }

    /// `true` once `now` (unix seconds) is past the deadline
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.deadline
    }

    /// EIP-712 struct hash
    pub fn struct_hash(&self) -> Hash {
        let type_hash = keccak_hash(&[CLAIM_TYPE]);
        let deadline = u256_word(&U256::from(self.deadline));

        keccak_hash(&[
            &type_hash,
            &self.recipient.to_word(),
            &self.amount.to_be_bytes(),
            &self.nonce.to_be_bytes(),
            &deadline,
        ])
    }

    /// Digest the claimant signs: `keccak256(0x1901 || separator || struct_hash)`
    pub fn signing_digest(&self, domain: &ClaimDomain) -> Hash {
        keccak_hash(&[b"\x19\x01", &domain.separator(), &self.struct_hash()])
    }
}
