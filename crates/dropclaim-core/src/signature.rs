//! secp256k1 signatures over claim intents
//!
//! Signatures travel as 65 bytes `r || s || v`. Verification recovers the
//! signer from the EIP-712 digest and compares it with the intent's
//! recipient; no stored state is consulted.

use core::fmt;
use core::str::FromStr;

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::intent::{ClaimDomain, ClaimIntent};
use crate::leaf::Identity;
use crate::types::{CoreError, Result};

/// Encoded signature length (r || s || v)
pub const SIGNATURE_LEN: usize = 65;

/// secp256k1 group order / 2, big-endian; larger `s` values are malleable
const HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D,
    0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

/// `v` as 0/1 or 27/28 -> the recovery bit
fn recovery_bit(v: u8) -> Option<u8> {
    match v {
        0 | 27 => Some(0),
        1 | 28 => Some(1),
        _ => None,
    }
}

/// Recoverable ECDSA signature (Ethereum layout)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ClaimSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// 27 or 28 (0 or 1 is also accepted)
    pub v: u8,
}

impl ClaimSignature {
    /// Parse `r || s || v`
    ///
    /// `v` may be given as 0/1 or 27/28; it is stored as 27/28.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_LEN {
            return Err(CoreError::SignatureInvalid(format!(
                "expected {} bytes, got {}",
                SIGNATURE_LEN,
                bytes.len()
            )));
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        let v = recovery_bit(bytes[64])
            .map(|bit| bit + 27)
            .ok_or_else(|| CoreError::SignatureInvalid(format!("bad recovery byte {}", bytes[64])))?;
        Ok(Self { r, s, v })
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = s.trim();
        let raw = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes = hex::decode(raw).map_err(|e| CoreError::SignatureInvalid(format!("hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        let mut out = [0u8; SIGNATURE_LEN];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    /// Reject zero scalars and high-s signatures, then build the k256 pair
    fn to_recoverable(self) -> Result<(Signature, RecoveryId)> {
        if self.r == [0u8; 32] || self.s == [0u8; 32] {
            return Err(CoreError::SignatureInvalid("zero r or s".into()));
        }
        if self.s > HALF_ORDER {
            return Err(CoreError::SignatureInvalid("non-canonical s".into()));
        }
        let recovery_id = recovery_bit(self.v)
            .and_then(RecoveryId::from_byte)
            .ok_or_else(|| CoreError::SignatureInvalid(format!("bad recovery byte {}", self.v)))?;

        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&self.r);
        rs[32..].copy_from_slice(&self.s);
        let signature = Signature::from_slice(&rs)
            .map_err(|e| CoreError::SignatureInvalid(format!("scalar out of range: {}", e)))?;

        Ok((signature, recovery_id))
    }
}

impl fmt::Display for ClaimSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for ClaimSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClaimSignature({})", self)
    }
}

impl FromStr for ClaimSignature {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for ClaimSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ClaimSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Sign an intent under a domain (claimant side)
pub fn sign_intent(intent: &ClaimIntent, domain: &ClaimDomain, key: &SigningKey) -> Result<ClaimSignature> {
    let digest = intent.signing_digest(domain);
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(&digest)
        .map_err(|e| CoreError::SignatureInvalid(format!("signing failed: {}", e)))?;

    let bytes = signature.to_bytes();
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..]);

    Ok(ClaimSignature {
        r,
        s,
        v: 27 + recovery_id.to_byte(),
    })
}

/// Recover the identity that signed `intent` under `domain`
pub fn recover_signer(intent: &ClaimIntent, domain: &ClaimDomain, signature: &ClaimSignature) -> Result<Identity> {
    let (sig, recovery_id) = signature.to_recoverable()?;
    let digest = intent.signing_digest(domain);
    let key = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
        .map_err(|_| CoreError::SignatureInvalid("public key recovery failed".into()))?;
    Ok(Identity::from_public_key(&key))
}

/// Verify that the intent was signed by its own recipient
pub fn verify_intent(intent: &ClaimIntent, domain: &ClaimDomain, signature: &ClaimSignature) -> Result<Identity> {
    let signer = recover_signer(intent, domain, signature)?;
    if signer != intent.recipient {
        return Err(CoreError::SignatureInvalid(format!(
            "signed by {}, not {}",
            signer, intent.recipient
        )));
    }
    Ok(signer)
}

/// Identity controlled by a signing key
pub fn identity_of(key: &SigningKey) -> Identity {
    Identity::from_public_key(key.verifying_key())
}
