//! Hash functions for Dropclaim
//!
//! Every digest in the system is keccak256: eligibility leaves, internal
//! Merkle nodes, EIP-712 typed-message hashes and identity derivation.
//! Swapping the hash function invalidates every published root, so it is
//! fixed here and nowhere else.

use sha3::{Digest, Keccak256};

use crate::types::{CoreError, Result};

/// Hash output size in bytes
pub const HASH_SIZE: usize = 32;

/// A 32-byte hash output
pub type Hash = [u8; HASH_SIZE];

/// Zero hash (32 zero bytes)
pub const ZERO_HASH: Hash = [0u8; HASH_SIZE];

/// Hash arbitrary inputs with keccak256
///
/// Concatenates all inputs and returns the hash.
///
/// # Example
/// ```rust
/// use dropclaim_core::hash::keccak_hash;
///
/// let hash = keccak_hash(&[b"domain", &[1, 2, 3]]);
/// assert_eq!(hash.len(), 32);
/// ```
pub fn keccak_hash(inputs: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for input in inputs {
        hasher.update(input);
    }
    hasher.finalize().into()
}

/// Hash a single byte string
#[inline]
pub fn hash_bytes(data: &[u8]) -> Hash {
    Keccak256::digest(data).into()
}

/// Encode a hash as `0x`-prefixed lowercase hex
pub fn to_hex(hash: &Hash) -> String {
    format!("0x{}", hex::encode(hash))
}

/// Parse a 32-byte hash from hex (the `0x` prefix is optional)
pub fn hash_from_hex(s: &str) -> Result<Hash> {
    let raw = s.trim();
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(raw).map_err(|e| CoreError::Malformed(format!("hash: {}", e)))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| CoreError::Malformed(format!("hash must be 32 bytes, got {}", b.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_hash() {
        // keccak256("") is a well known constant
        let hash = keccak_hash(&[]);
        assert_eq!(
            hex::encode(hash),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_hash_deterministic() {
        let hash1 = keccak_hash(&[b"hello", b"world"]);
        let hash2 = keccak_hash(&[b"hello", b"world"]);
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_concatenation_matches_single_input() {
        assert_eq!(keccak_hash(&[b"hello", b"world"]), hash_bytes(b"helloworld"));
    }

    #[test]
    fn test_hex_roundtrip() {
        let hash = hash_bytes(b"root");
        let encoded = to_hex(&hash);
        assert!(encoded.starts_with("0x"));
        assert_eq!(hash_from_hex(&encoded).unwrap(), hash);
        assert_eq!(hash_from_hex(&encoded[2..]).unwrap(), hash);
    }

    #[test]
    fn test_hash_from_hex_wrong_length() {
        assert!(matches!(hash_from_hex("0xdeadbeef"), Err(CoreError::Malformed(_))));
        assert!(matches!(hash_from_hex("0xzz"), Err(CoreError::Malformed(_))));
    }
}
