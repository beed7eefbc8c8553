//! C4 content identifier.
//!
//! A `ContentId` is a 90 character string: the literal prefix `c4`
//! followed by the base58 encoding of a SHA-512 digest, left padded
//! with `'1'` to 88 characters.

use serde::{Deserialize, Serialize};

/// Total length of an identifier, prefix included
pub const ID_LENGTH: usize = 90;

/// Literal prefix of every identifier
pub const ID_PREFIX: &str = "c4";

/// Base58 alphabet used by C4 (no `0`, `O`, `I` or `l`)
pub const ALPHABET: &[u8; 58] = b"123456789abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ";

/// Content identifier derived from a resource's bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Build an identifier from a 64-byte SHA-512 digest
    pub fn from_digest(digest: &[u8; 64]) -> Self {
        let encoded = base58(digest);
        let width = ID_LENGTH - ID_PREFIX.len();

        let mut id = String::with_capacity(ID_LENGTH);
        id.push_str(ID_PREFIX);
        for _ in encoded.len()..width {
            id.push('1');
        }
        id.push_str(&encoded);
        Self(id)
    }

    /// Wrap an identifier read back from storage without validation
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Parse and validate an identifier string
    pub fn parse(raw: &str) -> Option<Self> {
        let body = raw.strip_prefix(ID_PREFIX)?;
        if raw.len() != ID_LENGTH || !body.bytes().all(|b| ALPHABET.contains(&b)) {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    /// Get the raw string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Encode bytes as a big-endian unsigned integer in base58, most
/// significant digit first. A zero value encodes as a single `'1'`.
fn base58(bytes: &[u8]) -> String {
    // Little-endian base58 digits of the running value
    let mut digits: Vec<u8> = vec![0];

    for &byte in bytes {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            carry += (*digit as u32) << 8;
            *digit = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    digits
        .iter()
        .rev()
        .map(|&d| ALPHABET[d as usize] as char)
        .collect()
}
