use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// BLAKE3 digest over the canonical (bincode) encoding of a trust object.
///
/// Two objects at the same key conflict exactly when their digests differ,
/// so the digest is what conflict diagnostics and the CLI print.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Hash a canonical encoding, domain-separated by object kind.
    pub fn compute(domain: &str, canonical: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"trustdb-v1:");
        hasher.update(domain.as_bytes());
        hasher.update(b":");
        hasher.update(canonical);
        Self(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Canonical encoding used for digests.
pub(crate) fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, TypeError> {
    bincode::serialize(value).map_err(|e| TypeError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_separates_identical_bytes() {
        let a = Digest::compute("trc", b"payload");
        let b = Digest::compute("chain", b"payload");
        assert_ne!(a, b);
    }

    #[test]
    fn display_is_full_hex() {
        let d = Digest::compute("trc", b"x");
        assert_eq!(d.to_string().len(), 64);
        assert_eq!(d.short_hex().len(), 8);
    }
}
