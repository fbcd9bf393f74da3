//! Content-addressed request fingerprints.

use sha2::{Digest, Sha256};
use std::fmt;

/// Deterministic digest over (method, absolute URL, body).
///
/// Identical triples always produce the same fingerprint. A missing body and
/// an empty body hash the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a request.
    pub fn compute(method: &str, url: &str, body: Option<&[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(method.as_bytes());
        hasher.update(b"\n");
        hasher.update(url.as_bytes());
        hasher.update(b"\n");
        if let Some(body) = body {
            hasher.update(body);
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The two directory levels a fingerprint is sharded under.
    pub fn shard(&self) -> (&str, &str) {
        (&self.0[0..2], &self.0[2..4])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
