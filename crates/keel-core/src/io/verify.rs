//! Artifact integrity checks.

use keel_schema::Sha256Digest;
use sha2::{Digest, Sha256};

/// Compares artifact bytes against an expected checksum.
pub trait Verifier: Send + Sync {
    /// Checksum of `data`.
    fn digest(&self, data: &[u8]) -> Sha256Digest;

    /// Whether `data` matches `expected`.
    fn verify(&self, data: &[u8], expected: &Sha256Digest) -> bool {
        &self.digest(data) == expected
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Verifier;

impl Verifier for Sha256Verifier {
    fn digest(&self, data: &[u8]) -> Sha256Digest {
        let hash: [u8; 32] = Sha256::digest(data).into();
        Sha256Digest::from_bytes(&hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // sha256("hello")
        let expected =
            Sha256Digest::new("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
                .unwrap();
        assert_eq!(Sha256Verifier.digest(b"hello"), expected);
        assert!(Sha256Verifier.verify(b"hello", &expected));
        assert!(!Sha256Verifier.verify(b"hello!", &expected));
    }
}
