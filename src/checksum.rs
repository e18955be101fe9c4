//! Checksum utilities for generated artifacts

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SHA256 checksum of artifact content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that content matches this checksum
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::from_bytes(data) == *self
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_consistency() {
        let content = br#"{"kind": "CustomResourceDefinition"}"#;
        assert_eq!(Checksum::from_bytes(content), Checksum::from_bytes(content));
    }

    #[test]
    fn test_checksum_different_content() {
        let a = Checksum::from_bytes(b"apiVersion: v1");
        let b = Checksum::from_bytes(b"apiVersion: v2");
        assert_ne!(a, b);
    }

    #[test]
    fn test_checksum_verification() {
        let checksum = Checksum::from_bytes(b"spec: {}");
        assert!(checksum.verify(b"spec: {}"));
        assert!(!checksum.verify(b"spec: []"));
        assert_eq!(checksum.as_str().len(), 64);
    }
}
