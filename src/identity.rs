// src/identity.rs

use crate::error::ServerError;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Digest of the node public key; tags this node on the wider network.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIdentifier([u8; 32]);

impl NodeIdentifier {
    pub const LEN: usize = 32;

    pub fn from_public_key(public_key: &[u8]) -> Self {
        let digest = Sha256::digest(public_key);
        let mut out = [0u8; Self::LEN];
        out.copy_from_slice(&digest);
        NodeIdentifier(out)
    }

    /// Parse a hex public key (as found in `[node] public_key`) and digest it.
    pub fn from_public_key_hex(hex: &str) -> Result<Self, ServerError> {
        let trimmed = hex.trim();
        if trimmed.is_empty() {
            return Err(ServerError::config("node.public_key is empty"));
        }
        let bytes = base16ct::mixed::decode_vec(trimmed)
            .map_err(|e| ServerError::config(format!("node.public_key is not valid hex: {}", e)))?;
        Ok(Self::from_public_key(&bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        base16ct::lower::encode_string(&self.0)
    }

    /// First 8 hex chars, for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeIdentifier({})", self.short())
    }
}

impl Serialize for NodeIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_identifier() {
        let a = NodeIdentifier::from_public_key_hex("02deadbeef").unwrap();
        let b = NodeIdentifier::from_public_key_hex("02DEADBEEF").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_bytes().len(), NodeIdentifier::LEN);
    }

    #[test]
    fn known_digest() {
        // sha256("abc")
        let id = NodeIdentifier::from_public_key(b"abc");
        assert_eq!(
            id.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(id.short(), "ba7816bf");
    }

    #[test]
    fn malformed_hex_is_a_configuration_error() {
        assert!(NodeIdentifier::from_public_key_hex("xyz").unwrap_err().is_configuration());
        assert!(NodeIdentifier::from_public_key_hex("  ").unwrap_err().is_configuration());
    }
}
