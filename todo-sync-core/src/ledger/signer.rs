//! Request signing for ledger writes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signer as _, SigningKey, SECRET_KEY_LENGTH};
use serde::Serialize;

use crate::error::{Result, TodoError};

/// Signature attached to a ledger write.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestSignature {
    pub signature: String,
    pub public_key: String,
}

/// An ed25519 signing credential.
#[derive(Clone)]
pub struct Signer(SigningKey);

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Signer").field(&self.public_key_hex()).finish()
    }
}

impl Signer {
    /// Parses a 32-byte seed given as hex, with or without a `0x` prefix.
    pub fn from_hex(key: &str) -> Result<Self> {
        let trimmed = key.trim();
        let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(hex_part)
            .map_err(|_| TodoError::Auth("private key is not valid hex".into()))?;
        let seed: [u8; SECRET_KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            TodoError::Auth(format!(
                "private key must be {} bytes, got {}",
                SECRET_KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(SigningKey::from_bytes(&seed)))
    }

    pub fn public_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0.verifying_key().to_bytes()))
    }

    pub fn sign(&self, message: &[u8]) -> RequestSignature {
        let signature = self.0.sign(message);
        RequestSignature {
            signature: STANDARD.encode(signature.to_bytes()),
            public_key: STANDARD.encode(self.0.verifying_key().to_bytes()),
        }
    }
}
