//! Key pairs and signer identities

use crate::{CryptoError, CryptoResult};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// A key pair for signing operations
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair from the OS entropy source
    pub fn generate() -> CryptoResult<Self> {
        let mut seed = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;

        Self::from_bytes(&seed)
    }

    /// Create from existing signing key bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> CryptoResult<Self> {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();

        Ok(Self {
            signing_key,
            verifying_key,
        })
    }

    /// Parse a hex-encoded signing key as persisted by the key store
    pub(crate) fn from_hex(secret_hex: &str) -> CryptoResult<Self> {
        let bytes: [u8; 32] = hex::decode(secret_hex)
            .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyFormat("Private key must be 32 bytes".to_string()))?;

        Self::from_bytes(&bytes)
    }

    /// Get the signing key (private - never expose!)
    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Signing key bytes, hex-encoded, for key-store persistence only
    pub(crate) fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Get the verifying key (public)
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Get the public key as hex string
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.as_bytes())
    }
}

/// Public key reference (safe to share)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    /// Hex-encoded public key
    pub key: String,
    /// Key algorithm
    pub algorithm: KeyAlgorithm,
}

impl PublicKey {
    /// Create from a key pair
    pub fn from_keypair(keypair: &KeyPair) -> Self {
        Self {
            key: keypair.public_key_hex(),
            algorithm: KeyAlgorithm::Ed25519,
        }
    }

    /// Create from a hex string
    pub fn from_hex(key: impl Into<String>) -> CryptoResult<Self> {
        let public = Self {
            key: key.into(),
            algorithm: KeyAlgorithm::Ed25519,
        };
        public.to_verifying_key()?;
        Ok(public)
    }

    /// Parse the verifying key
    pub fn to_verifying_key(&self) -> CryptoResult<VerifyingKey> {
        let bytes: [u8; 32] = hex::decode(&self.key)
            .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyFormat("Public key must be 32 bytes".to_string()))?;

        VerifyingKey::from_bytes(&bytes).map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))
    }
}

/// Supported key algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum KeyAlgorithm {
    /// Ed25519 (default)
    #[default]
    Ed25519,
}

/// A named signer and its shareable public key.
///
/// The private half stays inside the [`crate::KeyStore`] that generated it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerIdentity {
    pub name: String,
    pub public_key: PublicKey,
}
