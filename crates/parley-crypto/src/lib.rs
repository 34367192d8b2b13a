//! Parley Crypto - signer identities and signatures for attested records
//!
//! This crate provides:
//! - Ed25519 key pairs and public-key references
//! - Digest signing and verification
//! - SHA-256 hashing and canonical JSON serialization
//! - The file-backed [`KeyStore`] that owns every private key
//!
//! # Security Invariant
//!
//! **Private keys never leave the KeyStore.** Callers sign through
//! [`KeyStore::sign`]; only this crate can read private key bytes.

pub mod hash;
pub mod keys;
pub mod keystore;
pub mod signature;

pub use hash::*;
pub use keys::*;
pub use keystore::*;
pub use signature::*;

use thiserror::Error;

/// Cryptographic and key-storage errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Signer name already exists: {name}")]
    DuplicateName { name: String },

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Unknown signer: {name}")]
    UnknownSigner { name: String },

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Key store corrupted at {path}: {message}")]
    StoreCorrupted { path: String, message: String },

    #[error("Key store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
