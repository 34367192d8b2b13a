//! Parley Attest - signed records from document text
//!
//! Documents enter as raw text. The [`DocumentAttestor`] asks the oracle for
//! a structured payload, resolves a signer and signs the canonical payload
//! bytes through the [`parley_crypto::KeyStore`]. The resulting
//! [`AttestedDocument`]s accumulate per agent in a [`BriefingStore`].
//!
//! Records are immutable: any change to a payload invalidates its signature.

pub mod attestor;
pub mod briefing;
pub mod inspect;
pub mod record;

pub use attestor::*;
pub use briefing::*;
pub use inspect::*;
pub use record::*;

use thiserror::Error;

/// Attestation errors. Each aborts processing of one document only.
#[derive(Debug, Error)]
pub enum AttestError {
    #[error("Malformed extraction: {message}")]
    MalformedExtraction { message: String },

    #[error("Signing failed: {message}")]
    Signing { message: String },

    #[error("No signer available")]
    NoSignerAvailable,

    #[error("Oracle error: {0}")]
    Oracle(#[from] parley_llm::LLMError),
}

pub type Result<T> = std::result::Result<T, AttestError>;
