//! Digital signatures for attested records

use crate::{CryptoError, CryptoResult, KeyPair, PublicKey};
use ed25519_dalek::{Signature, Signer, Verifier};

/// Length of an Ed25519 signature in bytes
pub const SIGNATURE_LEN: usize = 64;

/// Sign a message, returning the hex-encoded signature
pub(crate) fn sign_message(keypair: &KeyPair, message: &[u8]) -> CryptoResult<String> {
    let signature = keypair
        .signing_key()
        .try_sign(message)
        .map_err(|e| CryptoError::Signing(e.to_string()))?;

    Ok(hex::encode(signature.to_bytes()))
}

/// Verify a hex-encoded signature over `message`.
///
/// Any decoding problem (bad hex, wrong length, malformed key) counts as a
/// failed verification rather than an error.
pub fn verify_signature(public_key: &PublicKey, message: &[u8], signature_hex: &str) -> bool {
    let Ok(verifying_key) = public_key.to_verifying_key() else {
        return false;
    };

    let Ok(bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(sig_array) = <[u8; SIGNATURE_LEN]>::try_from(bytes.as_slice()) else {
        return false;
    };

    let signature = Signature::from_bytes(&sig_array);
    verifying_key.verify(message, &signature).is_ok()
}
