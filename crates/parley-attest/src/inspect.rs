//! Verification and inspection of serialized attested documents

use parley_crypto::{canonical_json, KeyStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::AttestedDocument;

/// Result of verifying a serialized document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordVerification {
    pub valid: bool,
    pub signer: String,
    pub errors: Vec<String>,
}

/// Verify a document from JSON text
pub fn verify_wire(json: &str, keystore: &KeyStore) -> RecordVerification {
    match serde_json::from_str::<AttestedDocument>(json) {
        Ok(document) => {
            let mut errors = vec![];

            if keystore.get_public(document.signer()).is_none() {
                errors.push(format!("Unknown signer: {}", document.signer()));
            } else if !document.verify(keystore) {
                errors.push("Signature does not match payload".to_string());
            }

            RecordVerification {
                valid: errors.is_empty(),
                signer: document.signer().to_string(),
                errors,
            }
        }
        Err(e) => RecordVerification {
            valid: false,
            signer: "unknown".to_string(),
            errors: vec![format!("Failed to parse record: {}", e)],
        },
    }
}

/// Inspection details for a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordInspection {
    pub signer: String,
    pub signer_public_key: Option<String>,
    pub signature_valid: bool,
    pub signed_at: String,
    pub processed_at: String,
    pub document_text_length: usize,
    /// Canonical serialization the signature covers
    pub canonical_payload: String,
    pub fields: Vec<String>,
}

/// Inspect a document from JSON text
pub fn inspect_wire(json: &str, keystore: &KeyStore) -> Result<RecordInspection, serde_json::Error> {
    let document: AttestedDocument = serde_json::from_str(json)?;
    let record = document.record();

    Ok(RecordInspection {
        signer: record.signer.clone(),
        signer_public_key: keystore.get_public(&record.signer).map(|k| k.key),
        signature_valid: document.verify(keystore),
        signed_at: record.signed_at.to_rfc3339(),
        processed_at: document.processed_at.to_rfc3339(),
        document_text_length: document.document_text_length,
        canonical_payload: canonical_json(&Value::Object(record.payload.clone())),
        fields: record.payload.keys().cloned().collect(),
    })
}
