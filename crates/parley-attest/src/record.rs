//! Attested records and their wire shape

use chrono::{DateTime, Utc};
use parley_crypto::{canonical_digest, verify_signature, KeyStore, PublicKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured document payload: field name to value, in extraction order
pub type Payload = Map<String, Value>;

/// A payload bound to a named signer's signature.
///
/// The signature covers the SHA-256 digest of the canonical payload bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestedRecord {
    #[serde(rename = "data")]
    pub payload: Payload,
    /// Hex-encoded signature
    pub signature: String,
    /// Signer name, resolved against a [`KeyStore`]
    pub signer: String,
    #[serde(with = "timestamp")]
    pub signed_at: DateTime<Utc>,
}

impl AttestedRecord {
    /// Bytes the signature covers
    pub fn signing_digest(&self) -> [u8; 32] {
        digest_payload(&self.payload)
    }

    /// Verify against an explicit public key
    pub fn verify_with(&self, public_key: &PublicKey) -> bool {
        verify_signature(public_key, &self.signing_digest(), &self.signature)
    }

    /// Verify against the signer's key in `keystore`. Unknown signers fail.
    pub fn verify(&self, keystore: &KeyStore) -> bool {
        match keystore.get_public(&self.signer) {
            Some(public_key) => self.verify_with(&public_key),
            None => {
                tracing::debug!(signer = %self.signer, "Verification against unknown signer");
                false
            }
        }
    }
}

pub(crate) fn digest_payload(payload: &Payload) -> [u8; 32] {
    canonical_digest(&Value::Object(payload.clone()))
}

/// Payloads as a JSON array; position `i` is `records[i]`
pub fn payloads_json(records: &[AttestedDocument]) -> Value {
    Value::Array(
        records
            .iter()
            .map(|record| Value::Object(record.payload().clone()))
            .collect(),
    )
}

/// Wire shape of an attested document:
/// `{processed_at, document_text_length, signed_data: {data, signature, signer, signed_at}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestedDocument {
    #[serde(with = "timestamp")]
    pub processed_at: DateTime<Utc>,
    pub document_text_length: usize,
    pub signed_data: AttestedRecord,
}

impl AttestedDocument {
    pub fn new(record: AttestedRecord, document_text_length: usize) -> Self {
        Self {
            processed_at: Utc::now(),
            document_text_length,
            signed_data: record,
        }
    }

    pub fn record(&self) -> &AttestedRecord {
        &self.signed_data
    }

    pub fn signer(&self) -> &str {
        &self.signed_data.signer
    }

    pub fn payload(&self) -> &Payload {
        &self.signed_data.payload
    }

    pub fn verify(&self, keystore: &KeyStore) -> bool {
        self.signed_data.verify(keystore)
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// ISO-8601 timestamps. Accepts offset-less timestamps (read as UTC) on input.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}
