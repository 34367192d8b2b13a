//! Document attestation: extract, resolve signer, sign

use std::sync::Arc;

use chrono::Utc;
use parley_crypto::{CryptoError, KeyStore};
use parley_llm::{CompletionRequest, LLMRouter, Message};
use serde_json::Value;

use crate::record::{digest_payload, AttestedDocument, AttestedRecord, Payload};
use crate::{AttestError, Result};

const EXTRACTION_PROMPT: &str = r#"You extract structured information from documents into one clean, valid JSON object.

STRICT OUTPUT FORMAT RULES:
1. Return ONLY raw JSON: no markdown, no code fences, no explanations
2. Use double quotes for all keys and string values
3. No trailing commas and no comments
4. Booleans are true or false, null is null (lowercase)
5. Numbers are never quoted

CONTENT EXTRACTION RULES:
1. Analyze the COMPLETE document text
2. Extract key information such as, but not limited to:
   - Names of parties involved (use "party_name" or a "sender" object with "name")
   - Dates in ISO format (YYYY-MM-DD)
   - Monetary values as bare numbers without currency symbols
   - Property details, document type, conditions and terms
3. Use descriptive snake_case for all keys
4. Structure data hierarchically"#;

/// Payload locations checked, in order, for a signer name
const SIGNER_FIELDS: &[&[&str]] = &[
    &["sender", "name"],
    &["party_name"],
    &["sender_name"],
    &["from", "name"],
];

/// Turns document text into signed records
pub struct DocumentAttestor {
    keystore: Arc<KeyStore>,
    oracle: Arc<LLMRouter>,
}

impl DocumentAttestor {
    pub fn new(keystore: Arc<KeyStore>, oracle: Arc<LLMRouter>) -> Self {
        Self { keystore, oracle }
    }

    pub fn keystore(&self) -> &Arc<KeyStore> {
        &self.keystore
    }

    /// Ask the oracle for a structured payload.
    ///
    /// The first balanced `{...}` span of the reply is parsed; anything else
    /// is [`AttestError::MalformedExtraction`].
    pub async fn extract(&self, raw_text: &str) -> Result<Payload> {
        let request = CompletionRequest::new(vec![Message::user(format!(
            "Extract ALL important information from this document into a clean JSON object:\n\n{}",
            raw_text
        ))])
        .with_system(EXTRACTION_PROMPT)
        .with_temperature(0.0)
        .with_json_mode();

        let reply = self.oracle.complete_text(request).await?;
        parse_payload(&reply).map_err(|e| {
            tracing::warn!(error = %e, "Extraction rejected");
            e
        })
    }

    /// Sign a payload with the named signer
    pub fn sign(&self, payload: Payload, signer_name: &str) -> Result<AttestedRecord> {
        let digest = digest_payload(&payload);
        let signature = self.keystore.sign(signer_name, &digest).map_err(|e| match e {
            CryptoError::UnknownSigner { name } => AttestError::Signing {
                message: format!("unknown signer {}", name),
            },
            other => AttestError::Signing {
                message: other.to_string(),
            },
        })?;

        tracing::info!(signer = signer_name, fields = payload.len(), "Payload signed");

        Ok(AttestedRecord {
            payload,
            signature,
            signer: signer_name.to_string(),
            signed_at: Utc::now(),
        })
    }

    /// True only if the signature matches the current payload exactly
    pub fn verify(&self, record: &AttestedRecord) -> bool {
        record.verify(&self.keystore)
    }

    /// Pick a signer when none is explicit: a name in the triggering message,
    /// else a known name in the payload, else a uniform random signer.
    pub fn resolve_signer(&self, trigger_message: Option<&str>, payload: &Payload) -> Result<String> {
        let known = self.keystore.list_signers();

        if let Some(name) = trigger_message.and_then(|m| mentioned_signer(m, &known)) {
            tracing::debug!(signer = %name, "Signer taken from triggering message");
            return Ok(name);
        }

        if let Some(name) = payload_signer(payload, &known) {
            tracing::debug!(signer = %name, "Signer taken from payload");
            return Ok(name);
        }

        self.keystore
            .pick_random_signer()
            .ok_or(AttestError::NoSignerAvailable)
    }

    /// Extract, resolve a signer (unless `explicit_signer` is given) and sign
    pub async fn attest(
        &self,
        raw_text: &str,
        trigger_message: Option<&str>,
        explicit_signer: Option<&str>,
    ) -> Result<AttestedDocument> {
        let payload = self.extract(raw_text).await?;

        let signer = match explicit_signer {
            Some(name) => name.to_string(),
            None => self.resolve_signer(trigger_message, &payload)?,
        };

        let record = self.sign(payload, &signer)?;
        Ok(AttestedDocument::new(record, raw_text.chars().count()))
    }
}

/// Parse the first balanced JSON object in `reply`
pub fn parse_payload(reply: &str) -> Result<Payload> {
    let span = first_balanced_object(reply).ok_or_else(|| AttestError::MalformedExtraction {
        message: "no JSON object found in oracle reply".to_string(),
    })?;

    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AttestError::MalformedExtraction {
            message: "extracted value is not an object".to_string(),
        }),
        Err(e) => Err(AttestError::MalformedExtraction {
            message: e.to_string(),
        }),
    }
}

/// Locate the first balanced `{...}` span, ignoring braces inside strings
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Longest known signer name mentioned (case-insensitively) in `message`
fn mentioned_signer(message: &str, known: &[String]) -> Option<String> {
    let lowered = message.to_lowercase();
    known
        .iter()
        .filter(|name| !name.is_empty() && lowered.contains(&name.to_lowercase()))
        .max_by_key(|name| name.len())
        .cloned()
}

fn payload_signer(payload: &Payload, known: &[String]) -> Option<String> {
    SIGNER_FIELDS.iter().find_map(|path| {
        let (first, rest) = path.split_first()?;
        let mut value = payload.get(*first)?;
        for segment in rest {
            value = value.get(*segment)?;
        }
        let candidate = value.as_str()?.trim();
        known
            .iter()
            .find(|name| name.eq_ignore_ascii_case(candidate))
            .cloned()
    })
}
