//! Per-agent briefing: attested documents plus narrative text

use parley_crypto::KeyStore;
use serde_json::Value;

use crate::record::{payloads_json, AttestedDocument};
use crate::{AttestError, Result};

/// What a briefing file turned into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BriefingItem {
    /// Verified attested document stored at this index
    Record(usize),
    /// Narrative text only
    Narrative,
}

/// Append-only store of an agent's attested documents and narrative.
///
/// Record indices are stable; evidence expressions refer to them as `records[i]`.
#[derive(Debug, Clone, Default)]
pub struct BriefingStore {
    records: Vec<AttestedDocument>,
    narrative: String,
}

impl BriefingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify and append a document. Returns its index.
    pub fn ingest_record(&mut self, document: AttestedDocument, keystore: &KeyStore) -> Result<usize> {
        if !document.verify(keystore) {
            tracing::warn!(signer = document.signer(), "Rejected record with invalid signature");
            return Err(AttestError::Signing {
                message: format!("signature by {} does not verify", document.signer()),
            });
        }

        self.records.push(document);
        let index = self.records.len() - 1;
        tracing::debug!(index, "Record added to briefing");
        Ok(index)
    }

    /// Append narrative text, newline separated
    pub fn append_narrative(&mut self, text: &str) {
        let text = text.trim_end();
        if text.is_empty() {
            return;
        }
        if !self.narrative.is_empty() {
            self.narrative.push('\n');
        }
        self.narrative.push_str(text);
    }

    /// Ingest a briefing file by name and contents.
    ///
    /// `.json` files holding an attested document become records (and are
    /// echoed into the narrative); anything else is narrative text.
    pub fn ingest_briefing_file(
        &mut self,
        file_name: &str,
        contents: &[u8],
        keystore: &KeyStore,
    ) -> Result<BriefingItem> {
        let text = String::from_utf8_lossy(contents);

        if file_name.to_lowercase().ends_with(".json") {
            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                let pretty = serde_json::to_string_pretty(&value).unwrap_or_else(|_| text.to_string());

                if let Ok(document) = serde_json::from_value::<AttestedDocument>(value) {
                    let index = self.ingest_record(document, keystore)?;
                    self.append_narrative(&format!("File: {}\n{}", file_name, pretty));
                    return Ok(BriefingItem::Record(index));
                }

                self.append_narrative(&format!("File: {}\n{}", file_name, pretty));
                return Ok(BriefingItem::Narrative);
            }
        }

        self.append_narrative(&format!("File: {}\n{}", file_name, text));
        Ok(BriefingItem::Narrative)
    }

    pub fn records(&self) -> &[AttestedDocument] {
        &self.records
    }

    pub fn record(&self, index: usize) -> Option<&AttestedDocument> {
        self.records.get(index)
    }

    pub fn narrative(&self) -> &str {
        &self.narrative
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record payloads as a JSON array; position `i` is `records[i]`
    pub fn records_json(&self) -> Value {
        payloads_json(&self.records)
    }
}
