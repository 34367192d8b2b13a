//! Optional escalation of evidence to a remote proof service
//!
//! The service receives the evidence artifact text together with the
//! speaker's attested records and answers with a proof bundle. Every
//! failure here is recoverable: callers fall back to the local artifact.

use std::time::Duration;

use async_trait::async_trait;
use parley_attest::AttestedDocument;
use parley_evidence::EvidenceArtifact;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_ESCALATION_ENDPOINT: &str = "http://localhost:8080/api/process";
pub const DEFAULT_ESCALATION_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum EscalationFailure {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Proof service timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Proof service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed proof service response: {0}")]
    MalformedResponse(String),

    #[error("Escalation already attempted for this session")]
    AlreadyEscalated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl EscalationConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            timeout_secs: DEFAULT_ESCALATION_TIMEOUT_SECS,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// `PARLEY_ESCALATION_ENDPOINT` enables escalation; the key is optional
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("PARLEY_ESCALATION_ENDPOINT").ok()?;
        let mut config = Self::new(endpoint);
        config.api_key = std::env::var("PARLEY_ESCALATION_API_KEY").ok();
        if let Some(secs) = std::env::var("PARLEY_ESCALATION_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.timeout_secs = secs;
        }
        Some(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ESCALATION_ENDPOINT)
    }
}

fn default_endpoint() -> String {
    DEFAULT_ESCALATION_ENDPOINT.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_ESCALATION_TIMEOUT_SECS
}

/// Proof service reply. Absent fields deserialize as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProofBundle {
    #[serde(default)]
    pub proof: String,
    #[serde(default)]
    pub verification_key: String,
    #[serde(default)]
    pub public_values: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Outcome of [`ProofBundle::check_locally`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProofCheck {
    /// Well-formed bundle. Says nothing about cryptographic validity.
    StructurallyValid {
        conditions_verified: bool,
        signatures_verified: Option<u64>,
        public_keys: usize,
    },
    Malformed { reason: String },
}

impl ProofBundle {
    fn public_values_json(&self) -> Option<Value> {
        serde_json::from_str::<Value>(&self.public_values)
            .ok()
            .filter(Value::is_object)
    }

    /// Service-provided summary, else one derived from the public values
    pub fn summary(&self) -> Option<String> {
        if let Some(summary) = self.summary.as_ref().filter(|s| !s.trim().is_empty()) {
            return Some(summary.clone());
        }

        let values = self.public_values_json()?;
        let conditions_verified = values
            .get("conditions_verified")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let signatures = signatures_verified(&values)
            .map(|n| n.to_string())
            .or_else(|| {
                values
                    .get("signature_verified")
                    .and_then(Value::as_bool)
                    .map(|b| b.to_string())
            })
            .unwrap_or_else(|| "false".to_string());
        let public_keys = public_key_count(&values);
        let conditions = match values.get("conditions") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "None".to_string(),
        };

        Some(format!(
            "Verification Results:\n- Conditions Verified: {}\n- Signatures Verified: {}\n- Number of Public Keys: {}\n- Conditions Checked:\n{}",
            conditions_verified, signatures, public_keys, conditions
        ))
    }

    /// Structural checks only: hex proof and key, JSON object public values
    pub fn check_locally(&self) -> ProofCheck {
        let malformed = |reason: &str| ProofCheck::Malformed {
            reason: reason.to_string(),
        };

        if self.proof.is_empty() || hex::decode(self.proof.trim_start_matches("0x")).is_err() {
            return malformed("proof is not hex");
        }
        if self.verification_key.is_empty()
            || hex::decode(self.verification_key.trim_start_matches("0x")).is_err()
        {
            return malformed("verification key is not hex");
        }
        let Some(values) = self.public_values_json() else {
            return malformed("public values are not a JSON object");
        };

        ProofCheck::StructurallyValid {
            conditions_verified: values
                .get("conditions_verified")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            signatures_verified: signatures_verified(&values),
            public_keys: public_key_count(&values),
        }
    }
}

fn signatures_verified(values: &Value) -> Option<u64> {
    values.get("num_signatures_verified").and_then(Value::as_u64)
}

fn public_key_count(values: &Value) -> usize {
    values
        .get("public_keys")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

/// Remote proof generation seam
#[async_trait]
pub trait ProofService: Send + Sync {
    async fn escalate(
        &self,
        artifact: &EvidenceArtifact,
        records: &[AttestedDocument],
    ) -> Result<ProofBundle, EscalationFailure>;
}

#[derive(Serialize)]
struct EscalationRequest<'a> {
    verification_file: String,
    records: &'a [AttestedDocument],
}

/// HTTP client for the proof service
pub struct RemoteAttestationClient {
    config: EscalationConfig,
    client: reqwest::Client,
}

impl RemoteAttestationClient {
    pub fn new(config: EscalationConfig) -> Result<Self, EscalationFailure> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| EscalationFailure::Network(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    fn map_error(&self, e: reqwest::Error) -> EscalationFailure {
        if e.is_timeout() {
            EscalationFailure::Timeout {
                seconds: self.config.timeout_secs,
            }
        } else {
            EscalationFailure::Network(e.to_string())
        }
    }
}

#[async_trait]
impl ProofService for RemoteAttestationClient {
    async fn escalate(
        &self,
        artifact: &EvidenceArtifact,
        records: &[AttestedDocument],
    ) -> Result<ProofBundle, EscalationFailure> {
        let body = EscalationRequest {
            verification_file: artifact.to_text(),
            records,
        };

        tracing::info!(
            endpoint = %self.config.endpoint,
            expressions = artifact.len(),
            records = records.len(),
            "Escalating evidence"
        );

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EscalationFailure::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await.map_err(|e| self.map_error(e))?;
        serde_json::from_str::<ProofBundle>(&text)
            .map_err(|e| EscalationFailure::MalformedResponse(e.to_string()))
    }
}
