//! Application context shared by the negotiation runtime

use std::sync::Arc;

use parley_attest::DocumentAttestor;
use parley_crypto::KeyStore;
use parley_evidence::ClaimVerifier;
use parley_llm::LLMRouter;

use crate::config::NegotiationConfig;
use crate::escalation::ProofService;

/// Long-lived collaborators, built once at process start
#[derive(Clone)]
pub struct AppContext {
    pub oracle: Arc<LLMRouter>,
    pub keystore: Arc<KeyStore>,
    pub proof_service: Option<Arc<dyn ProofService>>,
    pub config: NegotiationConfig,
}

impl AppContext {
    pub fn new(oracle: Arc<LLMRouter>, keystore: Arc<KeyStore>) -> Self {
        Self {
            oracle,
            keystore,
            proof_service: None,
            config: NegotiationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: NegotiationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_proof_service(mut self, service: Arc<dyn ProofService>) -> Self {
        self.proof_service = Some(service);
        self
    }

    pub fn attestor(&self) -> DocumentAttestor {
        DocumentAttestor::new(self.keystore.clone(), self.oracle.clone())
    }

    pub fn verifier(&self) -> ClaimVerifier {
        ClaimVerifier::new(self.oracle.clone())
    }
}
