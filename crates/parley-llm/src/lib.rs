//! Parley LLM - the language-model oracle
//!
//! Every component that needs generated text (document extraction, claim
//! verification, negotiation replies) goes through one [`LLMRouter`]. The
//! router owns a single provider and bounds every call with a finite timeout.
//!
//! ## Model Providers
//! - Mistral (default, `mistral-large-latest`)
//! - OpenAI-compatible: any `/chat/completions` server (OpenAI, vLLM, llama.cpp, Ollama)
//!
//! ## Offline Providers
//! - Deterministic: fixed reply when no model is configured
//! - Scripted: canned replies for tests and demos
//!
//! The oracle is untrusted: callers validate everything it returns.

pub mod providers;
pub mod router;
pub mod scripted;
pub mod types;

pub use providers::*;
pub use router::*;
pub use scripted::*;
pub use types::*;
