//! Parley Negotiation - two-party sessions with attested evidence
//!
//! The [`NegotiationCoordinator`] owns sessions and agents. Each session
//! moves `NotStarted -> Active -> Completed`; a coin flip picks the first
//! speaker. Every inbound turn from a participant triggers one oracle reply
//! for the counterpart, built from a bounded context window plus that
//! agent's persona and briefing. Replies are checked by the
//! [`parley_evidence::ClaimVerifier`] against the speaker's records and
//! carry the resulting evidence artifact. Evidence may be escalated to a
//! remote [`ProofService`] at most once per session.
//!
//! Sessions are serialized individually; the reply delay and oracle calls
//! of one session never hold up another.

pub mod agent;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod escalation;
pub mod ids;
pub mod persona;
pub mod session;
pub mod trace;
pub mod window;

pub use agent::AgentState;
pub use config::NegotiationConfig;
pub use context::AppContext;
pub use coordinator::{NegotiationCoordinator, StartOutcome, TurnOutcome};
pub use escalation::{
    EscalationConfig, EscalationFailure, ProofBundle, ProofCheck, ProofService,
    RemoteAttestationClient,
};
pub use ids::{AgentId, SessionId};
pub use persona::{coin_flip_announcement, Persona, KICKOFF_INSTRUCTION};
pub use session::{ConversationTurn, Session, SessionState};
pub use trace::{SessionTrace, TraceEvent, TraceStage};
pub use window::{ContextWindow, EntryRole, WindowEntry};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("Session {session_id} already started")]
    AlreadyStarted { session_id: SessionId },

    #[error("Invalid participants: {message}")]
    InvalidParticipants { message: String },

    #[error("Unknown session: {session_id}")]
    UnknownSession { session_id: SessionId },

    #[error("Unknown agent: {agent_id}")]
    UnknownAgent { agent_id: AgentId },

    #[error("Session {session_id} is {state:?}, not active")]
    NotActive {
        session_id: SessionId,
        state: SessionState,
    },

    /// Off-protocol sender or out-of-order call. Senders are ignored, not reported.
    #[error("Protocol violation: {message}")]
    ProtocolViolation { message: String },

    #[error("Oracle error: {0}")]
    Oracle(#[from] parley_llm::LLMError),

    #[error("Briefing error: {0}")]
    Briefing(#[from] parley_attest::AttestError),
}

pub type Result<T> = std::result::Result<T, NegotiationError>;
