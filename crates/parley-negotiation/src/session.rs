//! Session state machine and conversation turns

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parley_evidence::EvidenceArtifact;
use serde::{Deserialize, Serialize};

use crate::escalation::{EscalationFailure, ProofBundle};
use crate::ids::{AgentId, SessionId};
use crate::persona::KICKOFF_INSTRUCTION;
use crate::trace::{SessionTrace, TraceStage};
use crate::window::{ContextWindow, EntryRole};
use crate::{NegotiationError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    NotStarted,
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: AgentId,
    pub speaker_name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Produced by the oracle rather than received from outside
    pub generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidenceArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<ProofBundle>,
}

impl ConversationTurn {
    pub fn inbound(speaker: AgentId, speaker_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            speaker,
            speaker_name: speaker_name.into(),
            content: content.into(),
            timestamp: Utc::now(),
            generated: false,
            evidence: None,
            proof: None,
        }
    }

    pub fn generated(speaker: AgentId, speaker_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            generated: true,
            ..Self::inbound(speaker, speaker_name, content)
        }
    }

    pub fn with_evidence(mut self, evidence: Option<EvidenceArtifact>) -> Self {
        self.evidence = evidence.filter(|e| !e.is_empty());
        self
    }

    pub fn with_proof(mut self, proof: Option<ProofBundle>) -> Self {
        self.proof = proof;
        self
    }

    /// `speaker (timestamp): content`
    pub fn transcript_line(&self) -> String {
        format!(
            "{} ({}): {}",
            self.speaker_name,
            self.timestamp.to_rfc3339(),
            self.content
        )
    }
}

/// One two-party negotiation
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    participants: [AgentId; 2],
    state: SessionState,
    turns: Vec<ConversationTurn>,
    first_speaker: Option<AgentId>,
    windows: HashMap<AgentId, ContextWindow>,
    escalation_attempted: bool,
    /// Generated turn not yet echoed back by the transport
    pending_delivery: Option<usize>,
    trace: SessionTrace,
}

impl Session {
    pub(crate) fn new(
        participants: [AgentId; 2],
        window_capacity: usize,
        trace_capacity: usize,
    ) -> Self {
        let id = SessionId::new();
        let windows = participants
            .iter()
            .map(|p| (*p, ContextWindow::new(window_capacity)))
            .collect();
        let mut trace = SessionTrace::new(id, trace_capacity);
        trace.record(TraceStage::Created, "Session created", None);

        Self {
            id,
            participants,
            state: SessionState::NotStarted,
            turns: Vec::new(),
            first_speaker: None,
            windows,
            escalation_attempted: false,
            pending_delivery: None,
            trace,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn participants(&self) -> [AgentId; 2] {
        self.participants
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn first_speaker(&self) -> Option<AgentId> {
        self.first_speaker
    }

    pub fn escalation_attempted(&self) -> bool {
        self.escalation_attempted
    }

    pub fn trace(&self) -> &SessionTrace {
        &self.trace
    }

    pub fn window(&self, agent: AgentId) -> Option<&ContextWindow> {
        self.windows.get(&agent)
    }

    pub fn is_participant(&self, agent: AgentId) -> bool {
        self.participants.contains(&agent)
    }

    /// The other participant
    pub fn counterpart_of(&self, agent: AgentId) -> Result<AgentId> {
        match self.participants {
            [a, b] if a == agent => Ok(b),
            [a, b] if b == agent => Ok(a),
            _ => Err(NegotiationError::ProtocolViolation {
                message: format!("{} is not a participant of {}", agent, self.id),
            }),
        }
    }

    pub fn transcript(&self) -> String {
        if self.turns.is_empty() {
            return "No conversation yet.".to_string();
        }
        self.turns
            .iter()
            .map(ConversationTurn::transcript_line)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub(crate) fn trace_mut(&mut self) -> &mut SessionTrace {
        &mut self.trace
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.state == SessionState::Active {
            Ok(())
        } else {
            Err(NegotiationError::NotActive {
                session_id: self.id,
                state: self.state,
            })
        }
    }

    /// NotStarted -> Active. Seeds the first speaker's window with the kickoff.
    pub(crate) fn begin(&mut self, first_speaker: AgentId) -> Result<()> {
        if self.state != SessionState::NotStarted {
            return Err(NegotiationError::AlreadyStarted { session_id: self.id });
        }
        if !self.is_participant(first_speaker) {
            return Err(NegotiationError::InvalidParticipants {
                message: format!("{} cannot speak first in {}", first_speaker, self.id),
            });
        }

        self.state = SessionState::Active;
        self.first_speaker = Some(first_speaker);
        if let Some(window) = self.windows.get_mut(&first_speaker) {
            window.push(EntryRole::Instruction, KICKOFF_INSTRUCTION);
        }
        Ok(())
    }

    /// Active -> Completed
    pub(crate) fn finish(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.state = SessionState::Completed;
        self.pending_delivery = None;
        Ok(())
    }

    /// Append a turn and mirror it into both context windows
    pub(crate) fn append_turn(&mut self, turn: ConversationTurn) -> Result<usize> {
        self.ensure_active()?;
        let counterpart = self.counterpart_of(turn.speaker)?;

        if let Some(window) = self.windows.get_mut(&turn.speaker) {
            window.push(EntryRole::Own, turn.content.clone());
        }
        if let Some(window) = self.windows.get_mut(&counterpart) {
            window.push(EntryRole::Counterpart, turn.content.clone());
        }

        let generated = turn.generated;
        self.turns.push(turn);
        let index = self.turns.len() - 1;
        if generated {
            self.pending_delivery = Some(index);
        }
        Ok(index)
    }

    /// Consume the pending generated turn if `content` is its echo
    pub(crate) fn take_echo(&mut self, sender: AgentId, content: &str) -> Option<usize> {
        let index = self.pending_delivery?;
        let turn = self.turns.get(index)?;
        if turn.speaker == sender && turn.content.trim() == content.trim() {
            self.pending_delivery = None;
            Some(index)
        } else {
            None
        }
    }

    /// Flip the once-per-session escalation flag
    pub(crate) fn claim_escalation(&mut self) -> std::result::Result<(), EscalationFailure> {
        if self.escalation_attempted {
            return Err(EscalationFailure::AlreadyEscalated);
        }
        self.escalation_attempted = true;
        Ok(())
    }
}
