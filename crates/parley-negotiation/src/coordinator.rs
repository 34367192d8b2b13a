//! Negotiation coordinator: sessions, turn order and reply generation

use std::collections::HashMap;
use std::sync::Arc;

use parley_attest::{AttestedDocument, BriefingItem, BriefingStore};
use parley_evidence::{ClaimVerifier, EvidenceArtifact};
use parley_llm::{CompletionRequest, LLMError, Message};
use rand::Rng;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};

use crate::agent::AgentState;
use crate::context::AppContext;
use crate::escalation::{ProofBundle, ProofCheck};
use crate::ids::{AgentId, SessionId};
use crate::persona::{coin_flip_announcement, Persona, KICKOFF_INSTRUCTION};
use crate::session::{ConversationTurn, Session, SessionState};
use crate::trace::TraceStage;
use crate::{NegotiationError, Result};

/// Result of a successful `start`
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub first_speaker: AgentId,
    pub first_speaker_name: String,
    pub announcement: String,
}

/// Result of delivering an inbound turn
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// Sender is not a participant; nothing changed
    Ignored,
    /// Counterpart's generated reply
    Replied(ConversationTurn),
}

impl TurnOutcome {
    pub fn reply(&self) -> Option<&ConversationTurn> {
        match self {
            TurnOutcome::Replied(turn) => Some(turn),
            TurnOutcome::Ignored => None,
        }
    }
}

/// Speaker data captured before the oracle call
struct SpeakerSnapshot {
    name: String,
    system_prompt: String,
    records: Vec<AttestedDocument>,
}

pub struct NegotiationCoordinator {
    ctx: AppContext,
    verifier: ClaimVerifier,
    agents: RwLock<HashMap<AgentId, AgentState>>,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl NegotiationCoordinator {
    pub fn new(ctx: AppContext) -> Self {
        let verifier = ctx.verifier();
        Self {
            ctx,
            verifier,
            agents: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    // ---- agents ----

    pub async fn register_agent(&self, name: impl Into<String>, persona: Persona) -> AgentId {
        let agent = AgentState::new(name, persona);
        let id = agent.id;
        tracing::info!(agent_id = %id, name = %agent.name, "Agent registered");
        self.agents.write().await.insert(id, agent);
        id
    }

    pub async fn agent_name(&self, agent: AgentId) -> Option<String> {
        self.agents.read().await.get(&agent).map(|a| a.name.clone())
    }

    /// Verify and store an attested document in the agent's briefing
    pub async fn ingest_record(&self, agent: AgentId, document: AttestedDocument) -> Result<usize> {
        let mut agents = self.agents.write().await;
        let state = agents
            .get_mut(&agent)
            .ok_or(NegotiationError::UnknownAgent { agent_id: agent })?;
        Ok(state.briefing.ingest_record(document, &self.ctx.keystore)?)
    }

    pub async fn append_narrative(&self, agent: AgentId, text: &str) -> Result<()> {
        let mut agents = self.agents.write().await;
        let state = agents
            .get_mut(&agent)
            .ok_or(NegotiationError::UnknownAgent { agent_id: agent })?;
        state.briefing.append_narrative(text);
        Ok(())
    }

    pub async fn ingest_briefing_file(
        &self,
        agent: AgentId,
        file_name: &str,
        contents: &[u8],
    ) -> Result<BriefingItem> {
        let mut agents = self.agents.write().await;
        let state = agents
            .get_mut(&agent)
            .ok_or(NegotiationError::UnknownAgent { agent_id: agent })?;
        let item = state
            .briefing
            .ingest_briefing_file(file_name, contents, &self.ctx.keystore)?;
        tracing::info!(agent_id = %agent, file = file_name, item = ?item, "Briefing file ingested");
        Ok(item)
    }

    pub async fn briefing(&self, agent: AgentId) -> Result<BriefingStore> {
        self.agents
            .read()
            .await
            .get(&agent)
            .map(|a| a.briefing.clone())
            .ok_or(NegotiationError::UnknownAgent { agent_id: agent })
    }

    // ---- sessions ----

    /// Create a session between exactly two distinct registered agents
    pub async fn create_session(&self, participants: &[AgentId]) -> Result<SessionId> {
        let [a, b] = participants else {
            return Err(NegotiationError::InvalidParticipants {
                message: format!("expected 2 participants, got {}", participants.len()),
            });
        };
        if a == b {
            return Err(NegotiationError::InvalidParticipants {
                message: "participants must be distinct".to_string(),
            });
        }
        {
            let agents = self.agents.read().await;
            for id in [a, b] {
                if !agents.contains_key(id) {
                    return Err(NegotiationError::UnknownAgent { agent_id: *id });
                }
            }
        }

        let session = Session::new(
            [*a, *b],
            self.ctx.config.context_window,
            self.ctx.config.trace_capacity,
        );
        let id = session.id();
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(session)));
        tracing::info!(session_id = %id, "Session created");
        Ok(id)
    }

    async fn handle(&self, session_id: SessionId) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(NegotiationError::UnknownSession { session_id })
    }

    /// Snapshot of a session
    pub async fn session(&self, session_id: SessionId) -> Result<Session> {
        let handle = self.handle(session_id).await?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    pub async fn state(&self, session_id: SessionId) -> Result<SessionState> {
        let handle = self.handle(session_id).await?;
        let state = handle.lock().await.state();
        Ok(state)
    }

    pub async fn transcript(&self, session_id: SessionId) -> Result<String> {
        let handle = self.handle(session_id).await?;
        let transcript = handle.lock().await.transcript();
        Ok(transcript)
    }

    /// Coin flip for the first speaker, then NotStarted -> Active
    pub async fn start(&self, session_id: SessionId) -> Result<StartOutcome> {
        let pick = rand::thread_rng().gen_range(0..2);
        self.start_with_pick(session_id, pick).await
    }

    /// `start` with a caller-supplied random source
    pub async fn start_with_rng<R: Rng + ?Sized>(
        &self,
        session_id: SessionId,
        rng: &mut R,
    ) -> Result<StartOutcome> {
        let pick = rng.gen_range(0..2);
        self.start_with_pick(session_id, pick).await
    }

    async fn start_with_pick(&self, session_id: SessionId, pick: usize) -> Result<StartOutcome> {
        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;

        let first_speaker = session.participants()[pick];
        session.begin(first_speaker)?;

        let first_speaker_name = self
            .agent_name(first_speaker)
            .await
            .unwrap_or_else(|| first_speaker.to_string());
        let announcement = coin_flip_announcement(&first_speaker_name);

        session.trace_mut().record(
            TraceStage::Started,
            announcement.clone(),
            Some(json!({ "first_speaker": first_speaker.to_string() })),
        );
        tracing::info!(session_id = %session_id, first_speaker = %first_speaker_name, "Negotiation started");

        Ok(StartOutcome {
            first_speaker,
            first_speaker_name,
            announcement,
        })
    }

    /// Generate the first speaker's opening turn
    pub async fn open(&self, session_id: SessionId) -> Result<ConversationTurn> {
        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;
        session.ensure_active()?;

        if !session.turns().is_empty() {
            return Err(NegotiationError::ProtocolViolation {
                message: format!("{} is already open", session_id),
            });
        }
        let first_speaker = session
            .first_speaker()
            .ok_or(NegotiationError::ProtocolViolation {
                message: format!("{} has no first speaker", session_id),
            })?;

        self.generate_reply(&mut session, first_speaker).await
    }

    /// Deliver an inbound turn and generate the counterpart's reply.
    ///
    /// Senders outside the session are ignored in every state. The echo of the latest
    /// generated turn is not appended twice.
    pub async fn receive_turn(
        &self,
        session_id: SessionId,
        sender: AgentId,
        content: &str,
    ) -> Result<TurnOutcome> {
        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;

        let counterpart = match session.counterpart_of(sender) {
            Ok(counterpart) => counterpart,
            Err(e) => {
                tracing::debug!(session_id = %session_id, sender = %sender, error = %e, "Ignored off-protocol turn");
                session
                    .trace_mut()
                    .record(TraceStage::Ignored, "Turn from non-participant", None);
                return Ok(TurnOutcome::Ignored);
            }
        };
        session.ensure_active()?;

        match session.take_echo(sender, content) {
            Some(index) => {
                if let Some(proof) = session.turns()[index].proof.clone() {
                    self.note_received_proof(&mut session, &proof);
                }
            }
            None => {
                let name = self
                    .agent_name(sender)
                    .await
                    .unwrap_or_else(|| sender.to_string());
                let index = session.append_turn(ConversationTurn::inbound(sender, name, content))?;
                session.trace_mut().record(
                    TraceStage::Turn,
                    "Inbound turn",
                    Some(json!({ "index": index, "speaker": sender.to_string() })),
                );
            }
        }

        let reply = self.generate_reply(&mut session, counterpart).await?;
        Ok(TurnOutcome::Replied(reply))
    }

    /// Active -> Completed
    pub async fn complete(&self, session_id: SessionId) -> Result<()> {
        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;
        session.finish()?;
        let turns = session.turns().len();
        session.trace_mut().record(
            TraceStage::Completed,
            "Session completed",
            Some(json!({ "turns": turns })),
        );
        tracing::info!(session_id = %session_id, turns, "Negotiation completed");
        Ok(())
    }

    /// Drive the session in-process: each reply is delivered back as the
    /// counterpart's inbound turn. Opens the session if it has no turns.
    pub async fn run_exchange(
        &self,
        session_id: SessionId,
        rounds: usize,
    ) -> Result<Vec<ConversationTurn>> {
        let mut produced = Vec::with_capacity(rounds + 1);

        let mut last = match self.session(session_id).await?.turns().last().cloned() {
            Some(turn) => turn,
            None => {
                let opening = self.open(session_id).await?;
                produced.push(opening.clone());
                opening
            }
        };

        for _ in 0..rounds {
            match self
                .receive_turn(session_id, last.speaker, &last.content)
                .await?
            {
                TurnOutcome::Replied(reply) => {
                    produced.push(reply.clone());
                    last = reply;
                }
                TurnOutcome::Ignored => break,
            }
        }
        Ok(produced)
    }

    // ---- reply generation ----

    async fn snapshot(&self, agent: AgentId) -> Result<SpeakerSnapshot> {
        let agents = self.agents.read().await;
        let state = agents
            .get(&agent)
            .ok_or(NegotiationError::UnknownAgent { agent_id: agent })?;
        Ok(SpeakerSnapshot {
            name: state.name.clone(),
            system_prompt: state.system_prompt(),
            records: state.briefing.records().to_vec(),
        })
    }

    /// Pace, ask the oracle, attach evidence and append. Holds only this
    /// session's lock.
    async fn generate_reply(&self, session: &mut Session, speaker: AgentId) -> Result<ConversationTurn> {
        let snapshot = self.snapshot(speaker).await?;

        let delay = self.ctx.config.reply_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut messages = session
            .window(speaker)
            .map(|w| w.to_messages())
            .unwrap_or_default();
        if messages.is_empty() {
            messages.push(Message::user(KICKOFF_INSTRUCTION));
        }
        let request = CompletionRequest::new(messages).with_system(snapshot.system_prompt);

        let content = match self.ctx.oracle.complete_text(request).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                return Err(self.oracle_failure(
                    session,
                    LLMError::InvalidResponse {
                        message: "empty reply".to_string(),
                    },
                ))
            }
            Err(e) => return Err(self.oracle_failure(session, e)),
        };

        let evidence = self.derive_evidence(session, &content, &snapshot.records).await;
        let proof = match &evidence {
            Some(artifact) => self.escalate_once(session, artifact, &snapshot.records).await,
            None => None,
        };

        let turn = ConversationTurn::generated(speaker, snapshot.name, content)
            .with_evidence(evidence)
            .with_proof(proof);
        let index = session.append_turn(turn.clone())?;

        session.trace_mut().record(
            TraceStage::Reply,
            "Generated reply",
            Some(json!({
                "index": index,
                "speaker": speaker.to_string(),
                "evidence": turn.evidence.as_ref().map_or(0, EvidenceArtifact::len),
                "proof": turn.proof.is_some(),
            })),
        );
        tracing::info!(
            session_id = %session.id(),
            speaker = %turn.speaker_name,
            index,
            "Reply generated"
        );
        Ok(turn)
    }

    fn oracle_failure(&self, session: &mut Session, error: LLMError) -> NegotiationError {
        tracing::warn!(session_id = %session.id(), error = %error, "Oracle failed to produce a reply");
        session
            .trace_mut()
            .record(TraceStage::Error, format!("Oracle failure: {}", error), None);
        NegotiationError::Oracle(error)
    }

    /// Verifier failures never abort the turn
    async fn derive_evidence(
        &self,
        session: &mut Session,
        content: &str,
        records: &[AttestedDocument],
    ) -> Option<EvidenceArtifact> {
        if records.is_empty() {
            return None;
        }

        match self.verifier.verify_claim(content, records).await {
            Ok(expressions) if expressions.is_empty() => None,
            Ok(expressions) => {
                let artifact = EvidenceArtifact::new(expressions);
                session.trace_mut().record(
                    TraceStage::Evidence,
                    "Evidence attached",
                    Some(json!({
                        "expressions": artifact.len(),
                        "all_hold": artifact.all_hold(),
                    })),
                );
                Some(artifact)
            }
            Err(e) => {
                tracing::warn!(session_id = %session.id(), error = %e, "Claim verification failed");
                session
                    .trace_mut()
                    .record(TraceStage::Error, format!("Verification failure: {}", e), None);
                None
            }
        }
    }

    /// First evidence-bearing turn of a session only; failures degrade to
    /// local evidence.
    async fn escalate_once(
        &self,
        session: &mut Session,
        artifact: &EvidenceArtifact,
        records: &[AttestedDocument],
    ) -> Option<ProofBundle> {
        let service = self.ctx.proof_service.as_ref()?;
        if session.claim_escalation().is_err() {
            return None;
        }

        match service.escalate(artifact, records).await {
            Ok(bundle) => {
                session.trace_mut().record(
                    TraceStage::Escalation,
                    "Proof bundle received",
                    Some(json!({ "summary": bundle.summary() })),
                );
                tracing::info!(session_id = %session.id(), "Evidence escalated");
                Some(bundle)
            }
            Err(e) => {
                tracing::warn!(session_id = %session.id(), error = %e, "Escalation failed, using local evidence");
                session
                    .trace_mut()
                    .record(TraceStage::Escalation, format!("Escalation failed: {}", e), None);
                None
            }
        }
    }

    fn note_received_proof(&self, session: &mut Session, proof: &ProofBundle) {
        let check = proof.check_locally();
        match &check {
            ProofCheck::StructurallyValid { .. } => {
                tracing::debug!(session_id = %session.id(), "Relayed proof bundle is well-formed")
            }
            ProofCheck::Malformed { reason } => {
                tracing::warn!(session_id = %session.id(), reason = %reason, "Relayed proof bundle is malformed")
            }
        }
        session.trace_mut().record(
            TraceStage::Escalation,
            "Relayed proof checked",
            serde_json::to_value(&check).ok(),
        );
    }
}
