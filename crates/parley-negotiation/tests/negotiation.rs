//! Coordinator behaviour with a scripted oracle

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parley_attest::{AttestedDocument, DocumentAttestor};
use parley_crypto::KeyStore;
use parley_evidence::EvidenceArtifact;
use parley_llm::{LLMRouterBuilder, ScriptedProvider};
use parley_negotiation::{
    AgentId, AppContext, EscalationFailure, NegotiationConfig, NegotiationCoordinator,
    NegotiationError, Persona, ProofBundle, ProofService, SessionId, SessionState, TraceStage,
    TurnOutcome,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

const EVIDENCE_LINE: &str = "records[0].offer_amount > 1000000";

struct Harness {
    coordinator: NegotiationCoordinator,
    oracle: Arc<ScriptedProvider>,
    keystore: Arc<KeyStore>,
}

fn harness(provider: ScriptedProvider, config: NegotiationConfig) -> Harness {
    harness_with_service(provider, config, None)
}

fn harness_with_service(
    provider: ScriptedProvider,
    config: NegotiationConfig,
    service: Option<Arc<dyn ProofService>>,
) -> Harness {
    let oracle = Arc::new(provider);
    let router = Arc::new(LLMRouterBuilder::new().with_scripted(oracle.clone()).build());
    let keystore = Arc::new(KeyStore::in_memory());

    let mut ctx = AppContext::new(router, keystore.clone()).with_config(config);
    if let Some(service) = service {
        ctx = ctx.with_proof_service(service);
    }

    Harness {
        coordinator: NegotiationCoordinator::new(ctx),
        oracle,
        keystore,
    }
}

fn instant() -> NegotiationConfig {
    NegotiationConfig::default().with_reply_delay(Duration::ZERO)
}

async fn pair(h: &Harness) -> (SessionId, AgentId, AgentId) {
    let seller = h
        .coordinator
        .register_agent("Seller", Persona::negotiator("Seller"))
        .await;
    let buyer = h
        .coordinator
        .register_agent("Buyer", Persona::negotiator("Buyer"))
        .await;
    let session = h.coordinator.create_session(&[seller, buyer]).await.unwrap();
    (session, seller, buyer)
}

async fn give_offer(h: &Harness, agent: AgentId, signer: &str, amount: u64) {
    if !h.keystore.contains(signer) {
        h.keystore.generate_identity(signer).unwrap();
    }
    let attestor = DocumentAttestor::new(h.keystore.clone(), h.coordinator.context().oracle.clone());
    let payload = json!({"offer_amount": amount}).as_object().cloned().unwrap();
    let record = attestor.sign(payload, signer).unwrap();
    h.coordinator
        .ingest_record(agent, AttestedDocument::new(record, 64))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_coin_flip_is_uniform() {
    let h = harness(ScriptedProvider::new(), instant());
    let a = h.coordinator.register_agent("A", Persona::negotiator("A")).await;
    let b = h.coordinator.register_agent("B", Persona::negotiator("B")).await;

    let mut rng = StdRng::seed_from_u64(7);
    let trials = 1000;
    let mut a_first = 0;
    for _ in 0..trials {
        let session = h.coordinator.create_session(&[a, b]).await.unwrap();
        let outcome = h.coordinator.start_with_rng(session, &mut rng).await.unwrap();
        if outcome.first_speaker == a {
            a_first += 1;
        }
    }

    assert!((430..=570).contains(&a_first), "A spoke first {} of {} times", a_first, trials);
}

#[tokio::test]
async fn test_start_announces_and_rejects_restart() {
    let h = harness(ScriptedProvider::new(), instant());
    let (session, seller, buyer) = pair(&h).await;

    let outcome = h.coordinator.start(session).await.unwrap();
    assert!([seller, buyer].contains(&outcome.first_speaker));
    assert!(outcome
        .announcement
        .starts_with(&format!("A coin has been flipped! {} will speak first.", outcome.first_speaker_name)));
    assert_eq!(h.coordinator.state(session).await.unwrap(), SessionState::Active);

    assert!(matches!(
        h.coordinator.start(session).await,
        Err(NegotiationError::AlreadyStarted { .. })
    ));
}

#[tokio::test]
async fn test_session_needs_two_distinct_agents() {
    let h = harness(ScriptedProvider::new(), instant());
    let (_, seller, buyer) = pair(&h).await;
    let third = h.coordinator.register_agent("Broker", Persona::negotiator("Broker")).await;

    for participants in [vec![seller], vec![seller, seller], vec![seller, buyer, third]] {
        assert!(matches!(
            h.coordinator.create_session(&participants).await,
            Err(NegotiationError::InvalidParticipants { .. })
        ));
    }
    assert!(matches!(
        h.coordinator.create_session(&[seller, AgentId::new()]).await,
        Err(NegotiationError::UnknownAgent { .. })
    ));
}

#[tokio::test]
async fn test_third_party_sender_is_ignored() {
    let h = harness(ScriptedProvider::new().with_fallback("Hello there."), instant());
    let (session, seller, buyer) = pair(&h).await;
    let outsider = h.coordinator.register_agent("Outsider", Persona::negotiator("Outsider")).await;
    h.coordinator.start(session).await.unwrap();

    let before = h.coordinator.session(session).await.unwrap();
    let outcome = h
        .coordinator
        .receive_turn(session, outsider, "I'll pay double!")
        .await
        .unwrap();

    assert!(matches!(outcome, TurnOutcome::Ignored));
    let after = h.coordinator.session(session).await.unwrap();
    assert_eq!(after.turns().len(), before.turns().len());
    assert_eq!(after.state(), SessionState::Active);
    assert_eq!(after.window(seller).map(|w| w.len()), before.window(seller).map(|w| w.len()));
    assert_eq!(after.window(buyer).map(|w| w.len()), before.window(buyer).map(|w| w.len()));
    assert_eq!(h.oracle.call_count(), 0);
    assert_eq!(after.trace().count(TraceStage::Ignored), 1);
}

#[tokio::test]
async fn test_outsider_ignored_before_start_and_after_complete() {
    let h = harness(ScriptedProvider::new().with_fallback("Hello there."), instant());
    let (session, _, _) = pair(&h).await;
    let outsider = h.coordinator.register_agent("Outsider", Persona::negotiator("Outsider")).await;

    let early = h.coordinator.receive_turn(session, outsider, "psst").await.unwrap();
    assert!(matches!(early, TurnOutcome::Ignored));
    assert_eq!(h.coordinator.state(session).await.unwrap(), SessionState::NotStarted);

    h.coordinator.start(session).await.unwrap();
    h.coordinator.complete(session).await.unwrap();

    let late = h.coordinator.receive_turn(session, outsider, "still here").await.unwrap();
    assert!(matches!(late, TurnOutcome::Ignored));

    let after = h.coordinator.session(session).await.unwrap();
    assert_eq!(after.state(), SessionState::Completed);
    assert!(after.turns().is_empty());
    assert_eq!(after.trace().count(TraceStage::Ignored), 2);
    assert_eq!(h.oracle.call_count(), 0);
}

#[tokio::test]
async fn test_turns_rejected_outside_active_state() {
    let h = harness(ScriptedProvider::new().with_fallback("Fine."), instant());
    let (session, seller, _) = pair(&h).await;

    assert!(matches!(
        h.coordinator.receive_turn(session, seller, "early").await,
        Err(NegotiationError::NotActive { state: SessionState::NotStarted, .. })
    ));

    h.coordinator.start(session).await.unwrap();
    h.coordinator.complete(session).await.unwrap();

    assert!(matches!(
        h.coordinator.receive_turn(session, seller, "late").await,
        Err(NegotiationError::NotActive { state: SessionState::Completed, .. })
    ));
    assert!(h.coordinator.session(session).await.unwrap().turns().is_empty());
}

#[tokio::test]
async fn test_reply_goes_to_counterpart() {
    let h = harness(ScriptedProvider::new().with_replies(["Welcome, what is your budget?"]), instant());
    let (session, seller, buyer) = pair(&h).await;
    h.coordinator.start(session).await.unwrap();

    let outcome = h
        .coordinator
        .receive_turn(session, buyer, "Hi, I'm interested in the house.")
        .await
        .unwrap();

    let reply = outcome.reply().unwrap();
    assert_eq!(reply.speaker, seller);
    assert!(reply.generated);
    assert!(reply.evidence.is_none());

    let transcript = h.coordinator.transcript(session).await.unwrap();
    assert!(transcript.starts_with("Buyer ("));
    assert!(transcript.contains("Seller ("));
    assert!(transcript.contains("): Welcome, what is your budget?"));

    let request = h.oracle.requests().pop().unwrap();
    assert!(request.system.unwrap().starts_with("You are Seller"));
    assert_eq!(request.messages.last().unwrap().content, "Hi, I'm interested in the house.");
}

#[tokio::test]
async fn test_open_uses_kickoff_instruction() {
    let h = harness(ScriptedProvider::new().with_replies(["I'm the seller. The asking price is firm."]), instant());
    let (session, _, _) = pair(&h).await;
    let outcome = h.coordinator.start(session).await.unwrap();

    let opening = h.coordinator.open(session).await.unwrap();
    assert_eq!(opening.speaker, outcome.first_speaker);

    let request = h.oracle.requests().pop().unwrap();
    assert!(request.messages[0].content.starts_with("The negotiation has started."));

    assert!(matches!(
        h.coordinator.open(session).await,
        Err(NegotiationError::ProtocolViolation { .. })
    ));
}

#[tokio::test]
async fn test_exchange_alternates_without_echo_duplicates() {
    let h = harness(ScriptedProvider::new().with_fallback("Let's keep talking."), instant());
    let (session, _, _) = pair(&h).await;
    h.coordinator.start(session).await.unwrap();

    let produced = h.coordinator.run_exchange(session, 5).await.unwrap();
    assert_eq!(produced.len(), 6);
    for pair in produced.windows(2) {
        assert_ne!(pair[0].speaker, pair[1].speaker);
    }

    let snapshot = h.coordinator.session(session).await.unwrap();
    assert_eq!(snapshot.turns().len(), produced.len());
}

#[tokio::test]
async fn test_context_window_evicts_oldest() {
    let h = harness(ScriptedProvider::new().with_fallback("Noted."), instant());
    let (session, seller, buyer) = pair(&h).await;
    h.coordinator.start_with_rng(session, &mut StdRng::seed_from_u64(1)).await.unwrap();

    // Kickoff plus 29 turns fills the first speaker's window exactly.
    let first = h.coordinator.session(session).await.unwrap().first_speaker().unwrap();
    let produced = h.coordinator.run_exchange(session, 28).await.unwrap();
    assert_eq!(produced.len(), 29);
    let snapshot = h.coordinator.session(session).await.unwrap();
    let window = snapshot.window(first).unwrap();
    assert_eq!(window.len(), 30);
    assert!(window.entries().next().unwrap().content.starts_with("The negotiation has started."));

    h.coordinator.run_exchange(session, 5).await.unwrap();
    let snapshot = h.coordinator.session(session).await.unwrap();
    assert_eq!(snapshot.turns().len(), 34);
    for agent in [seller, buyer] {
        assert_eq!(snapshot.window(agent).unwrap().len(), 30);
    }
    let oldest = snapshot.window(first).unwrap().entries().next().cloned().unwrap();
    assert!(!oldest.content.starts_with("The negotiation has started."));

    let last_request = h.oracle.requests().pop().unwrap();
    assert_eq!(last_request.messages.len(), 30);
}

#[tokio::test]
async fn test_oracle_failure_keeps_inbound_turn() {
    let h = harness(ScriptedProvider::new(), instant());
    let (session, _, buyer) = pair(&h).await;
    h.coordinator.start(session).await.unwrap();

    let result = h.coordinator.receive_turn(session, buyer, "Any news?").await;
    assert!(matches!(result, Err(NegotiationError::Oracle(_))));

    let snapshot = h.coordinator.session(session).await.unwrap();
    assert_eq!(snapshot.turns().len(), 1);
    assert_eq!(snapshot.state(), SessionState::Active);
}

#[tokio::test]
async fn test_evidence_attached_from_speaker_records() {
    let provider = ScriptedProvider::new()
        .when_contains("verification assistant", EVIDENCE_LINE)
        .with_fallback("I already hold an offer above $1 million.");
    let h = harness(provider, instant());
    let (session, seller, buyer) = pair(&h).await;
    give_offer(&h, seller, "Alice", 1_200_000).await;
    h.coordinator.start(session).await.unwrap();

    let outcome = h.coordinator.receive_turn(session, buyer, "What do you have?").await.unwrap();
    let reply = outcome.reply().unwrap();
    let evidence = reply.evidence.as_ref().unwrap();
    assert_eq!(evidence.to_text(), EVIDENCE_LINE);
    assert!(evidence.all_hold());
    assert!(reply.proof.is_none());
}

struct CountingService {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl ProofService for CountingService {
    async fn escalate(
        &self,
        artifact: &EvidenceArtifact,
        records: &[AttestedDocument],
    ) -> Result<ProofBundle, EscalationFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!artifact.is_empty());
        assert!(!records.is_empty());
        if self.fail {
            return Err(EscalationFailure::Timeout { seconds: 1 });
        }
        Ok(ProofBundle {
            proof: "00ff".to_string(),
            verification_key: "aa".to_string(),
            public_values: r#"{"conditions_verified":true,"num_signatures_verified":1,"public_keys":["k"]}"#
                .to_string(),
            summary: None,
        })
    }
}

async fn escalation_run(fail: bool) -> (Arc<CountingService>, Vec<parley_negotiation::ConversationTurn>) {
    let service = Arc::new(CountingService {
        calls: AtomicUsize::new(0),
        fail,
    });
    let provider = ScriptedProvider::new()
        .when_contains("verification assistant", EVIDENCE_LINE)
        .with_fallback("My offers on record are above $1 million.");
    let h = harness_with_service(provider, instant(), Some(service.clone()));
    let (session, seller, buyer) = pair(&h).await;
    give_offer(&h, seller, "Alice", 1_200_000).await;
    give_offer(&h, buyer, "Bob", 1_100_000).await;
    h.coordinator.start(session).await.unwrap();

    let turns = h.coordinator.run_exchange(session, 5).await.unwrap();
    assert!(h.coordinator.session(session).await.unwrap().escalation_attempted());
    (service, turns)
}

#[tokio::test]
async fn test_escalation_happens_at_most_once() {
    let (service, turns) = escalation_run(false).await;

    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    assert!(turns.iter().all(|t| t.evidence.is_some()));
    let with_proof: Vec<_> = turns.iter().filter(|t| t.proof.is_some()).collect();
    assert_eq!(with_proof.len(), 1);
    assert!(with_proof[0].proof.as_ref().unwrap().summary().unwrap().contains("Conditions Verified: true"));
}

#[tokio::test]
async fn test_failed_escalation_degrades_to_local_evidence() {
    let (service, turns) = escalation_run(true).await;

    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    assert!(turns.iter().all(|t| t.proof.is_none()));
    assert!(turns.iter().all(|t| t.evidence.is_some()));
}

#[tokio::test]
async fn test_pacing_does_not_block_other_sessions() {
    let delay = Duration::from_millis(300);
    let h = harness(
        ScriptedProvider::new().with_fallback("Considering it."),
        NegotiationConfig::default().with_reply_delay(delay),
    );
    let (first, _, buyer_one) = pair(&h).await;
    let (second, _, buyer_two) = pair(&h).await;
    h.coordinator.start(first).await.unwrap();
    h.coordinator.start(second).await.unwrap();

    let started = Instant::now();
    let (a, b) = tokio::join!(
        h.coordinator.receive_turn(first, buyer_one, "Offer one"),
        h.coordinator.receive_turn(second, buyer_two, "Offer two"),
    );
    let elapsed = started.elapsed();

    assert!(a.unwrap().reply().is_some());
    assert!(b.unwrap().reply().is_some());
    assert!(elapsed >= delay);
    assert!(elapsed < delay * 2, "sessions were serialized: {:?}", elapsed);
}

#[tokio::test]
async fn test_trace_records_lifecycle() {
    let h = harness(ScriptedProvider::new().with_fallback("Deal."), instant());
    let (session, _, _) = pair(&h).await;
    h.coordinator.start(session).await.unwrap();
    h.coordinator.run_exchange(session, 1).await.unwrap();
    h.coordinator.complete(session).await.unwrap();

    let snapshot = h.coordinator.session(session).await.unwrap();
    let trace = snapshot.trace();
    assert_eq!(trace.count(TraceStage::Created), 1);
    assert_eq!(trace.count(TraceStage::Started), 1);
    assert_eq!(trace.count(TraceStage::Reply), 2);
    assert_eq!(trace.last().map(|e| e.stage), Some(TraceStage::Completed));
}
