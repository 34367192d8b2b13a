//! RemoteAttestationClient against a local stub proof service

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use parley_attest::{AttestedDocument, AttestedRecord};
use parley_evidence::{check_artifact, EvidenceArtifact};
use parley_negotiation::{
    EscalationConfig, EscalationFailure, ProofCheck, ProofService, RemoteAttestationClient,
};
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct Seen {
    requests: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

async fn prove(State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    seen.requests.lock().unwrap().push((auth, body));
    Json(json!({
        "proof": "0a0b0c",
        "verification_key": "ffee",
        "public_values": "{\"conditions_verified\":true,\"num_signatures_verified\":1,\"public_keys\":[\"abc\"]}"
    }))
}

async fn broken() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "prover crashed")
}

async fn garbage() -> &'static str {
    "not json at all"
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({}))
}

async fn serve(seen: Seen) -> String {
    let app = Router::new()
        .route("/prove", post(prove))
        .route("/broken", post(broken))
        .route("/garbage", post(garbage))
        .route("/slow", post(slow))
        .with_state(seen);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn fixture() -> (EvidenceArtifact, Vec<AttestedDocument>) {
    let records = vec![AttestedDocument::new(
        AttestedRecord {
            payload: json!({"offer_amount": 1_250_000}).as_object().cloned().unwrap(),
            signature: "00".repeat(64),
            signer: "Alice".to_string(),
            signed_at: Utc::now(),
        },
        42,
    )];
    let artifact = check_artifact("records[0].offer_amount > 1200000", &records);
    assert_eq!(artifact.len(), 1);
    (artifact, records)
}

#[tokio::test]
async fn test_escalation_round_trip() {
    let seen = Seen::default();
    let base = serve(seen.clone()).await;
    let client =
        RemoteAttestationClient::new(EscalationConfig::new(format!("{}/prove", base)).with_api_key("secret"))
            .unwrap();
    let (artifact, records) = fixture();

    let bundle = client.escalate(&artifact, &records).await.unwrap();
    assert_eq!(bundle.proof, "0a0b0c");
    assert!(matches!(
        bundle.check_locally(),
        ProofCheck::StructurallyValid { conditions_verified: true, public_keys: 1, .. }
    ));
    assert!(bundle.summary().unwrap().contains("Number of Public Keys: 1"));

    let requests = seen.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (auth, body) = &requests[0];
    assert_eq!(auth.as_deref(), Some("Bearer secret"));
    assert_eq!(body["verification_file"], "records[0].offer_amount > 1200000");
    assert_eq!(body["records"][0]["signed_data"]["data"]["offer_amount"], 1_250_000);
    assert_eq!(body["records"][0]["document_text_length"], 42);
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let base = serve(Seen::default()).await;
    let client = RemoteAttestationClient::new(EscalationConfig::new(format!("{}/broken", base))).unwrap();
    let (artifact, records) = fixture();

    match client.escalate(&artifact, &records).await {
        Err(EscalationFailure::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "prover crashed");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_is_reported() {
    let base = serve(Seen::default()).await;
    let client = RemoteAttestationClient::new(EscalationConfig::new(format!("{}/garbage", base))).unwrap();
    let (artifact, records) = fixture();

    assert!(matches!(
        client.escalate(&artifact, &records).await,
        Err(EscalationFailure::MalformedResponse(_))
    ));
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let base = serve(Seen::default()).await;
    let config = EscalationConfig::new(format!("{}/slow", base)).with_timeout(Duration::from_secs(1));
    let client = RemoteAttestationClient::new(config).unwrap();
    let (artifact, records) = fixture();

    assert!(matches!(
        client.escalate(&artifact, &records).await,
        Err(EscalationFailure::Timeout { seconds: 1 })
    ));
}

#[tokio::test]
async fn test_unreachable_service_is_network_failure() {
    let client = RemoteAttestationClient::new(EscalationConfig::new("http://127.0.0.1:1/prove")).unwrap();
    let (artifact, records) = fixture();

    assert!(matches!(
        client.escalate(&artifact, &records).await,
        Err(EscalationFailure::Network(_))
    ));
}
