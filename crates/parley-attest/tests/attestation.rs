//! End-to-end attestation against a file-backed key store

use std::sync::Arc;

use parley_attest::{inspect_wire, verify_wire, BriefingItem, BriefingStore, DocumentAttestor};
use parley_crypto::KeyStore;
use parley_llm::{LLMRouterBuilder, ScriptedProvider};
use serde_json::json;

const EXTRACTED: &str = r#"{"document_type": "purchase_offer", "party_name": "Bob", "offer_amount": 1200000, "closing_date": "2025-03-01", "contingencies": ["inspection", "financing"]}"#;

fn attestor(dir: &std::path::Path, replies: &[&str]) -> DocumentAttestor {
    let keystore = Arc::new(KeyStore::open(dir).unwrap());
    keystore.seed_signers(["Alice", "Bob"]).unwrap();
    let scripted = Arc::new(ScriptedProvider::new().with_replies(replies.iter().copied()));
    let oracle = Arc::new(LLMRouterBuilder::new().with_scripted(scripted).build());
    DocumentAttestor::new(keystore, oracle)
}

#[tokio::test]
async fn attested_document_survives_store_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let document = {
        let attestor = attestor(dir.path(), &[EXTRACTED]);
        attestor
            .attest("PURCHASE OFFER ... Buyer: Bob ... $1,200,000", None, None)
            .await
            .unwrap()
    };
    assert_eq!(document.signer(), "Bob");

    let wire = serde_json::to_string_pretty(&document).unwrap();
    let reopened = KeyStore::open(dir.path()).unwrap();

    let verification = verify_wire(&wire, &reopened);
    assert!(verification.valid, "{:?}", verification.errors);

    let inspection = inspect_wire(&wire, &reopened).unwrap();
    assert!(inspection.signature_valid);
    assert!(inspection.canonical_payload.starts_with(r#"{"closing_date":"2025-03-01","contingencies""#));
}

#[tokio::test]
async fn any_signature_byte_flip_fails_verification() {
    let dir = tempfile::tempdir().unwrap();
    let attestor = attestor(dir.path(), &[EXTRACTED]);
    let document = attestor.attest("offer", Some("sign for alice"), None).await.unwrap();
    assert_eq!(document.signer(), "Alice");

    let signature = document.signed_data.signature.clone();
    for i in (0..signature.len()).step_by(2) {
        let mut bytes = hex_bytes(&signature);
        bytes[i / 2] ^= 0x01;
        let mut tampered = document.signed_data.clone();
        tampered.signature = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        assert!(!attestor.verify(&tampered), "flip at byte {} verified", i / 2);
    }
}

#[tokio::test]
async fn any_payload_change_fails_verification() {
    let dir = tempfile::tempdir().unwrap();
    let attestor = attestor(dir.path(), &[EXTRACTED]);
    let document = attestor.attest("offer", None, Some("Alice")).await.unwrap();

    for key in document.payload().keys() {
        let mut tampered = document.signed_data.clone();
        tampered.payload.insert(key.clone(), json!("changed"));
        assert!(!attestor.verify(&tampered), "change to {} verified", key);
    }

    let mut extra = document.signed_data.clone();
    extra.payload.insert("note".to_string(), json!(null));
    assert!(!attestor.verify(&extra));
}

#[tokio::test]
async fn briefing_ingests_attested_json() {
    let dir = tempfile::tempdir().unwrap();
    let attestor = attestor(dir.path(), &[EXTRACTED]);
    let document = attestor.attest("offer", None, None).await.unwrap();

    let mut briefing = BriefingStore::new();
    let bytes = serde_json::to_vec(&document).unwrap();
    let item = briefing
        .ingest_briefing_file("processed_offer.json", &bytes, attestor.keystore())
        .unwrap();

    assert_eq!(item, BriefingItem::Record(0));
    assert_eq!(briefing.records_json()[0]["offer_amount"], 1200000);
}

fn hex_bytes(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
        .collect()
}
