//! Record commands - attest documents, verify and inspect signed records

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use colored::*;
use parley_attest::{inspect_wire, verify_wire, AttestedDocument, DocumentAttestor};
use parley_crypto::KeyStore;

use crate::display;

/// Extract a document, sign it, and write the wire JSON
pub async fn attest(
    attestor: &DocumentAttestor,
    file: &Path,
    message: Option<&str>,
    signer: Option<&str>,
    out: Option<&Path>,
) -> anyhow::Result<AttestedDocument> {
    let raw = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;

    display::section("Attesting Document");
    display::labeled("Source", &file.display().to_string());
    display::labeled("Length", &format!("{} chars", raw.chars().count()));

    let document = attestor.attest(&raw, message, signer).await?;
    let out = out.map(Path::to_path_buf).unwrap_or_else(|| default_output(file));
    fs::write(&out, document.to_json_pretty())
        .with_context(|| format!("writing {}", out.display()))?;

    println!();
    display::success(&format!("Signed by {}", document.signer().bright_white()));
    for (key, value) in document.payload() {
        display::kv(key, &display::truncate(&value.to_string(), 60));
    }
    display::labeled("Written to", &out.display().to_string());
    Ok(document)
}

/// Check a record's signature against the local key store
pub fn verify(store: &KeyStore, file: &Path) -> anyhow::Result<bool> {
    let json = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;

    println!("{}", "Verifying Record...".bright_white().bold());
    println!();

    let result = verify_wire(&json, store);
    println!("  Signer: {}", result.signer.bright_cyan());
    println!();

    if result.valid {
        println!("  {} {}", "✓".bright_green(), "Signature is VALID".bright_green().bold());
        println!();
        println!("  This record cryptographically proves:");
        println!("    • {} signed exactly these fields", result.signer);
        println!("    • No field has been changed since signing");
    } else {
        println!("  {} {}", "✗".bright_red(), "Signature is INVALID".bright_red().bold());
        for error in &result.errors {
            println!("  Error: {}", error.bright_red());
        }
    }
    Ok(result.valid)
}

pub fn inspect(store: &KeyStore, file: &Path) -> anyhow::Result<()> {
    let json = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let inspection = inspect_wire(&json, store).context("not an attested record")?;

    display::section("Record Inspection");
    display::labeled("Signer", &inspection.signer);
    display::labeled(
        "Public key",
        inspection.signer_public_key.as_deref().unwrap_or("unknown to this store"),
    );
    if inspection.signature_valid {
        display::success("Signature valid");
    } else {
        display::error("Signature invalid");
    }
    display::labeled("Signed at", &inspection.signed_at);
    display::labeled("Processed at", &inspection.processed_at);
    display::labeled("Source length", &inspection.document_text_length.to_string());

    println!();
    println!("  {}", "Fields".bright_white());
    for field in &inspection.fields {
        println!("    • {}", field);
    }

    println!();
    println!("  {}", "Canonical payload".bright_white());
    println!("    {}", inspection.canonical_payload.bright_black());
    Ok(())
}

/// Load every record file, failing on the first unreadable one
pub fn load_records(files: &[PathBuf]) -> anyhow::Result<Vec<AttestedDocument>> {
    files
        .iter()
        .map(|file| {
            let json =
                fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
            serde_json::from_str(&json).with_context(|| format!("parsing {}", file.display()))
        })
        .collect()
}

/// `offer.txt` -> `offer.signed.json`
fn default_output(file: &Path) -> PathBuf {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "record".to_string());
    file.with_file_name(format!("{}.signed.json", stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parley_llm::{LLMRouterBuilder, ScriptedProvider};

    #[test]
    fn test_default_output_name() {
        assert_eq!(
            default_output(Path::new("/tmp/offer.txt")),
            PathBuf::from("/tmp/offer.signed.json")
        );
    }

    #[tokio::test]
    async fn test_attest_then_verify() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(KeyStore::open(dir.path().join("keys")).unwrap());
        store.generate_identity("Bob").unwrap();

        let provider = Arc::new(
            ScriptedProvider::new().with_replies([r#"{"offer_amount": 1250000, "party_name": "Bob"}"#]),
        );
        let oracle = Arc::new(LLMRouterBuilder::new().with_scripted(provider).build());
        let attestor = DocumentAttestor::new(store.clone(), oracle);

        let source = dir.path().join("offer.txt");
        fs::write(&source, "Bob offers $1,250,000 for the house.").unwrap();

        let document = attest(&attestor, &source, None, None, None).await.unwrap();
        assert_eq!(document.signer(), "Bob");

        let signed = dir.path().join("offer.signed.json");
        assert!(verify(&store, &signed).unwrap());
        inspect(&store, &signed).unwrap();

        let loaded = load_records(&[signed.clone()]).unwrap();
        assert_eq!(loaded[0].payload()["offer_amount"], 1_250_000);

        let tampered = fs::read_to_string(&signed).unwrap().replace("1250000", "1350000");
        fs::write(&signed, tampered).unwrap();
        assert!(!verify(&store, &signed).unwrap());
    }
}
