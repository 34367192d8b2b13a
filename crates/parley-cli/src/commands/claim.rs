//! Claim commands - derive evidence for a claim, re-check a received artifact

use std::fs;
use std::path::Path;

use anyhow::Context;
use colored::*;
use parley_attest::AttestedDocument;
use parley_evidence::{check_artifact, ClaimVerifier, EvidenceArtifact, EvidenceExpression};

use crate::display;

/// Ask the oracle for evidence supporting `claim` and evaluate it
pub async fn verify(
    verifier: &ClaimVerifier,
    claim: &str,
    records: &[AttestedDocument],
    out: Option<&Path>,
) -> anyhow::Result<EvidenceArtifact> {
    display::section("Claim Verification");
    display::labeled("Claim", claim);
    display::labeled("Records", &records.len().to_string());

    let artifact = EvidenceArtifact::new(verifier.verify_claim(claim, records).await?);
    print_expressions(&artifact.expressions);

    if let (Some(out), false) = (out, artifact.is_empty()) {
        fs::write(out, artifact.to_text()).with_context(|| format!("writing {}", out.display()))?;
        display::labeled("Artifact", &out.display().to_string());
    }
    Ok(artifact)
}

/// Re-evaluate an artifact file against local records
pub fn recheck(artifact_file: &Path, records: &[AttestedDocument]) -> anyhow::Result<EvidenceArtifact> {
    let text = fs::read_to_string(artifact_file)
        .with_context(|| format!("reading {}", artifact_file.display()))?;

    display::section("Evidence Re-check");
    display::labeled("Artifact", &artifact_file.display().to_string());

    let artifact = check_artifact(&text, records);
    let offered = text.lines().filter(|l| !l.trim().is_empty()).count();
    if artifact.len() < offered {
        display::warning(&format!(
            "{} of {} lines rejected",
            offered - artifact.len(),
            offered
        ));
    }
    print_expressions(&artifact.expressions);
    Ok(artifact)
}

fn print_expressions(expressions: &[EvidenceExpression]) {
    println!();
    if expressions.is_empty() {
        display::info("No verifiable evidence for this claim");
        return;
    }

    for expression in expressions {
        if expression.evaluated_result {
            println!("  {} {}", "✓".bright_green(), expression.text.bright_white());
        } else {
            println!("  {} {}", "✗".bright_red(), expression.text.bright_red());
        }
    }

    let held = expressions.iter().filter(|e| e.evaluated_result).count();
    println!();
    display::labeled("Holds", &format!("{}/{}", held, expressions.len()));
}
