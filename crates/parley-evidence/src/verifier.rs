//! Claim verification: claim text plus records in, evaluated expressions out

use std::sync::Arc;

use parley_attest::AttestedDocument;
use parley_llm::{CompletionRequest, LLMRouter, Message};
use serde::{Deserialize, Serialize};

use crate::ast::Expr;
use crate::eval::{evaluate, validate};
use crate::filter::verifiable_portion;
use crate::parser::parse_expression;
use crate::prompt::{candidate_lines, verification_request, VERIFIER_SYSTEM_PROMPT};
use crate::{EvidenceError, Result};

/// File name used when the artifact travels as an attachment
pub const ARTIFACT_FILE_NAME: &str = "verification.txt";

/// A validated, evaluated evidence expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceExpression {
    pub source_claim: String,
    pub expression: Expr,
    /// Expression text as written by the oracle
    pub text: String,
    pub evaluated_result: bool,
}

/// Evidence attached to one outgoing turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceArtifact {
    pub expressions: Vec<EvidenceExpression>,
}

impl EvidenceArtifact {
    pub fn new(expressions: Vec<EvidenceExpression>) -> Self {
        Self { expressions }
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    /// Wire form: one expression per line
    pub fn to_text(&self) -> String {
        self.expressions
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// True when every expression evaluated true
    pub fn all_hold(&self) -> bool {
        self.expressions.iter().all(|e| e.evaluated_result)
    }
}

/// Parse, validate and evaluate one expression against `records`
pub fn check_expression(
    source_claim: &str,
    text: &str,
    records: &[AttestedDocument],
) -> Result<EvidenceExpression> {
    let expression = parse_expression(text)?;
    validate(&expression, records)?;
    let evaluated_result = evaluate(&expression, records)?;

    Ok(EvidenceExpression {
        source_claim: source_claim.to_string(),
        expression,
        text: text.to_string(),
        evaluated_result,
    })
}

/// Re-check a received artifact (newline-delimited text) against local records.
///
/// Lines that fail to parse, reference missing data or fail to evaluate
/// are dropped and logged.
pub fn check_artifact(artifact_text: &str, records: &[AttestedDocument]) -> EvidenceArtifact {
    EvidenceArtifact::new(collect_valid("", candidate_lines(artifact_text), records))
}

fn collect_valid(
    claim: &str,
    candidates: Vec<String>,
    records: &[AttestedDocument],
) -> Vec<EvidenceExpression> {
    candidates
        .into_iter()
        .enumerate()
        .filter_map(|(line, text)| match check_expression(claim, &text, records) {
            Ok(expression) => Some(expression),
            Err(e) => {
                tracing::warn!(line, expression = %text, error = %e, "Dropped evidence expression");
                None
            }
        })
        .collect()
}

/// Turns claims into minimal evidence expressions over attested records
pub struct ClaimVerifier {
    oracle: Arc<LLMRouter>,
}

impl ClaimVerifier {
    pub fn new(oracle: Arc<LLMRouter>) -> Self {
        Self { oracle }
    }

    /// Derive evidence for `claim_text`.
    ///
    /// Returns an empty list (not an error) when there are no records, when
    /// the claim is purely aspirational or when the oracle offers nothing
    /// usable. Only oracle failures are errors.
    pub async fn verify_claim(
        &self,
        claim_text: &str,
        records: &[AttestedDocument],
    ) -> Result<Vec<EvidenceExpression>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let Some(verifiable) = verifiable_portion(claim_text) else {
            tracing::debug!("Claim is aspirational, no evidence derived");
            return Ok(Vec::new());
        };

        let request = CompletionRequest::new(vec![Message::user(verification_request(
            &verifiable,
            records,
        ))])
        .with_system(VERIFIER_SYSTEM_PROMPT)
        .with_temperature(0.0);

        let reply = self
            .oracle
            .complete_text(request)
            .await
            .map_err(EvidenceError::Oracle)?;

        let expressions = collect_valid(claim_text, candidate_lines(&reply), records);
        tracing::info!(
            expressions = expressions.len(),
            records = records.len(),
            "Claim verified"
        );
        Ok(expressions)
    }
}
