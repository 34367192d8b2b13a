//! Oracle prompt for evidence generation

use parley_attest::{payloads_json, AttestedDocument};

pub const VERIFIER_SYSTEM_PROMPT: &str = r#"You are a verification assistant. You emit ONLY boolean evidence expressions, one per line, with no comments, no markdown and no other text.

Emit expressions only when the claim contains verifiable statements about EXISTING offers or terms in the provided records. If it does not, output nothing. Never verify what the speaker wants, requests or is willing to do: phrases such as "I'm willing to", "I am looking for", "How about" or "I'd need" mark claims you must skip.

Grammar (nothing else is allowed):
- record fields: records[i].field_name, nested as records[i].outer.inner, or records[i]['field name']
- literals: numbers (1250000), strings ('cash'), true, false
- comparisons: <, <=, >, >=, ==, != (chains like 1200000 < x < 1400000 are allowed)
- boolean: and, or, not
- arithmetic: +, -, *, /
- aggregates over explicit arguments: average(...), sum(...), count(...), min(...), max(...)

Rules:
- Use explicit indices; index i refers to the i-th record below.
- Reference only fields that exist in the referenced record.
- Each expression must evaluate to true when the claim matches the data.
- For ranges or aggregates, write the smallest expression that proves the claim; do not mention unrelated fields.
- Approximate amounts ("around", "about") become a range around the stated figure.

Examples
Claim: "Your offer is well below the offers I've received, which are above $1.2 million."
records[0].offer_amount > 1200000
records[1].offer_amount > 1200000

Claim: "The average offer I've received is around $1.35 million."
1300000 < average(records[0].offer_amount, records[1].offer_amount) < 1400000

Claim: "I'd like to close within 30 days."
(no output)"#;

/// User message carrying the claim and the indexed record payloads
pub fn verification_request(claim: &str, records: &[AttestedDocument]) -> String {
    let rendered =
        serde_json::to_string_pretty(&payloads_json(records)).unwrap_or_else(|_| "[]".to_string());

    format!(
        "Claim to verify:\n{}\n\nRecords (records[0] is the first element):\n{}",
        claim, rendered
    )
}

/// Split an oracle reply into candidate expression texts.
///
/// Code fences and blank lines are dropped; a line with unbalanced
/// parentheses continues onto the next.
pub fn candidate_lines(reply: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    let mut pending = String::new();
    let mut depth: i32 = 0;

    for line in reply.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("```") || line.starts_with('#') {
            continue;
        }
        if pending.is_empty() && is_empty_marker(line) {
            continue;
        }

        if !pending.is_empty() {
            pending.push(' ');
        }
        pending.push_str(line);
        depth += paren_balance(line);

        if depth <= 0 {
            candidates.push(std::mem::take(&mut pending));
            depth = 0;
        }
    }

    if !pending.is_empty() {
        candidates.push(pending);
    }
    candidates
}

fn paren_balance(line: &str) -> i32 {
    let mut balance = 0;
    let mut quote: Option<char> = None;
    for c in line.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => balance += 1,
            (None, ')') => balance -= 1,
            _ => {}
        }
    }
    balance
}

fn is_empty_marker(line: &str) -> bool {
    matches!(
        line.to_lowercase().as_str(),
        "none" | "(no output)" | "no output" | "n/a"
    )
}
