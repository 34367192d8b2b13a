//! Local screening of aspirational language
//!
//! Claims about what a party wants, proposes or is willing to do are not
//! verifiable against existing records. Such sentences are removed before
//! the oracle sees the claim.

/// Phrases marking a sentence as a request or intent rather than a fact on record
pub const ASPIRATIONAL_MARKERS: &[&str] = &[
    "i'd like",
    "i would like",
    "i am looking for",
    "i'm looking for",
    "we are looking for",
    "we're looking for",
    "how about",
    "i'd need",
    "i would need",
    "i need you to",
    "i'm willing to",
    "i am willing to",
    "we're willing to",
    "we are willing to",
    "i'd be willing",
    "would you consider",
    "would you be willing",
    "i propose",
    "i'd propose",
    "let's meet",
    "let's agree",
    "let's settle",
    "i want",
    "i'd want",
    "i'm hoping",
    "i hope",
    "i'm asking for",
    "i am asking for",
    "meet in the middle",
];

/// Whether a sentence expresses intent or a request.
///
/// Markers match whole words only, so "Kai needs" never matches "i need".
pub fn is_aspirational(sentence: &str) -> bool {
    let normalized = normalize(sentence);
    let words = words(&normalized);
    ASPIRATIONAL_MARKERS.iter().any(|marker| {
        let marker: Vec<&str> = marker.split_whitespace().collect();
        words.windows(marker.len()).any(|w| w == marker.as_slice())
    })
}

/// Keep only sentences that could describe something already on record.
///
/// Returns `None` when nothing verifiable remains.
pub fn verifiable_portion(claim: &str) -> Option<String> {
    let kept: Vec<&str> = split_sentences(claim)
        .into_iter()
        .filter(|s| !is_aspirational(s))
        .filter(|s| s.chars().any(|c| c.is_alphanumeric()))
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept.join(" "))
    }
}

/// Split on `.`, `!`, `?` followed by whitespace (or end), and on newlines.
/// Decimal points such as `$1.25` stay inside their sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '\n' => true,
            '.' | '!' | '?' => chars.peek().map_or(true, |(_, next)| next.is_whitespace()),
            _ => false,
        };
        if boundary {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn normalize(text: &str) -> String {
    text.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}

/// Words of a normalized sentence; apostrophes stay inside words
fn words(text: &str) -> Vec<&str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .collect()
}
