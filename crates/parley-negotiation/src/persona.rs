//! Negotiator personas and prompt layout

use serde::{Deserialize, Serialize};

pub const KICKOFF_INSTRUCTION: &str =
    "The negotiation has started. Please begin by introducing yourself and stating your position.";

pub const NO_BRIEFING: &str = "No briefing information available.";

const BRIEFING_HEADER: &str = "----(BRIEFING INFORMATION)------";

const NEGOTIATOR_GUIDELINES: &str = "a strategic and motivated negotiator focused on maximizing your own value and outcomes. Use your briefing information carefully during negotiations.

Guidelines for negotiation:
1. Strategically leverage briefing data without disclosing exact figures. Use ranges, averages or approximate figures (e.g. \"I have an offer above $5 million\" instead of stating exact amounts).
2. Always be truthful. Do not fabricate information.
3. Be cautious about over-revealing. Share information in a way that strengthens your negotiating position.
4. Maintain constructive dialogue to facilitate progress.
5. Ask clarifying questions to understand the other party's position and intentions.

Keep all responses concise and under 100 words. Work towards the final goal of drafting a deal.";

/// System-prompt persona for one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    text: String,
}

impl Persona {
    /// Built-in negotiator persona addressed to `name`
    pub fn negotiator(name: &str) -> Self {
        Self {
            text: format!("You are {}, {}", name, NEGOTIATOR_GUIDELINES),
        }
    }

    pub fn custom(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Persona, then the briefing block
    pub fn system_prompt(&self, narrative: &str) -> String {
        let briefing = if narrative.trim().is_empty() {
            NO_BRIEFING
        } else {
            narrative
        };
        format!("{}\n\n{}\n\n{}\n", self.text, BRIEFING_HEADER, briefing)
    }
}

/// Announcement sent when the coin flip picks the first speaker
pub fn coin_flip_announcement(first_speaker: &str) -> String {
    format!(
        "A coin has been flipped! {name} will speak first.\n\n{name} will start the negotiation.",
        name = first_speaker
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_layout() {
        let persona = Persona::negotiator("Seller");
        let prompt = persona.system_prompt("");
        assert!(prompt.starts_with("You are Seller, a strategic"));
        assert!(prompt.contains("----(BRIEFING INFORMATION)------\n\nNo briefing information available."));

        let prompt = persona.system_prompt("Offer A: $1.2M");
        assert!(prompt.ends_with("Offer A: $1.2M\n"));
    }

    #[test]
    fn test_announcement_names_speaker() {
        assert!(coin_flip_announcement("Buyer").starts_with("A coin has been flipped! Buyer will speak first."));
    }
}
