//! Registered agent state

use parley_attest::BriefingStore;

use crate::ids::AgentId;
use crate::persona::Persona;

/// One negotiating agent: display name, persona and briefing
#[derive(Debug, Clone)]
pub struct AgentState {
    pub id: AgentId,
    pub name: String,
    pub persona: Persona,
    pub briefing: BriefingStore,
}

impl AgentState {
    pub fn new(name: impl Into<String>, persona: Persona) -> Self {
        Self {
            id: AgentId::new(),
            name: name.into(),
            persona,
            briefing: BriefingStore::new(),
        }
    }

    /// System prompt for this agent's next reply
    pub fn system_prompt(&self) -> String {
        self.persona.system_prompt(self.briefing.narrative())
    }
}
