//! Per-session audit trail

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceStage {
    Created,
    Started,
    Turn,
    Reply,
    Evidence,
    Escalation,
    Ignored,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub timestamp: DateTime<Utc>,
    pub stage: TraceStage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Bounded event log; the oldest events are dropped past `max_entries`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTrace {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub events: Vec<TraceEvent>,
    pub max_entries: usize,
}

impl SessionTrace {
    pub fn new(session_id: SessionId, max_entries: usize) -> Self {
        Self {
            session_id,
            created_at: Utc::now(),
            events: Vec::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn record(
        &mut self,
        stage: TraceStage,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) {
        self.events.push(TraceEvent {
            timestamp: Utc::now(),
            stage,
            message: message.into(),
            data,
        });
        if self.events.len() > self.max_entries {
            let overflow = self.events.len() - self.max_entries;
            self.events.drain(0..overflow);
        }
    }

    pub fn count(&self, stage: TraceStage) -> usize {
        self.events.iter().filter(|e| e.stage == stage).count()
    }

    pub fn last(&self) -> Option<&TraceEvent> {
        self.events.last()
    }
}
