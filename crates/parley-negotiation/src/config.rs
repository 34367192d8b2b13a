//! Negotiation runtime settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CONTEXT_WINDOW: usize = 30;
pub const DEFAULT_REPLY_DELAY_MS: u64 = 1000;
pub const DEFAULT_TRACE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Turns kept per agent when building a reply prompt
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Pause before a generated reply is emitted
    #[serde(default = "default_reply_delay_ms")]
    pub reply_delay_ms: u64,

    /// Trace events kept per session
    #[serde(default = "default_trace_capacity")]
    pub trace_capacity: usize,
}

impl NegotiationConfig {
    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }

    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_context_window(mut self, turns: usize) -> Self {
        self.context_window = turns;
        self
    }
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            reply_delay_ms: default_reply_delay_ms(),
            trace_capacity: default_trace_capacity(),
        }
    }
}

fn default_context_window() -> usize {
    DEFAULT_CONTEXT_WINDOW
}

fn default_reply_delay_ms() -> u64 {
    DEFAULT_REPLY_DELAY_MS
}

fn default_trace_capacity() -> usize {
    DEFAULT_TRACE_CAPACITY
}
