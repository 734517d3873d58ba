//! Token usage counters.

use serde::{Deserialize, Serialize};

/// Token usage for one request, or accumulated over several.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Merge another request's usage into this one (accumulate).
    pub fn merge(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }

    /// Fold a partial update from the same request.
    ///
    /// Providers report counters piecemeal (prompt tokens up front,
    /// completion tokens at the end); non-zero fields overwrite.
    pub fn absorb(&mut self, update: &Usage) {
        if update.prompt_tokens > 0 {
            self.prompt_tokens = update.prompt_tokens;
        }
        if update.completion_tokens > 0 {
            self.completion_tokens = update.completion_tokens;
        }
        let sum = self.prompt_tokens + self.completion_tokens;
        self.total_tokens = update.total_tokens.max(sum);
    }
}
