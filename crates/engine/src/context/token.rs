//! Token estimation.
//!
//! The default heuristic is ~4 characters per token, rounded up. It is not
//! meant to match any tokenizer exactly, only to be consistent so budgets
//! behave predictably. Swap in another `TokenEstimator` for real counts.

use forgeline_core::message::Message;

pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;

    /// Cost of a message as it is sent to a backend: content, code, and
    /// every attachment's content.
    fn message_cost(&self, message: &Message) -> usize {
        let code = message.code.as_deref().map_or(0, |c| self.estimate(c));
        let attachments: usize = message
            .attachments
            .iter()
            .map(|a| self.estimate(&a.content))
            .sum();
        self.estimate(&message.content) + code + attachments
    }
}

/// `ceil(chars / chars_per_token)`.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    pub chars_per_token: usize,
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self { chars_per_token: 4 }
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        let chars = text.chars().count();
        chars.div_ceil(self.chars_per_token.max(1))
    }
}
