//! Token-budget truncation of conversation history.
//!
//! Keeps the longest most-recent suffix whose estimated cost fits what is
//! left after the system and prompt reservations. Order is never changed.

use super::token::TokenEstimator;
use forgeline_core::message::Message;

/// Appended to a message whose content was cut to fit.
pub const TRUNCATION_MARKER: &str = "\n…[truncated]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    pub total: usize,
    pub reserved_system: usize,
    pub reserved_prompt: usize,
}

impl TokenBudget {
    pub fn new(total: usize, reserved_system: usize, reserved_prompt: usize) -> Self {
        Self {
            total,
            reserved_system,
            reserved_prompt,
        }
    }

    /// Tokens left for history.
    pub fn available(&self) -> usize {
        self.total
            .saturating_sub(self.reserved_system)
            .saturating_sub(self.reserved_prompt)
    }
}

/// Bounded, order-preserving suffix of `history`.
///
/// Walks newest to oldest and stops at the first message that does not fit.
/// If even the newest message does not fit, it is kept with its content cut
/// down (code and attachments dropped) and `TRUNCATION_MARKER` appended.
pub fn truncate(
    history: &[Message],
    budget: &TokenBudget,
    estimator: &dyn TokenEstimator,
) -> Vec<Message> {
    let available = budget.available();
    if available == 0 || history.is_empty() {
        return Vec::new();
    }

    let mut used = 0;
    let mut start = history.len();
    for (i, message) in history.iter().enumerate().rev() {
        let cost = estimator.message_cost(message);
        if used + cost > available {
            break;
        }
        used += cost;
        start = i;
    }

    if start < history.len() {
        return history[start..].to_vec();
    }

    // Nothing fit: keep a cut-down copy of the newest message
    let Some(newest) = history.last() else {
        return Vec::new();
    };
    match cut_to_fit(&newest.content, available, estimator) {
        Some(content) => {
            let mut cut = newest.clone();
            cut.content = content;
            cut.code = None;
            cut.attachments.clear();
            vec![cut]
        }
        None => Vec::new(),
    }
}

/// Longest prefix of `content` that fits `available` together with the marker.
fn cut_to_fit(content: &str, available: usize, estimator: &dyn TokenEstimator) -> Option<String> {
    let boundaries: Vec<usize> = content
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(content.len()))
        .collect();

    let with_marker = |chars: usize| format!("{}{TRUNCATION_MARKER}", &content[..boundaries[chars]]);
    let fits = |chars: usize| estimator.estimate(&with_marker(chars)) <= available;

    if !fits(0) {
        return None;
    }

    // Largest prefix length (in chars) that still fits
    let (mut lo, mut hi) = (0, boundaries.len() - 1);
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Some(with_marker(lo))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::token::CharRatioEstimator;

    fn history(sizes: &[usize]) -> Vec<Message> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, n)| Message::user(i as u64 + 1, "x".repeat(*n)))
            .collect()
    }

    fn est() -> CharRatioEstimator {
        CharRatioEstimator::default()
    }

    #[test]
    fn keeps_everything_when_it_fits() {
        let h = history(&[40, 40, 40]); // 10 tokens each
        let out = truncate(&h, &TokenBudget::new(100, 10, 10), &est());
        assert_eq!(out, h);
    }

    #[test]
    fn drops_oldest_first() {
        let h = history(&[40, 40, 40]);
        // 25 available: newest two fit (20), the third would make 30
        let out = truncate(&h, &TokenBudget::new(45, 10, 10), &est());
        let ids: Vec<u64> = out.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn stops_at_first_overflow() {
        // Oldest is tiny but sits behind a large message: not included
        let h = history(&[4, 400, 40]);
        let out = truncate(&h, &TokenBudget::new(30, 0, 0), &est());
        let ids: Vec<u64> = out.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn zero_available_is_empty() {
        let h = history(&[4]);
        assert!(truncate(&h, &TokenBudget::new(10, 6, 4), &est()).is_empty());
        assert!(truncate(&h, &TokenBudget::new(10, 20, 0), &est()).is_empty());
    }

    #[test]
    fn oversized_newest_is_cut_with_marker() {
        let h = history(&[4, 4000]);
        let budget = TokenBudget::new(50, 0, 0);
        let out = truncate(&h, &budget, &est());

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 2);
        assert!(out[0].content.ends_with(TRUNCATION_MARKER));
        assert!(est().message_cost(&out[0]) <= budget.available());
        // As much as possible was kept
        assert!(out[0].content.len() > 150);
    }

    #[test]
    fn budget_too_small_for_marker_is_empty() {
        let h = history(&[4000]);
        assert!(truncate(&h, &TokenBudget::new(2, 0, 0), &est()).is_empty());
    }

    #[test]
    fn cut_respects_char_boundaries() {
        let h = vec![Message::user(1, "é".repeat(500))];
        let out = truncate(&h, &TokenBudget::new(20, 0, 0), &est());
        assert_eq!(out.len(), 1);
        assert!(out[0].content.starts_with('é'));
    }

    #[test]
    fn result_is_a_suffix_within_budget() {
        let h = history(&[12, 80, 3, 51, 7, 33, 2, 19]);
        for total in [0, 5, 10, 20, 40, 80, 200] {
            let budget = TokenBudget::new(total, 2, 1);
            let out = truncate(&h, &budget, &est());
            let cost: usize = out.iter().map(|m| est().message_cost(m)).sum();
            assert!(cost <= budget.available());
            if let Some(first) = out.first() {
                let start = h.iter().position(|m| m.id == first.id).unwrap();
                assert_eq!(out.len(), h.len() - start);
            }
        }
    }
}
