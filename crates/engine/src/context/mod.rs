//! Conversational context: the bounded memory window and the token-budget
//! truncation applied to it before every attempt.
//!
//! | Piece | Bound | Trim strategy |
//! |-------|-------|---------------|
//! | Memory window | N most recent messages | Oldest evicted, wiped at the daily cutoff |
//! | Truncated history | Provider token budget | Oldest dropped, newest cut to fit |

pub mod memory;
pub mod token;
pub mod truncate;

pub use memory::{ConversationMemory, ResetSchedule, spawn_reset_poller};
pub use token::{CharRatioEstimator, TokenEstimator};
pub use truncate::{TRUNCATION_MARKER, TokenBudget, truncate};
