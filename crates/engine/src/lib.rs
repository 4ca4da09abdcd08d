//! The generation engine: everything between "the user typed something" and
//! "a structured, displayable result exists".
//!
//! 1. **Classify** the request into a mode (tutor, builder, canvas)
//! 2. **Recall** the conversation window and truncate it to the provider budget
//! 3. **Explore** the existing project when building on top of it
//! 4. **Generate** through the fallback chain (retry truncated, then fallback provider)
//! 5. **Decode** the raw text into a typed result
//! 6. **Apply** builder results to the project and snapshot a version

pub mod context;
pub mod decoder;
pub mod intent;
pub mod orchestrator;
pub mod prompts;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{
    CharRatioEstimator, ConversationMemory, ResetSchedule, TokenBudget, TokenEstimator,
    spawn_reset_poller, truncate,
};
pub use decoder::decode;
pub use intent::{Classification, IntentContext, classify, classify_with, is_image_generation_request};
pub use orchestrator::{
    Generation, GenerationState, InvalidTransition, Orchestrator, Signal, SubmitInput, transition,
};
