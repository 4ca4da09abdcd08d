//! # Forgeline Core
//!
//! Domain types, collaborator traits, and error definitions for the Forgeline
//! generation workspace. This crate has **no framework dependencies**: it defines
//! the model every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (generation backends, session persistence, usage
//! accounting) is a trait here. Implementations live in their own crates, so the
//! orchestrator can be driven by real backends or by scripted test doubles.

pub mod error;
pub mod event;
pub mod message;
pub mod mode;
pub mod project;
pub mod provider;
pub mod result;
pub mod session;

// Re-export key types at crate root for ergonomics
pub use error::{FailureKind, FileError, ProviderError, StoreError, SubmitError};
pub use event::{DomainEvent, EventBus};
pub use message::{Attachment, ImageBlob, Message, MessageId, Role};
pub use mode::{ExpectedShape, Mode};
pub use project::{FileType, ProjectFile};
pub use provider::{GenerationRequest, ProviderGateway, ProviderId, RawBackendResult};
pub use result::{GeneratedFile, GenerationResult};
pub use session::{SessionId, SessionStore, UsageTracker};
