//! Project state and in-process collaborator stores for Forgeline.
//!
//! - `files`: the live virtual file manager for one project
//! - `versions`: append-only snapshots of that project
//! - `sessions` / `usage`: reference implementations of the core
//!   `SessionStore` and `UsageTracker` traits

pub mod files;
pub mod sessions;
pub mod usage;
pub mod versions;

pub use files::VirtualFileManager;
pub use sessions::InMemorySessionStore;
pub use usage::DailyUsageLedger;
pub use versions::{InMemoryVersionStore, Version, VersionId, VersionStore};
