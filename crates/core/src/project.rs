//! Project file types shared by the file manager, the version store and the decoder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a project file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Page,
    Component,
    Style,
    Config,
    #[default]
    Other,
}

impl FileType {
    /// Best-effort classification from a path, used when a backend omits the type.
    pub fn infer(path: &str) -> Self {
        let lower = path.to_ascii_lowercase();
        let ext = lower.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
        match ext {
            "html" | "htm" => Self::Page,
            "css" | "scss" | "sass" | "less" => Self::Style,
            "json" | "toml" | "yaml" | "yml" => Self::Config,
            "jsx" | "tsx" | "vue" | "svelte" => Self::Component,
            "js" | "ts" if lower.contains("config") => Self::Config,
            "js" | "ts" if lower.contains("component") => Self::Component,
            _ => Self::Other,
        }
    }
}

/// A single file in a generated project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    /// Unique key within a project.
    pub path: String,
    pub content: String,
    pub file_type: FileType,
    pub last_modified: DateTime<Utc>,
}

impl ProjectFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>, file_type: FileType) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            file_type,
            last_modified: Utc::now(),
        }
    }
}
