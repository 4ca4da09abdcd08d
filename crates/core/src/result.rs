//! Typed generation results produced by the response decoder.

use serde::{Deserialize, Serialize};

use crate::error::FailureKind;
use crate::project::FileType;

/// One file of a multi-file result, before it is applied to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
    pub file_type: FileType,
}

/// The outcome of decoding a backend response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationResult {
    /// A conversational answer.
    Text { content: String },

    /// A single renderable document. `explanation` holds any prose the backend
    /// wrapped around the code block.
    SingleFile {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },

    /// A whole project. `entry_path` always names one of `files`.
    MultiFile {
        files: Vec<GeneratedFile>,
        entry_path: String,
    },

    Error { kind: FailureKind, message: String },

    /// Canvas mode was requested with nothing to generate; the presentation
    /// layer should open the drawing surface.
    CanvasReady,
}

impl GenerationResult {
    pub fn error(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Text to store as the assistant turn's content.
    pub fn display_text(&self) -> String {
        match self {
            Self::Text { content } => content.clone(),
            Self::SingleFile { explanation, .. } => explanation
                .clone()
                .unwrap_or_else(|| "Generated a single-page document.".to_string()),
            Self::MultiFile { files, entry_path } => {
                format!("Generated {} files (entry: {entry_path}).", files.len())
            }
            Self::Error { message, .. } => message.clone(),
            Self::CanvasReady => String::new(),
        }
    }

    /// Code to attach to the assistant turn, if any.
    pub fn code(&self) -> Option<String> {
        match self {
            Self::SingleFile { content, .. } => Some(content.clone()),
            Self::MultiFile { files, entry_path } => files
                .iter()
                .find(|f| &f.path == entry_path)
                .map(|f| f.content.clone()),
            _ => None,
        }
    }
}
