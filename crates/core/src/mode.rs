//! Generation modes and the result shapes they expect.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What kind of result a submission is expected to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Conversational answers.
    #[default]
    Tutor,
    /// Generated application code or projects.
    Builder,
    /// Drawing canvas.
    Canvas,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tutor => "tutor",
            Self::Builder => "builder",
            Self::Canvas => "canvas",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tutor" => Ok(Self::Tutor),
            "builder" => Ok(Self::Builder),
            "canvas" => Ok(Self::Canvas),
            other => Err(format!("unknown mode '{other}' (expected tutor, builder or canvas)")),
        }
    }
}

/// The shape the response decoder should expect from raw backend text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedShape {
    Text,
    SingleFile,
    MultiFileList,
}

impl ExpectedShape {
    /// Builder output shape for a framework hint: plain HTML is a single
    /// document, component frameworks produce a project.
    pub fn for_framework(framework: &str) -> Self {
        match framework.trim().to_ascii_lowercase().as_str() {
            "" | "html" | "vanilla" | "static" => Self::SingleFile,
            _ => Self::MultiFileList,
        }
    }

    /// Shape for a mode, given the builder framework hint.
    pub fn for_mode(mode: Mode, framework: &str) -> Self {
        match mode {
            Mode::Builder => Self::for_framework(framework),
            Mode::Tutor | Mode::Canvas => Self::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Builder".parse::<Mode>().unwrap(), Mode::Builder);
        assert!("painter".parse::<Mode>().is_err());
    }

    #[test]
    fn framework_selects_shape() {
        assert_eq!(ExpectedShape::for_framework("html"), ExpectedShape::SingleFile);
        assert_eq!(ExpectedShape::for_framework("react"), ExpectedShape::MultiFileList);
        assert_eq!(ExpectedShape::for_mode(Mode::Tutor, "react"), ExpectedShape::Text);
    }
}
