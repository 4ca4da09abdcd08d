//! System prompts per mode and output shape.

use forgeline_core::mode::{ExpectedShape, Mode};

const TUTOR: &str = "You are a patient programming tutor. Explain concepts step by step, \
use short examples, and answer in the language the user writes in. \
Do not produce full applications unless asked.";

const CANVAS: &str = "You are looking at a drawing the user made on a canvas. \
Describe what it shows, interpret what the user is trying to express, \
and answer any question they ask about it.";

const SINGLE_FILE: &str = "You are a front-end engineer. Produce ONE complete, self-contained \
HTML document (inline CSS and JavaScript) that fulfils the request. \
Return it inside a single ```html fenced block. \
Keep any explanation short and outside the block.";

const MULTI_FILE: &str = "You are a front-end engineer. Produce a complete project that fulfils \
the request. Respond with JSON only, in the form \
{\"files\": [{\"path\": \"...\", \"content\": \"...\", \"fileType\": \"page|component|style|config|other\"}], \
\"entryPath\": \"...\"}. Paths are relative to the project root.";

const IMAGE_HINT: &str = "The user asked for an image. If you cannot generate images, \
describe the image in detail instead, or produce an SVG when code output is expected.";

const EXPLORATION: &str = "Summarize the existing project below for an engineer who will modify it. \
List the files that matter, the framework and styling approach, and the main sections or \
components. Be brief.";

/// System prompt for a generation.
pub fn system_prompt(mode: Mode, shape: ExpectedShape, framework: &str, image_request: bool) -> String {
    let mut prompt = match (mode, shape) {
        (Mode::Builder, ExpectedShape::MultiFileList) => {
            format!("{MULTI_FILE}\nTarget framework: {framework}.")
        }
        (Mode::Builder, _) => SINGLE_FILE.to_string(),
        (Mode::Canvas, _) => CANVAS.to_string(),
        (Mode::Tutor, _) => TUTOR.to_string(),
    };
    if image_request {
        prompt.push_str("\n\n");
        prompt.push_str(IMAGE_HINT);
    }
    prompt
}

pub fn exploration_prompt() -> &'static str {
    EXPLORATION
}

/// Prompt used when the user sent only attachments or images.
pub fn default_prompt(mode: Mode, has_images: bool) -> &'static str {
    match (mode, has_images) {
        (Mode::Canvas, _) => "What does my drawing show?",
        (_, true) => "Describe the attached image.",
        (_, false) => "Summarize the attached content.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_multi_file_names_framework() {
        let p = system_prompt(Mode::Builder, ExpectedShape::MultiFileList, "react", false);
        assert!(p.contains("JSON"));
        assert!(p.contains("react"));
    }

    #[test]
    fn image_hint_is_appended() {
        let p = system_prompt(Mode::Tutor, ExpectedShape::Text, "html", true);
        assert!(p.starts_with(TUTOR));
        assert!(p.contains("asked for an image"));
    }
}
