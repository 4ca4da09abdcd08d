//! Response decoding: raw backend text to a typed `GenerationResult`.
//!
//! Total and deterministic. Backends sometimes answer with an error envelope
//! or an error element instead of content. Those are recognised only when
//! they are the whole payload: markup inside a fenced block or a full
//! document is generated content, whatever classes it uses.

use forgeline_core::error::FailureKind;
use forgeline_core::mode::ExpectedShape;
use forgeline_core::project::FileType;
use forgeline_core::result::{GeneratedFile, GenerationResult};
use regex_lite::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Attributes the generation service puts on the element wrapping an error
/// response.
const ERROR_SIGNATURES: &[&str] = &[
    r#"class="error-message""#,
    "class='error-message'",
    r#"class="generation-error""#,
    r#"data-error="true""#,
];

/// Signatures no generated app uses; the only ones trusted inside project files.
const SENTINEL_SIGNATURES: &[&str] = &[r#"class="generation-error""#, r#"data-error="true""#];

static ERROR_ENVELOPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"^\s*\{\s*"error"\s*:"#).ok());
static INLINE_ERROR_TOKENS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\[\[error\]\]|\[error\]").ok());
static TAGS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]*>").ok());

pub fn decode(raw: &str, shape: ExpectedShape) -> GenerationResult {
    if let Some(message) = backend_error(raw, ERROR_SIGNATURES) {
        return GenerationResult::error(FailureKind::BackendError, message);
    }
    match shape {
        ExpectedShape::Text => decode_text(raw),
        ExpectedShape::SingleFile => decode_single_file(raw),
        ExpectedShape::MultiFileList => decode_multi_file(raw),
    }
}

// --- Error payloads ---

/// Readable message if `raw` is an error payload rather than content.
fn backend_error(raw: &str, signatures: &[&str]) -> Option<String> {
    if ERROR_ENVELOPE.as_ref().is_some_and(|re| re.is_match(raw)) {
        return Some(envelope_message(raw));
    }
    if is_error_element(raw, signatures) {
        let text = readable_text(raw);
        return Some(if text.is_empty() {
            "The generation service returned an error.".to_string()
        } else {
            text
        });
    }
    None
}

/// The payload is a bare element whose opening tag carries an error
/// signature. Fenced code and full documents never qualify.
fn is_error_element(raw: &str, signatures: &[&str]) -> bool {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with('<') || raw.contains("```") {
        return false;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("<!doctype") || lower.starts_with("<html") {
        return false;
    }
    let Some(end) = lower.find('>') else {
        return false;
    };
    let opening = &lower[..end];
    signatures.iter().any(|sig| opening.contains(sig))
}

fn envelope_message(raw: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(raw.trim()).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));
    let message = match error {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Object(obj)) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| readable_text(raw))
}

/// Tags stripped, whitespace collapsed.
fn readable_text(raw: &str) -> String {
    let stripped = match TAGS.as_ref() {
        Some(re) => re.replace_all(raw, " ").into_owned(),
        None => raw.to_string(),
    };
    collapse_whitespace(&stripped)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// --- Text ---

fn decode_text(raw: &str) -> GenerationResult {
    let cleaned = match INLINE_ERROR_TOKENS.as_ref() {
        Some(re) => re.replace_all(raw, "").into_owned(),
        None => raw.to_string(),
    };
    let content = cleaned.trim();
    if content.is_empty() {
        return GenerationResult::error(FailureKind::EmptyOutput, "The response was empty.");
    }
    GenerationResult::Text {
        content: content.to_string(),
    }
}

// --- Single file ---

fn decode_single_file(raw: &str) -> GenerationResult {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return GenerationResult::error(FailureKind::EmptyOutput, "The response was empty.");
    }

    if let Some(block) = pick_block(&fenced_blocks(raw), &["html", "htm"]) {
        let content = block.content.trim();
        if content.is_empty() {
            return GenerationResult::error(
                FailureKind::EmptyOutput,
                "The response contained an empty code block.",
            );
        }
        let explanation = surrounding_prose(raw, &block);
        return GenerationResult::SingleFile {
            content: content.to_string(),
            explanation,
        };
    }

    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("<!doctype") || lower.starts_with("<html") {
        return GenerationResult::SingleFile {
            content: trimmed.to_string(),
            explanation: None,
        };
    }

    GenerationResult::SingleFile {
        content: scaffold(trimmed),
        explanation: None,
    }
}

/// Wrap prose in a minimal page so the preview still renders something.
fn scaffold(prose: &str) -> String {
    let paragraphs: Vec<String> = prose
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("    <p>{}</p>", escape_html(p).replace('\n', "<br>")))
        .collect();
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n  <meta charset=\"utf-8\">\n  \
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n  \
         <title>Response</title>\n</head>\n<body>\n  <main>\n{}\n  </main>\n</body>\n</html>",
        paragraphs.join("\n")
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// --- Fenced blocks ---

/// A fenced code block located by line numbers.
#[derive(Debug, Clone)]
struct FencedBlock {
    lang: String,
    content: String,
    open_line: usize,
    /// `None` when the response ended before the fence closed.
    close_line: Option<usize>,
    has_children: bool,
}

/// Parse ``` fences with nesting. A fence with a language tag always opens;
/// a bare fence closes the innermost open block, or opens one if none is open.
fn fenced_blocks(raw: &str) -> Vec<FencedBlock> {
    let lines: Vec<&str> = raw.lines().collect();
    let mut stack: Vec<(usize, String, bool)> = Vec::new();
    let mut blocks = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let Some(rest) = line.trim_start().strip_prefix("```") else {
            continue;
        };
        let lang = rest.trim().to_ascii_lowercase();
        if lang.is_empty() && !stack.is_empty() {
            if let Some((open, lang, has_children)) = stack.pop() {
                if let Some(parent) = stack.last_mut() {
                    parent.2 = true;
                }
                blocks.push(FencedBlock {
                    lang,
                    content: lines[open + 1..i].join("\n"),
                    open_line: open,
                    close_line: Some(i),
                    has_children,
                });
            }
        } else {
            stack.push((i, lang, false));
        }
    }

    // A truncated response leaves its outermost fence open
    if let Some((open, lang, has_children)) = stack.into_iter().next() {
        blocks.push(FencedBlock {
            lang,
            content: lines[open + 1..].join("\n"),
            open_line: open,
            close_line: None,
            has_children,
        });
    }
    blocks
}

/// Innermost block, preferring the given languages, then the longest.
fn pick_block(blocks: &[FencedBlock], preferred: &[&str]) -> Option<FencedBlock> {
    let leaves: Vec<&FencedBlock> = blocks.iter().filter(|b| !b.has_children).collect();
    leaves
        .iter()
        .filter(|b| preferred.contains(&b.lang.as_str()))
        .max_by_key(|b| b.content.len())
        .or_else(|| leaves.iter().max_by_key(|b| b.content.len()))
        .map(|b| (*b).clone())
}

/// Prose before and after `block`, fence lines removed.
fn surrounding_prose(raw: &str, block: &FencedBlock) -> Option<String> {
    let lines: Vec<&str> = raw.lines().collect();
    let end = block.close_line.unwrap_or(lines.len());
    let outside = lines
        .iter()
        .enumerate()
        .filter(|(i, _)| *i < block.open_line || *i > end)
        .map(|(_, l)| *l)
        .filter(|l| !l.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");
    let prose = outside.trim();
    (!prose.is_empty()).then(|| prose.to_string())
}

// --- Multi file ---

fn decode_multi_file(raw: &str) -> GenerationResult {
    if raw.trim().is_empty() {
        return GenerationResult::error(FailureKind::EmptyOutput, "The response was empty.");
    }

    let Some(value) = json_candidates(raw)
        .into_iter()
        .find_map(|c| serde_json::from_str::<Value>(&c).ok())
    else {
        return GenerationResult::error(
            FailureKind::MalformedOutput,
            "The response was not a valid project file list.",
        );
    };

    let (items, entry) = match &value {
        Value::Array(items) => (items.as_slice(), None),
        Value::Object(obj) => match obj.get("files") {
            Some(Value::Array(items)) => (
                items.as_slice(),
                ["entryPath", "entry_path", "entry"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(Value::as_str)),
            ),
            _ => {
                return GenerationResult::error(
                    FailureKind::MalformedOutput,
                    "The response had no \"files\" list.",
                );
            }
        },
        _ => {
            return GenerationResult::error(
                FailureKind::MalformedOutput,
                "The response was not a project file list.",
            );
        }
    };

    let mut files: Vec<GeneratedFile> = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(file) = parse_file(item) else {
            return GenerationResult::error(
                FailureKind::MalformedOutput,
                format!("File #{} is missing a path or content.", i + 1),
            );
        };
        if let Some(message) = backend_error(&file.content, SENTINEL_SIGNATURES) {
            return GenerationResult::error(
                FailureKind::BackendError,
                format!("{}: {message}", file.path),
            );
        }
        // Later duplicates overwrite in place
        match files.iter_mut().find(|f| f.path == file.path) {
            Some(existing) => *existing = file,
            None => files.push(file),
        }
    }

    let Some(first) = files.first() else {
        return GenerationResult::error(FailureKind::EmptyOutput, "The project file list was empty.");
    };

    let entry_path = entry
        .filter(|e| files.iter().any(|f| f.path == *e))
        .unwrap_or(first.path.as_str())
        .to_string();

    GenerationResult::MultiFile { files, entry_path }
}

/// Strings worth trying as JSON, most specific first.
fn json_candidates(raw: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    let blocks = fenced_blocks(raw);
    if let Some(block) = pick_block(&blocks, &["json"]) {
        candidates.push(block.content.trim().to_string());
    }
    let trimmed = raw.trim();
    candidates.push(trimmed.to_string());

    // Prose around a bare JSON body
    let start = trimmed.find(['{', '[']);
    let end = trimmed.rfind(['}', ']']);
    if let (Some(start), Some(end)) = (start, end)
        && start < end
    {
        candidates.push(trimmed[start..=end].to_string());
    }
    candidates
}

fn parse_file(item: &Value) -> Option<GeneratedFile> {
    let path = item.get("path")?.as_str()?.trim();
    let content = item.get("content")?.as_str()?;
    if path.is_empty() {
        return None;
    }
    let file_type = ["fileType", "file_type", "type"]
        .iter()
        .find_map(|k| item.get(*k))
        .and_then(|v| serde_json::from_value::<FileType>(v.clone()).ok())
        .unwrap_or_else(|| FileType::infer(path));
    Some(GeneratedFile {
        path: path.to_string(),
        content: content.to_string(),
        file_type,
    })
}
