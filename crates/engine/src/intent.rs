//! Intent classification: raw user text to a generation mode.
//!
//! Pure and total. The phrase tables are bilingual (English and Indonesian)
//! and live here as data so they can grow without touching the rules.
//!
//! Priority, first match wins:
//!
//! | # | Rule | Mode |
//! |---|------|------|
//! | 1 | Explicit override | as given |
//! | 2 | Builder session with output, and an edit request | builder |
//! | 3 | Canvas trigger (exact word or phrase) | canvas |
//! | 4 | Build request (verb + web/app noun), unless it is an image request naming no web artifact | builder |
//! | 5 | Anything else | tutor |

use forgeline_core::mode::Mode;
use regex_lite::Regex;
use std::sync::LazyLock;

/// Build verbs followed (anywhere later) by something web-shaped.
const BUILD_PATTERNS: &[&str] = &[
    r"(?i)\b(build|create|make|generate|buat|buatkan|bikin|bikinin|bangun)\b.*\b(web|websites?|apps?|applications?|aplikasi|pages?|landing|sites?|situs|halaman|dashboard|portfolio|portofolio|store|toko)\b",
    r"(?i)\b(landing page|web app|single page app)\b",
];

/// Nouns that make a request about a web artifact even when it also asks
/// for images ("a landing page with photos").
const WEB_ARTIFACT_PATTERNS: &[&str] = &[
    r"(?i)(web|websites?|apps?|applications?|aplikasi|pages?|landing|sites?|situs|halaman|dashboard)",
];

/// Requests to change something that already exists.
const EDIT_PATTERNS: &[&str] = &[
    r"(?i)\b(change|modify|edit|update|add|remove|delete|replace|fix|move|rename|make it|ubah|ganti|tambah|tambahkan|hapus|perbaiki|pindahkan|jadikan)\b",
];

/// Words that open the canvas only when they are the whole message.
const CANVAS_EXACT: &[&str] = &[
    "gambar", "draw", "canvas", "kanvas", "sketch", "drawing", "menggambar", "coret",
];

/// Phrases that open the canvas wherever they appear.
const CANVAS_PHRASES: &[&str] = &[
    "open canvas",
    "open the canvas",
    "buka kanvas",
    "buka canvas",
    "drawing board",
    "papan gambar",
    "mau menggambar",
    "i want to draw",
    "let me draw",
];

const IMAGE_PATTERNS: &[&str] = &[
    r"(?i)\b(generate|create|make|draw|design|buat|buatkan|bikin|bikinin|hasilkan)\b.*\b(images?|pictures?|photos?|illustrations?|logo|gambar|foto|ilustrasi)\b",
];

static BUILD_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(BUILD_PATTERNS));
static WEB_ARTIFACT_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(WEB_ARTIFACT_PATTERNS));
static EDIT_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(EDIT_PATTERNS));
static IMAGE_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(IMAGE_PATTERNS));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

fn any_match(set: &[Regex], text: &str) -> bool {
    set.iter().any(|re| re.is_match(text))
}

/// What the classifier knows about the session besides the text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntentContext {
    /// Mode forced by the caller; skips classification.
    pub override_mode: Option<Mode>,
    /// The previous successful generation was in builder mode.
    pub builder_active: bool,
    /// The project already holds generated files.
    pub has_generated_output: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub mode: Mode,
    /// The prompt to send. Empty for a bare canvas trigger.
    pub effective_prompt: String,
    pub image_request: bool,
}

/// Classify with no session context.
pub fn classify(text: &str) -> Mode {
    classify_with(text, &IntentContext::default()).mode
}

pub fn classify_with(text: &str, ctx: &IntentContext) -> Classification {
    let trimmed = text.trim();
    let image_request = is_image_generation_request(trimmed);
    let classified = |mode: Mode, prompt: &str| Classification {
        mode,
        effective_prompt: prompt.to_string(),
        image_request,
    };

    if let Some(mode) = ctx.override_mode {
        return classified(mode, trimmed);
    }
    if trimmed.is_empty() {
        return classified(Mode::Tutor, "");
    }

    if ctx.builder_active && ctx.has_generated_output && any_match(&EDIT_RE, trimmed) {
        return classified(Mode::Builder, trimmed);
    }

    let normalized = normalize(trimmed);
    if CANVAS_EXACT.contains(&normalized.as_str()) {
        return classified(Mode::Canvas, "");
    }
    if CANVAS_PHRASES.iter().any(|p| normalized.contains(p)) {
        return classified(Mode::Canvas, trimmed);
    }

    // "a logo for my store" is an image, not a store front
    let image_only = image_request && !any_match(&WEB_ARTIFACT_RE, trimmed);
    if !image_only && any_match(&BUILD_RE, trimmed) {
        return classified(Mode::Builder, trimmed);
    }

    classified(Mode::Tutor, trimmed)
}

/// Does the text ask for an image to be generated?
pub fn is_image_generation_request(text: &str) -> bool {
    any_match(&IMAGE_RE, text)
}

/// Lowercase, collapse whitespace, drop surrounding punctuation.
fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_string()
}
