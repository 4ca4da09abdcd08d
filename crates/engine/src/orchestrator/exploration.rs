//! Project exploration before a builder request on an existing project.
//!
//! Two levels:
//! - **Deterministic**: a summary built from the files themselves
//! - **LLM-assisted** (`multi_step`): the gateway summarizes the project,
//!   through the same fallback chain as the main request
//!
//! Both are bounded by a timeout. On timeout or failure the request goes
//! out with a minimal file-list summary instead.

use forgeline_core::error::ProviderError;
use forgeline_core::mode::{ExpectedShape, Mode};
use forgeline_core::project::{FileType, ProjectFile};
use forgeline_core::provider::GenerationRequest;
use forgeline_core::result::GenerationResult;
use forgeline_providers::fallback::FallbackChain;
use forgeline_providers::router::GatewayRouter;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::decoder::decode;
use crate::prompts;

/// Characters of each file shown to the LLM summarizer.
const EXCERPT_CHARS: usize = 1_500;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorationResult {
    pub summary: String,
    pub used_llm: bool,
    /// The minimal file-list summary was used.
    pub fell_back: bool,
    pub duration_ms: u64,
}

pub struct Explorer<'a> {
    pub router: &'a GatewayRouter,
    pub chain: &'a FallbackChain,
    pub multi_step: bool,
    pub timeout: Duration,
}

impl Explorer<'_> {
    pub async fn explore(&self, files: &[ProjectFile], entry: Option<&str>) -> ExplorationResult {
        let start = Instant::now();
        let attempt = async {
            if self.multi_step {
                self.llm_summary(files, entry).await.map(|s| (s, true))
            } else {
                Ok((deterministic_summary(files, entry), false))
            }
        };

        let (summary, used_llm, fell_back) = match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok((summary, used_llm))) => (summary, used_llm, false),
            Ok(Err(e)) => {
                warn!(error = %e, "Exploration failed, using file list");
                (fallback_summary(files, entry), false, true)
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Exploration timed out, using file list");
                (fallback_summary(files, entry), false, true)
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(files = files.len(), used_llm, fell_back, duration_ms, "Exploration finished");
        ExplorationResult {
            summary,
            used_llm,
            fell_back,
            duration_ms,
        }
    }

    async fn llm_summary(&self, files: &[ProjectFile], entry: Option<&str>) -> Result<String, ProviderError> {
        let base = GenerationRequest {
            prompt: project_listing(files, entry),
            history: Vec::new(),
            mode: Mode::Tutor,
            provider: self.router.default_provider().clone(),
            system_prompt: prompts::exploration_prompt().to_string(),
            images: Vec::new(),
            framework_hint: String::new(),
            reasoning: false,
            project_context: None,
            image_request: false,
            expected_shape: ExpectedShape::Text,
        };

        let success = self
            .chain
            .run(|strategy, _cause| {
                let request = base.retarget(strategy.provider.clone(), Vec::new());
                let gateway = self.router.get(&strategy.provider);
                async move {
                    match gateway {
                        Some(gateway) => gateway.generate(request).await,
                        None => Err(ProviderError::NotConfigured(format!(
                            "no gateway registered for '{}'",
                            request.provider
                        ))),
                    }
                }
            })
            .await
            .map_err(|failure| failure.error)?;

        match decode(&success.value.text, ExpectedShape::Text) {
            GenerationResult::Text { content } => Ok(content),
            other => Err(ProviderError::Unknown(format!(
                "unusable exploration summary: {}",
                other.display_text()
            ))),
        }
    }
}

/// Summary computed from the files alone.
pub fn deterministic_summary(files: &[ProjectFile], entry: Option<&str>) -> String {
    let mut out = String::new();
    out.push_str(&format!("Project with {} file(s).", files.len()));
    if let Some(entry) = entry {
        out.push_str(&format!(" Entry: {entry}."));
    }

    let stack = detect_stack(files);
    if !stack.is_empty() {
        out.push_str(&format!("\nStack: {}.", stack.into_iter().collect::<Vec<_>>().join(", ")));
    }

    out.push_str("\nFiles:");
    for file in files {
        out.push_str(&format!(
            "\n- {} ({}, {} lines)",
            file.path,
            file_type_name(file.file_type),
            file.content.lines().count()
        ));
        let headings = headings(&file.content);
        if !headings.is_empty() {
            out.push_str(&format!(": {}", headings.join(" / ")));
        }
    }
    out
}

/// File list only.
pub fn fallback_summary(files: &[ProjectFile], entry: Option<&str>) -> String {
    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    match entry {
        Some(entry) => format!("Existing files: {} (entry: {entry})", paths.join(", ")),
        None => format!("Existing files: {}", paths.join(", ")),
    }
}

fn project_listing(files: &[ProjectFile], entry: Option<&str>) -> String {
    let mut out = fallback_summary(files, entry);
    for file in files {
        let excerpt: String = file.content.chars().take(EXCERPT_CHARS).collect();
        out.push_str(&format!("\n\n=== {} ===\n{excerpt}", file.path));
        if file.content.chars().count() > EXCERPT_CHARS {
            out.push_str("\n...");
        }
    }
    out
}

fn detect_stack(files: &[ProjectFile]) -> BTreeSet<&'static str> {
    let mut stack = BTreeSet::new();
    for file in files {
        let path = file.path.to_ascii_lowercase();
        let content = file.content.to_ascii_lowercase();

        if path.ends_with(".html") || path.ends_with(".htm") {
            stack.insert("HTML");
        }
        if path.ends_with(".css") || content.contains("<style") {
            stack.insert("CSS");
        }
        if path.ends_with(".js") || content.contains("<script") {
            stack.insert("JavaScript");
        }
        if path.ends_with(".ts") || path.ends_with(".tsx") {
            stack.insert("TypeScript");
        }
        if path.ends_with(".jsx") || path.ends_with(".tsx") || content.contains("from 'react'") || content.contains("from \"react\"") {
            stack.insert("React");
        }
        if path.ends_with(".vue") {
            stack.insert("Vue");
        }
        if path.ends_with(".svelte") {
            stack.insert("Svelte");
        }
        if content.contains("tailwind") {
            stack.insert("Tailwind");
        }
        if path.ends_with("package.json") {
            for (dep, name) in [("\"react\"", "React"), ("\"vue\"", "Vue"), ("\"next\"", "Next.js"), ("\"vite\"", "Vite")] {
                if content.contains(dep) {
                    stack.insert(name);
                }
            }
        }
    }
    stack
}

/// `<h1>`/`<h2>` texts of a page, a rough outline of its sections.
fn headings(content: &str) -> Vec<String> {
    let lower = content.to_ascii_lowercase();
    let mut found = Vec::new();
    let mut rest = 0;
    while found.len() < 5 {
        let Some(open) = ["<h1", "<h2"]
            .iter()
            .filter_map(|tag| lower[rest..].find(tag))
            .min()
        else {
            break;
        };
        let from = rest + open;
        let Some(gt) = lower[from..].find('>') else { break };
        let text_start = from + gt + 1;
        let Some(close) = lower[text_start..].find("</h") else { break };
        let text = content[text_start..text_start + close].trim();
        if !text.is_empty() && !text.contains('<') {
            found.push(text.to_string());
        }
        rest = text_start + close;
    }
    found
}

fn file_type_name(file_type: FileType) -> &'static str {
    match file_type {
        FileType::Page => "page",
        FileType::Component => "component",
        FileType::Style => "style",
        FileType::Config => "config",
        FileType::Other => "other",
    }
}
