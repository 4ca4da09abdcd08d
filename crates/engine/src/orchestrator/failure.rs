//! User-facing failure wording.
//!
//! Tutor users get guidance on what to do next. Builder users get the raw
//! technical detail plus a build-log line.

use forgeline_core::error::FailureKind;
use forgeline_core::mode::Mode;

pub fn failure_message(mode: Mode, kind: FailureKind, detail: &str) -> String {
    match mode {
        Mode::Builder => format!("Generation failed [{kind}]: {detail}"),
        Mode::Tutor | Mode::Canvas => tutor_message(kind, detail),
    }
}

pub fn build_log_line(kind: FailureKind, hops: usize, detail: &str) -> String {
    format!("build failed: kind={kind} escalations={hops} detail={detail}")
}

fn tutor_message(kind: FailureKind, detail: &str) -> String {
    let (headline, advice): (&str, &[&str]) = match kind {
        FailureKind::QuotaExceeded => (
            "I couldn't answer right now because the AI service's usage limit has been reached.",
            &[
                "Wait a few minutes and send your question again.",
                "If it keeps happening, your daily quota may be used up; it resets tomorrow.",
            ],
        ),
        FailureKind::PromptTooLarge => (
            "Your message (together with our conversation so far) was too long for the AI service.",
            &[
                "Try a shorter question, or split it into parts.",
                "Remove large attachments you no longer need.",
            ],
        ),
        FailureKind::Unavailable => (
            "I couldn't reach the AI service.",
            &[
                "Check your internet connection.",
                "Try again in a moment; the service may be busy.",
            ],
        ),
        FailureKind::ProviderFailed | FailureKind::BackendError => (
            "The AI service ran into a problem while answering.",
            &["Try asking again, perhaps with slightly different wording."],
        ),
        FailureKind::EmptyOutput => (
            "The AI service sent back an empty answer.",
            &["Try rephrasing your question."],
        ),
        FailureKind::MalformedOutput => (
            "The AI service sent back an answer I couldn't read.",
            &["Try asking again."],
        ),
        FailureKind::Cancelled => ("The request was cancelled.", &[]),
    };

    let mut message = headline.to_string();
    if !advice.is_empty() {
        message.push_str("\n\nWhat you can do:");
        for line in advice {
            message.push_str("\n- ");
            message.push_str(line);
        }
    }
    if !detail.trim().is_empty() && kind != FailureKind::Cancelled {
        message.push_str("\n\nDetails: ");
        message.push_str(detail.trim());
    }
    message
}
