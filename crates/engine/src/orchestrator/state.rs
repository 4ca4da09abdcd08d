//! The generation state machine.
//!
//! ```text
//! Idle -> Classifying -> (Exploring) -> Requesting(P, B) -> Decoding -> Success
//!                                           |                   |
//!                                           |                   +-> Failed
//!                                           +-> RetryTruncated(P, B') --+
//!                                           +-> FallbackProvider(Q, B'') <+
//! ```
//!
//! `transition` is pure. The orchestrator feeds it signals and publishes
//! every move it makes.

use forgeline_core::error::FailureKind;
use forgeline_core::provider::ProviderId;
use forgeline_providers::fallback::{AttemptKind, Strategy};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GenerationState {
    Idle,
    Classifying,
    Exploring,
    Requesting { provider: ProviderId, budget: usize },
    RetryTruncated { provider: ProviderId, budget: usize },
    FallbackProvider { provider: ProviderId, budget: usize },
    Decoding,
    Success,
    Failed { kind: FailureKind },
}

impl GenerationState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Classifying => "classifying",
            Self::Exploring => "exploring",
            Self::Requesting { .. } => "requesting",
            Self::RetryTruncated { .. } => "retry_truncated",
            Self::FallbackProvider { .. } => "fallback_provider",
            Self::Decoding => "decoding",
            Self::Success => "success",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed { .. })
    }

    /// Waiting on a gateway call.
    pub fn is_requesting(&self) -> bool {
        matches!(
            self,
            Self::Requesting { .. } | Self::RetryTruncated { .. } | Self::FallbackProvider { .. }
        )
    }
}

impl std::fmt::Display for GenerationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requesting { provider, budget }
            | Self::RetryTruncated { provider, budget }
            | Self::FallbackProvider { provider, budget } => {
                write!(f, "{}({provider}, {budget})", self.name())
            }
            Self::Failed { kind } => write!(f, "failed({kind})"),
            _ => f.write_str(self.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Submit,
    /// Builder mode on an existing project.
    Explore,
    /// Canvas with nothing to send.
    NothingToGenerate,
    /// The fallback chain is about to try a strategy.
    Attempt(Strategy),
    /// The gateway returned raw text.
    Received,
    Decoded { failure: Option<FailureKind> },
    Abort(FailureKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition from {from} on {signal}")]
pub struct InvalidTransition {
    pub from: String,
    pub signal: String,
}

pub fn transition(state: &GenerationState, signal: &Signal) -> Result<GenerationState, InvalidTransition> {
    use GenerationState as S;

    let next = match (state, signal) {
        (S::Idle, Signal::Submit) => Some(S::Classifying),
        (S::Classifying, Signal::Explore) => Some(S::Exploring),
        (S::Classifying, Signal::NothingToGenerate) => Some(S::Success),

        (S::Classifying | S::Exploring, Signal::Attempt(s)) if s.kind == AttemptKind::Primary => {
            Some(S::Requesting {
                provider: s.provider.clone(),
                budget: s.total_budget,
            })
        }
        (S::Requesting { .. }, Signal::Attempt(s)) if s.kind == AttemptKind::RetryTruncated => {
            Some(S::RetryTruncated {
                provider: s.provider.clone(),
                budget: s.total_budget,
            })
        }
        (S::Requesting { .. } | S::RetryTruncated { .. }, Signal::Attempt(s))
            if s.kind == AttemptKind::Fallback =>
        {
            Some(S::FallbackProvider {
                provider: s.provider.clone(),
                budget: s.total_budget,
            })
        }

        (s, Signal::Received) if s.is_requesting() => Some(S::Decoding),
        (S::Decoding, Signal::Decoded { failure: None }) => Some(S::Success),
        (S::Decoding, Signal::Decoded { failure: Some(kind) }) => Some(S::Failed { kind: *kind }),

        (s, Signal::Abort(kind)) if !s.is_terminal() && *s != S::Idle => {
            Some(S::Failed { kind: *kind })
        }
        _ => None,
    };

    next.ok_or_else(|| InvalidTransition {
        from: state.to_string(),
        signal: signal_name(signal),
    })
}

fn signal_name(signal: &Signal) -> String {
    match signal {
        Signal::Submit => "submit".into(),
        Signal::Explore => "explore".into(),
        Signal::NothingToGenerate => "nothing_to_generate".into(),
        Signal::Attempt(s) => format!("attempt({}, {})", s.kind.as_str(), s.provider),
        Signal::Received => "received".into(),
        Signal::Decoded { failure: None } => "decoded(ok)".into(),
        Signal::Decoded { failure: Some(k) } => format!("decoded({k})"),
        Signal::Abort(k) => format!("abort({k})"),
    }
}
