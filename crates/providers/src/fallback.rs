//! Provider fallback: an ordered escalation chain with an error classifier.
//!
//! Each `Strategy` names a provider and a truncation budget, plus the error
//! classes that may escalate *into* it. When an attempt fails, the classifier
//! sorts the error into quota / size / fatal and the chain jumps to the next
//! strategy that accepts that class. Fatal errors, and errors no later
//! strategy accepts, end the chain. The chain length bounds the hop count.

use forgeline_core::error::ProviderError;
use forgeline_core::provider::ProviderId;
use std::future::Future;
use tracing::{info, warn};

/// How a provider error affects escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Usage allowance exhausted; another provider may still answer.
    Quota,
    /// Prompt or context too large; a tighter budget may fit.
    Size,
    /// Not fixable by retrying or switching provider.
    Fatal,
}

/// Default classifier for the gateway error taxonomy.
pub fn classify_provider_error(err: &ProviderError) -> ErrorClass {
    match err {
        ProviderError::QuotaExceeded(_) => ErrorClass::Quota,
        ProviderError::PromptTooLarge(_) => ErrorClass::Size,
        ProviderError::Unavailable(_)
        | ProviderError::Unknown(_)
        | ProviderError::NotConfigured(_) => ErrorClass::Fatal,
    }
}

/// Which step of the escalation a strategy represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptKind {
    Primary,
    /// Same provider, substantially smaller history budget.
    RetryTruncated,
    /// Designated low-cost provider with its own budget.
    Fallback,
}

impl AttemptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::RetryTruncated => "retry_truncated",
            Self::Fallback => "fallback",
        }
    }
}

/// One entry in the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub kind: AttemptKind,
    pub provider: ProviderId,
    /// Total estimated-token budget for this attempt.
    pub total_budget: usize,
    /// Part of `total_budget` held back for the system prompt.
    pub system_reserve: usize,
    /// Error classes from an earlier attempt that may escalate into this one.
    pub accepts: Vec<ErrorClass>,
}

impl Strategy {
    pub fn primary(provider: ProviderId, total_budget: usize, system_reserve: usize) -> Self {
        Self {
            kind: AttemptKind::Primary,
            provider,
            total_budget,
            system_reserve,
            accepts: Vec::new(),
        }
    }
}

/// A successful run: the value plus where it came from.
#[derive(Debug)]
pub struct ChainSuccess<T> {
    pub value: T,
    pub strategy: Strategy,
    /// Escalations taken before the successful attempt.
    pub hops: usize,
}

/// A failed run: the error that ended the chain.
#[derive(Debug)]
pub struct ChainFailure {
    pub error: ProviderError,
    /// Last strategy attempted (`None` for an empty chain).
    pub strategy: Option<Strategy>,
    pub hops: usize,
}

/// Ordered escalation chain.
#[derive(Clone)]
pub struct FallbackChain {
    strategies: Vec<Strategy>,
    classifier: fn(&ProviderError) -> ErrorClass,
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("strategies", &self.strategies)
            .finish_non_exhaustive()
    }
}

impl FallbackChain {
    /// Create an empty chain with a custom error classifier.
    pub fn new(classifier: fn(&ProviderError) -> ErrorClass) -> Self {
        Self {
            strategies: Vec::new(),
            classifier,
        }
    }

    /// Append a strategy.
    pub fn then(mut self, strategy: Strategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// The standard three-step chain: primary, truncate-and-retry on the same
    /// provider, then the fallback provider.
    ///
    /// The fallback step is left out when it names the primary provider.
    pub fn standard(
        primary: Strategy,
        retry_budget_ratio: f32,
        fallback: ProviderId,
        fallback_budget: usize,
        fallback_reserve: usize,
    ) -> Self {
        let retry_budget = ((primary.total_budget as f32) * retry_budget_ratio).floor() as usize;
        let retry = Strategy {
            kind: AttemptKind::RetryTruncated,
            provider: primary.provider.clone(),
            total_budget: retry_budget,
            system_reserve: primary.system_reserve.min(retry_budget),
            accepts: vec![ErrorClass::Size],
        };
        let same_provider = fallback == primary.provider;

        let mut chain = Self::new(classify_provider_error).then(primary).then(retry);
        if !same_provider {
            chain = chain.then(Strategy {
                kind: AttemptKind::Fallback,
                provider: fallback,
                total_budget: fallback_budget,
                system_reserve: fallback_reserve,
                accepts: vec![ErrorClass::Size, ErrorClass::Quota],
            });
        }
        chain
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Upper bound on escalations a run can take.
    pub fn max_hops(&self) -> usize {
        self.strategies.len().saturating_sub(1)
    }

    pub fn classify(&self, err: &ProviderError) -> ErrorClass {
        (self.classifier)(err)
    }

    /// Index of the strategy an error at `from` escalates into, if any.
    pub fn escalation(&self, from: usize, err: &ProviderError) -> Option<usize> {
        let class = self.classify(err);
        if class == ErrorClass::Fatal {
            return None;
        }
        self.strategies
            .iter()
            .enumerate()
            .skip(from + 1)
            .find(|(_, s)| s.accepts.contains(&class))
            .map(|(i, _)| i)
    }

    /// Run `attempt` against the chain until one succeeds or escalation stops.
    ///
    /// `attempt` receives the strategy to try and the error that escalated
    /// into it (`None` on the first attempt).
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<ChainSuccess<T>, ChainFailure>
    where
        F: FnMut(&Strategy, Option<&ProviderError>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let Some(first) = self.strategies.first() else {
            return Err(ChainFailure {
                error: ProviderError::NotConfigured("No strategies in fallback chain".into()),
                strategy: None,
                hops: 0,
            });
        };

        let mut index = 0;
        let mut hops = 0;
        let mut current = first;
        let mut cause: Option<ProviderError> = None;

        loop {
            info!(
                provider = %current.provider,
                attempt = current.kind.as_str(),
                budget = current.total_budget,
                hops,
                "Fallback: trying strategy"
            );

            match attempt(current, cause.as_ref()).await {
                Ok(value) => {
                    return Ok(ChainSuccess {
                        value,
                        strategy: current.clone(),
                        hops,
                    });
                }
                Err(err) => match self.escalation(index, &err) {
                    Some(next) => {
                        warn!(
                            provider = %current.provider,
                            error = %err,
                            next = %self.strategies[next].provider,
                            "Fallback: attempt failed, escalating"
                        );
                        index = next;
                        hops += 1;
                        current = &self.strategies[next];
                        cause = Some(err);
                    }
                    None => {
                        warn!(
                            provider = %current.provider,
                            error = %err,
                            hops,
                            "Fallback: attempt failed, no escalation left"
                        );
                        return Err(ChainFailure {
                            error: err,
                            strategy: Some(current.clone()),
                            hops,
                        });
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn chain() -> FallbackChain {
        FallbackChain::standard(
            Strategy::primary(ProviderId::new("primary"), 32_000, 1_000),
            0.25,
            ProviderId::new("cheap"),
            8_000,
            500,
        )
    }

    /// Replays scripted outcomes and records which strategies were tried.
    struct Script {
        outcomes: Mutex<Vec<Result<&'static str, ProviderError>>>,
        seen: Mutex<Vec<(AttemptKind, String, usize)>>,
    }

    impl Script {
        fn new(outcomes: Vec<Result<&'static str, ProviderError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn next(&self, s: &Strategy) -> Result<&'static str, ProviderError> {
            self.seen
                .lock()
                .unwrap()
                .push((s.kind, s.provider.to_string(), s.total_budget));
            self.outcomes.lock().unwrap().remove(0)
        }

        fn seen(&self) -> Vec<(AttemptKind, String, usize)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[test]
    fn standard_chain_shape() {
        let chain = chain();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.max_hops(), 2);
        assert_eq!(chain.strategies()[1].kind, AttemptKind::RetryTruncated);
        assert_eq!(chain.strategies()[1].total_budget, 8_000);
        assert_eq!(chain.strategies()[1].provider.as_str(), "primary");
    }

    #[test]
    fn fallback_omitted_when_same_provider() {
        let chain = FallbackChain::standard(
            Strategy::primary(ProviderId::new("groq"), 10_000, 100),
            0.5,
            ProviderId::new("groq"),
            10_000,
            100,
        );
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.max_hops(), 1);
    }

    #[test]
    fn escalation_rules() {
        let chain = chain();
        let quota = ProviderError::QuotaExceeded("credits".into());
        let size = ProviderError::PromptTooLarge("413".into());
        let down = ProviderError::Unavailable("503".into());

        assert_eq!(chain.escalation(0, &size), Some(1));
        assert_eq!(chain.escalation(0, &quota), Some(2));
        assert_eq!(chain.escalation(1, &size), Some(2));
        assert_eq!(chain.escalation(1, &quota), Some(2));
        assert_eq!(chain.escalation(0, &down), None);
        assert_eq!(chain.escalation(2, &quota), None);
    }

    #[tokio::test]
    async fn first_strategy_succeeds() {
        let script = Script::new(vec![Ok("done")]);
        let result = chain()
            .run(|s, _| {
                let out = script.next(s);
                async move { out }
            })
            .await
            .unwrap();
        assert_eq!(result.value, "done");
        assert_eq!(result.hops, 0);
        assert_eq!(script.seen().len(), 1);
    }

    #[tokio::test]
    async fn quota_jumps_straight_to_fallback() {
        let script = Script::new(vec![
            Err(ProviderError::QuotaExceeded("out of credits".into())),
            Ok("cheap answer"),
        ]);
        let result = chain()
            .run(|s, _| {
                let out = script.next(s);
                async move { out }
            })
            .await
            .unwrap();
        assert_eq!(result.strategy.provider.as_str(), "cheap");
        assert_eq!(result.hops, 1);
        let seen = script.seen();
        assert_eq!(seen[0].0, AttemptKind::Primary);
        assert_eq!(seen[1].0, AttemptKind::Fallback);
    }

    #[tokio::test]
    async fn size_retries_truncated_then_falls_back() {
        let script = Script::new(vec![
            Err(ProviderError::PromptTooLarge("too long".into())),
            Err(ProviderError::PromptTooLarge("still too long".into())),
            Ok("fits now"),
        ]);
        let causes = Mutex::new(Vec::new());
        let result = chain()
            .run(|s, cause| {
                causes.lock().unwrap().push(cause.cloned());
                let out = script.next(s);
                async move { out }
            })
            .await
            .unwrap();
        assert_eq!(result.hops, 2);
        let seen = script.seen();
        assert_eq!(
            seen[1],
            (AttemptKind::RetryTruncated, String::from("primary"), 8_000)
        );
        assert_eq!(seen[2].0, AttemptKind::Fallback);

        let causes = causes.into_inner().unwrap();
        assert!(causes[0].is_none());
        assert!(matches!(causes[1], Some(ProviderError::PromptTooLarge(_))));
    }

    #[tokio::test]
    async fn fatal_error_stops_without_fallback() {
        let script = Script::new(vec![Err(ProviderError::Unavailable("conn refused".into()))]);
        let failure = chain()
            .run(|s, _| {
                let out = script.next(s);
                async move { out }
            })
            .await
            .unwrap_err();
        assert!(matches!(failure.error, ProviderError::Unavailable(_)));
        assert_eq!(failure.hops, 0);
        assert_eq!(script.seen().len(), 1);
    }

    #[tokio::test]
    async fn never_exceeds_two_hops() {
        let script = Script::new(vec![
            Err(ProviderError::PromptTooLarge("a".into())),
            Err(ProviderError::QuotaExceeded("b".into())),
            Err(ProviderError::QuotaExceeded("c".into())),
        ]);
        let failure = chain()
            .run(|s, _| {
                let out = script.next(s);
                async move { out }
            })
            .await
            .unwrap_err();
        assert_eq!(failure.hops, 2);
        assert_eq!(script.seen().len(), 3);
        assert_eq!(failure.strategy.unwrap().kind, AttemptKind::Fallback);
    }

    #[tokio::test]
    async fn empty_chain_returns_not_configured() {
        let chain = FallbackChain::new(classify_provider_error);
        let failure = chain
            .run(|_, _| async { Ok::<_, ProviderError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(failure.error, ProviderError::NotConfigured(_)));
        assert!(failure.strategy.is_none());
    }

    #[tokio::test]
    async fn custom_classifier_changes_escalation() {
        fn everything_fatal(_: &ProviderError) -> ErrorClass {
            ErrorClass::Fatal
        }
        let chain = FallbackChain::new(everything_fatal)
            .then(Strategy::primary(ProviderId::new("a"), 100, 10))
            .then(Strategy {
                kind: AttemptKind::Fallback,
                provider: ProviderId::new("b"),
                total_budget: 100,
                system_reserve: 10,
                accepts: vec![ErrorClass::Quota],
            });
        let failure = chain
            .run(|_, _| async { Err::<(), _>(ProviderError::QuotaExceeded("x".into())) })
            .await
            .unwrap_err();
        assert_eq!(failure.hops, 0);
    }
}
