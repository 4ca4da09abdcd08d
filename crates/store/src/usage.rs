//! Daily request ledger implementing `UsageTracker`.
//!
//! Counts successful generations per UTC day. A limit of 0 means unlimited.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use forgeline_core::error::StoreError;
use forgeline_core::provider::ProviderId;
use forgeline_core::session::{SessionId, UsageTracker};
use std::collections::HashMap;
use std::sync::Mutex;

pub struct DailyUsageLedger {
    daily_limit: u32,
    state: Mutex<LedgerDay>,
}

#[derive(Debug, Default)]
struct LedgerDay {
    day: Option<NaiveDate>,
    total: u32,
    by_provider: HashMap<String, u32>,
}

impl LedgerDay {
    fn roll_to(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.day != Some(today) {
            self.day = Some(today);
            self.total = 0;
            self.by_provider.clear();
        }
    }
}

impl DailyUsageLedger {
    pub fn new(daily_limit: u32) -> Self {
        Self {
            daily_limit,
            state: Mutex::new(LedgerDay::default()),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub fn record_at(&self, provider: &ProviderId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StoreError::Storage("usage ledger lock poisoned".into()))?;
        state.roll_to(now);
        state.total += 1;
        *state
            .by_provider
            .entry(provider.as_str().to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    pub fn exceeded_at(&self, now: DateTime<Utc>) -> bool {
        if self.daily_limit == 0 {
            return false;
        }
        match self.state.lock() {
            Ok(mut state) => {
                state.roll_to(now);
                state.total >= self.daily_limit
            }
            Err(_) => false,
        }
    }

    /// Requests recorded today, optionally for one provider.
    pub fn used_today(&self, provider: Option<&ProviderId>) -> u32 {
        let Ok(mut state) = self.state.lock() else {
            return 0;
        };
        state.roll_to(Utc::now());
        match provider {
            Some(p) => state.by_provider.get(p.as_str()).copied().unwrap_or(0),
            None => state.total,
        }
    }
}

#[async_trait]
impl UsageTracker for DailyUsageLedger {
    async fn is_quota_exceeded(&self) -> bool {
        self.exceeded_at(Utc::now())
    }

    async fn record_usage(
        &self,
        session: &SessionId,
        provider: &ProviderId,
    ) -> Result<(), StoreError> {
        tracing::debug!(%session, %provider, "Recording usage");
        self.record_at(provider, Utc::now())
    }
}
