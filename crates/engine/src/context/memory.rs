//! Conversation memory: a bounded sliding window with a daily reset.
//!
//! The window holds the N most recent messages. Once a day, at a fixed
//! wall-clock time in a fixed UTC offset, it is wiped. The reset is checked
//! on every append and by a background poller, and a last-reset date stamp
//! keeps it from firing twice on the same local day.
//!
//! While usage quota is exhausted the memory is gated off: it is emptied and
//! stays empty until tokens are available again.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use forgeline_config::MemoryConfig;
use forgeline_core::event::{DomainEvent, EventBus};
use forgeline_core::message::{Message, MessageId};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Daily cutoff at `hour:minute` local time in a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSchedule {
    hour: u32,
    minute: u32,
    utc_offset_minutes: i32,
}

impl ResetSchedule {
    /// `None` unless `hour:minute` is a valid time of day.
    pub fn new(hour: u32, minute: u32, utc_offset_minutes: i32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self {
            hour,
            minute,
            utc_offset_minutes,
        })
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(config.reset_hour, config.reset_minute, config.utc_offset_minutes)
            .unwrap_or_default()
    }

    /// Wall-clock time in the schedule's offset.
    pub fn local(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.naive_utc() + Duration::minutes(i64::from(self.utc_offset_minutes))
    }

    fn cutoff_seconds(&self) -> u32 {
        self.hour * 3600 + self.minute * 60
    }

    /// The local date to stamp if a reset is due at `now`.
    pub fn due(&self, now: DateTime<Utc>, last_reset: Option<NaiveDate>) -> Option<NaiveDate> {
        let local = self.local(now);
        let today = local.date();
        let past_cutoff = local.time().num_seconds_from_midnight() >= self.cutoff_seconds();
        (past_cutoff && last_reset != Some(today)).then_some(today)
    }
}

impl Default for ResetSchedule {
    /// 12:00 at UTC+7.
    fn default() -> Self {
        Self {
            hour: 12,
            minute: 0,
            utc_offset_minutes: 420,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    window: usize,
    messages: VecDeque<Message>,
    schedule: ResetSchedule,
    last_reset: Option<NaiveDate>,
    tokens_available: bool,
    next_id: MessageId,
}

impl ConversationMemory {
    pub fn new(window: usize, schedule: ResetSchedule) -> Self {
        let window = window.max(1);
        Self {
            window,
            messages: VecDeque::with_capacity(window),
            schedule,
            last_reset: None,
            tokens_available: true,
            next_id: 1,
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(config.window, ResetSchedule::from_config(config))
    }

    /// Start with a reset already applied on `date`.
    pub fn with_last_reset(mut self, date: NaiveDate) -> Self {
        self.last_reset = Some(date);
        self
    }

    /// Next message id. Ids keep increasing across resets.
    pub fn next_id(&mut self) -> MessageId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Append a message, evicting the oldest past the window.
    ///
    /// Returns `false` when the memory is gated off and the message was dropped.
    pub fn append(&mut self, message: Message) -> bool {
        self.maybe_reset(message.timestamp);
        if !self.tokens_available {
            debug!(id = message.id, "Memory gated off, message not kept");
            return false;
        }
        self.next_id = self.next_id.max(message.id + 1);
        self.messages.push_back(message);
        while self.messages.len() > self.window {
            self.messages.pop_front();
        }
        true
    }

    /// Current window, oldest first.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// Wipe the window if the daily cutoff has passed and today's reset has
    /// not been applied yet.
    pub fn maybe_reset(&mut self, now: DateTime<Utc>) -> bool {
        let Some(today) = self.schedule.due(now, self.last_reset) else {
            return false;
        };
        let dropped = self.messages.len();
        self.messages.clear();
        self.last_reset = Some(today);
        info!(%today, dropped, "Conversation memory reset at daily cutoff");
        true
    }

    /// Gate the memory on usage. Turning it off clears the window.
    ///
    /// Returns `true` if messages were discarded.
    pub fn set_tokens_available(&mut self, available: bool) -> bool {
        self.tokens_available = available;
        if available || self.messages.is_empty() {
            return false;
        }
        self.messages.clear();
        info!("Quota exhausted, conversation memory cleared");
        true
    }

    pub fn tokens_available(&self) -> bool {
        self.tokens_available
    }

    pub fn last_reset(&self) -> Option<NaiveDate> {
        self.last_reset
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(20, ResetSchedule::default())
    }
}

/// Poll `maybe_reset` every `interval` on the tokio runtime.
pub fn spawn_reset_poller(
    memory: Arc<Mutex<ConversationMemory>>,
    interval: std::time::Duration,
    events: Option<Arc<EventBus>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let reset = memory.lock().await.maybe_reset(Utc::now());
            if reset && let Some(bus) = &events {
                bus.publish(DomainEvent::MemoryReset {
                    reason: "daily cutoff".into(),
                    timestamp: Utc::now(),
                });
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// 2026-03-10 12:00 at UTC+7 is 05:00 UTC.
    fn cutoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 5, 0, 0).unwrap()
    }

    fn msg(id: u64, at: DateTime<Utc>) -> Message {
        Message::user(id, format!("message {id}")).with_timestamp(at)
    }

    fn before_cutoff_memory() -> ConversationMemory {
        let mut memory = ConversationMemory::default();
        let morning = cutoff() - Duration::hours(3);
        for id in 1..=3 {
            memory.append(msg(id, morning));
        }
        memory
    }

    #[test]
    fn window_evicts_oldest() {
        let mut memory = ConversationMemory::new(3, ResetSchedule::default());
        let at = cutoff() - Duration::hours(1);
        for id in 1..=5 {
            memory.append(msg(id, at));
        }
        let ids: Vec<u64> = memory.snapshot().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn intact_just_before_cutoff_and_empty_just_after() {
        let mut memory = before_cutoff_memory();
        assert!(!memory.maybe_reset(cutoff() - Duration::milliseconds(1)));
        assert_eq!(memory.len(), 3);

        assert!(memory.maybe_reset(cutoff() + Duration::milliseconds(1)));
        assert!(memory.is_empty());
    }

    #[test]
    fn reset_applies_once_per_local_day() {
        let mut memory = before_cutoff_memory();
        assert!(memory.maybe_reset(cutoff() + Duration::minutes(1)));

        memory.append(msg(10, cutoff() + Duration::minutes(2)));
        assert!(!memory.maybe_reset(cutoff() + Duration::hours(5)));
        assert_eq!(memory.len(), 1);

        // Next local day, after the cutoff again
        assert!(memory.maybe_reset(cutoff() + Duration::hours(24)));
        assert!(memory.is_empty());
    }

    #[test]
    fn append_after_cutoff_resets_first() {
        let mut memory = before_cutoff_memory();
        memory.append(msg(4, cutoff() + Duration::seconds(1)));
        let ids: Vec<u64> = memory.snapshot().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![4]);
        assert_eq!(memory.last_reset(), NaiveDate::from_ymd_opt(2026, 3, 10));
    }

    #[test]
    fn quota_gate_keeps_memory_empty() {
        let mut memory = before_cutoff_memory();
        assert!(memory.set_tokens_available(false));
        assert!(memory.is_empty());

        assert!(!memory.append(msg(5, cutoff() - Duration::hours(1))));
        assert!(memory.snapshot().is_empty());

        memory.set_tokens_available(true);
        assert!(memory.append(msg(6, cutoff() - Duration::hours(1))));
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn ids_stay_monotonic_across_resets() {
        let mut memory = before_cutoff_memory();
        memory.maybe_reset(cutoff() + Duration::minutes(1));
        assert_eq!(memory.next_id(), 4);
        assert_eq!(memory.next_id(), 5);
    }

    #[test]
    fn schedule_respects_offset() {
        let schedule = ResetSchedule::new(0, 0, -300).unwrap(); // midnight at UTC-5
        let just_after = Utc.with_ymd_and_hms(2026, 3, 10, 5, 0, 1).unwrap();
        assert_eq!(
            schedule.due(just_after, None),
            NaiveDate::from_ymd_opt(2026, 3, 10)
        );
        assert!(ResetSchedule::new(24, 0, 0).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn poller_resets_and_publishes() {
        // Last reset long ago and a cutoff at local midnight: always due
        let schedule = ResetSchedule::new(0, 0, 0).unwrap();
        let mut memory = ConversationMemory::new(5, schedule)
            .with_last_reset(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        // Direct push so the append-time check does not reset first
        memory.messages.push_back(Message::user(1, "hi"));
        let memory = Arc::new(Mutex::new(memory));

        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let handle = spawn_reset_poller(
            Arc::clone(&memory),
            std::time::Duration::from_secs(60),
            Some(Arc::clone(&bus)),
        );

        let event = rx.recv().await.unwrap();
        assert!(matches!(event.as_ref(), DomainEvent::MemoryReset { .. }));
        assert!(memory.lock().await.is_empty());
        handle.abort();
    }
}
