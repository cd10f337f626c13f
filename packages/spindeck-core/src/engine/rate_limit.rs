//! Per-client sliding-window rate limiting.
//!
//! Counters are keyed by `(client, bucket)`. Buckets group event types: each
//! queue operation has its own budget, all deck transport actions share one,
//! and seeks get a much larger budget of their own. Mixer moves, FX tweaks
//! and cursor updates are not rate-limited (they are gated by ownership and
//! the cursor throttle instead).

use std::collections::VecDeque;

use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::error::EngineError;
use crate::protocol::ClientEvent;
use crate::utils::now_millis;

/// Rate-limit bucket for an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateBucket {
    QueueAdd,
    QueueRemove,
    QueueReorder,
    QueueEdit,
    /// Shared across load/play/pause/cue/tempo/hotcue and the host-only
    /// queue-clear/kick actions.
    DeckActions,
    DeckSeek,
}

impl RateBucket {
    /// Bucket for an event, or `None` when the event is not rate-limited.
    pub fn for_event(event: &ClientEvent) -> Option<Self> {
        match event {
            ClientEvent::QueueAdd(_) => Some(Self::QueueAdd),
            ClientEvent::QueueRemove(_) => Some(Self::QueueRemove),
            ClientEvent::QueueReorder(_) => Some(Self::QueueReorder),
            ClientEvent::QueueEdit(_) => Some(Self::QueueEdit),
            ClientEvent::DeckLoad(_)
            | ClientEvent::DeckPlay(_)
            | ClientEvent::DeckPause(_)
            | ClientEvent::DeckCue(_)
            | ClientEvent::DeckTempoSet(_)
            | ClientEvent::DeckHotcue(_)
            | ClientEvent::QueueClear
            | ClientEvent::Kick(_) => Some(Self::DeckActions),
            ClientEvent::DeckSeek(_) => Some(Self::DeckSeek),
            ClientEvent::CursorMove(_)
            | ClientEvent::ControlGrab(_)
            | ClientEvent::ControlRelease(_)
            | ClientEvent::MixerSet(_)
            | ClientEvent::FxSet(_)
            | ClientEvent::FxToggle(_)
            | ClientEvent::TimePing(_) => None,
        }
    }
}

/// Sliding-window rate limiter shared across all rooms.
pub struct RateLimiter {
    windows: DashMap<(String, RateBucket), VecDeque<u64>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
        }
    }

    fn budget(&self, bucket: RateBucket) -> u32 {
        match bucket {
            RateBucket::QueueAdd
            | RateBucket::QueueRemove
            | RateBucket::QueueReorder
            | RateBucket::QueueEdit => self.config.queue_max,
            RateBucket::DeckActions => self.config.deck_max,
            RateBucket::DeckSeek => self.config.seek_max,
        }
    }

    /// Peeks whether the event would currently be allowed, without recording.
    pub fn check(&self, client_id: &str, event: &ClientEvent) -> bool {
        let Some(bucket) = RateBucket::for_event(event) else {
            return true;
        };
        self.check_at(client_id, bucket, now_millis())
    }

    fn check_at(&self, client_id: &str, bucket: RateBucket, now_ms: u64) -> bool {
        let key = (client_id.to_string(), bucket);
        let window_start = now_ms.saturating_sub(self.config.window_ms);
        match self.windows.get(&key) {
            Some(stamps) => {
                let live = stamps.iter().filter(|&&t| t > window_start).count();
                live < self.budget(bucket) as usize
            }
            None => true,
        }
    }

    /// Checks and, when allowed, records the event against its bucket.
    ///
    /// On violation returns `RATE_LIMITED` with a `retry_after_ms` hint: the
    /// time until the oldest in-window entry slides out.
    pub fn check_and_record(&self, client_id: &str, event: &ClientEvent) -> Result<(), EngineError> {
        let Some(bucket) = RateBucket::for_event(event) else {
            return Ok(());
        };
        self.check_and_record_at(client_id, bucket, now_millis())
    }

    fn check_and_record_at(
        &self,
        client_id: &str,
        bucket: RateBucket,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        let key = (client_id.to_string(), bucket);
        let window_start = now_ms.saturating_sub(self.config.window_ms);
        let mut stamps = self.windows.entry(key).or_default();

        while let Some(&oldest) = stamps.front() {
            if oldest <= window_start {
                stamps.pop_front();
            } else {
                break;
            }
        }

        if stamps.len() >= self.budget(bucket) as usize {
            let oldest = *stamps.front().expect("non-empty at budget");
            let retry_after_ms = (oldest + self.config.window_ms).saturating_sub(now_ms).max(1);
            return Err(EngineError::RateLimited { retry_after_ms });
        }

        stamps.push_back(now_ms);
        Ok(())
    }

    /// Drops all counters for a client (called when they disconnect).
    pub fn forget_client(&self, client_id: &str) {
        self.windows.retain(|(client, _), _| client != client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{QueueAddPayload, TimePingPayload};

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig::default())
    }

    fn queue_add() -> ClientEvent {
        ClientEvent::QueueAdd(QueueAddPayload {
            track_id: "t1".into(),
            title: "A".into(),
            duration_sec: 120.0,
            insert_at: None,
        })
    }

    #[test]
    fn buckets_group_event_types() {
        assert_eq!(
            RateBucket::for_event(&queue_add()),
            Some(RateBucket::QueueAdd)
        );
        assert_eq!(
            RateBucket::for_event(&ClientEvent::TimePing(TimePingPayload { t0: 0 })),
            None
        );
    }

    #[test]
    fn queue_bucket_allows_twenty_then_rejects() {
        let limiter = limiter();
        let now = 1_000_000;
        for i in 0..20 {
            limiter
                .check_and_record_at("c1", RateBucket::QueueAdd, now + i)
                .unwrap_or_else(|e| panic!("event {i} rejected: {e}"));
        }
        let err = limiter
            .check_and_record_at("c1", RateBucket::QueueAdd, now + 20)
            .unwrap_err();
        match err {
            EngineError::RateLimited { retry_after_ms } => assert!(retry_after_ms > 0),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn window_slides() {
        let limiter = limiter();
        let now = 1_000_000;
        for i in 0..20 {
            limiter
                .check_and_record_at("c1", RateBucket::QueueAdd, now + i)
                .unwrap();
        }
        assert!(limiter
            .check_and_record_at("c1", RateBucket::QueueAdd, now + 21)
            .is_err());

        // Past the window, the oldest entries have slid out
        let later = now + 60_001 + 19;
        assert!(limiter
            .check_and_record_at("c1", RateBucket::QueueAdd, later)
            .is_ok());
    }

    #[test]
    fn accepted_count_never_exceeds_budget_within_window() {
        let limiter = limiter();
        let mut accepted = 0;
        for i in 0..200u64 {
            if limiter
                .check_and_record_at("c1", RateBucket::QueueAdd, 500_000 + i * 10)
                .is_ok()
            {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 20);
    }

    #[test]
    fn clients_and_buckets_are_independent() {
        let limiter = limiter();
        let now = 1_000_000;
        for i in 0..20 {
            limiter
                .check_and_record_at("c1", RateBucket::QueueAdd, now + i)
                .unwrap();
        }
        assert!(limiter
            .check_and_record_at("c2", RateBucket::QueueAdd, now + 30)
            .is_ok());
        assert!(limiter
            .check_and_record_at("c1", RateBucket::QueueRemove, now + 30)
            .is_ok());
    }

    #[test]
    fn check_peeks_without_recording() {
        let limiter = limiter();
        for _ in 0..100 {
            assert!(limiter.check_at("c1", RateBucket::QueueAdd, 1_000));
        }
        assert!(limiter
            .check_and_record_at("c1", RateBucket::QueueAdd, 1_000)
            .is_ok());
    }

    #[test]
    fn forget_client_resets_budget() {
        let limiter = limiter();
        for i in 0..20 {
            limiter
                .check_and_record_at("c1", RateBucket::QueueAdd, 1_000 + i)
                .unwrap();
        }
        limiter.forget_client("c1");
        assert!(limiter
            .check_and_record_at("c1", RateBucket::QueueAdd, 1_100)
            .is_ok());
    }

    #[test]
    fn unlimited_events_always_pass() {
        let limiter = limiter();
        let ping = ClientEvent::TimePing(TimePingPayload { t0: 1 });
        for _ in 0..10_000 {
            assert!(limiter.check_and_record("c1", &ping).is_ok());
        }
    }
}
