//! Deduplicating, batching event ledger
//!
//! Accepted records queue up until one of the flush triggers fires. Each flush
//! produces an immutable [`Batch`] for the sink. The queue is mirrored to an
//! [`EventStore`] on a best-effort basis and restored on construction.
//!
//! Time is always passed in by the caller; timers are deadlines checked by
//! [`EventLedger::tick`].

use crate::behavior::sink::BatchSink;
use crate::behavior::store::EventStore;
use crate::behavior::types::{
    Batch, DedupStats, EventRecord, FlushSummary, FlushTrigger, LastFlush, LedgerStats,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Storage key for the persisted queue snapshot
pub const DEFAULT_STORAGE_KEY: &str = "storefront_flux.event_queue";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Queue length that triggers a `batch_full` flush
    pub batch_size: usize,
    pub dedup_window_ms: u64,
    /// Most recent records kept in the persisted snapshot
    pub persist_cap: usize,
    pub flush_interval_ms: u64,
    /// Flush after this long without an accepted push
    pub idle_timeout_ms: u64,
    pub storage_key: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            dedup_window_ms: 5000,
            persist_cap: 50,
            flush_interval_ms: 30_000,
            idle_timeout_ms: 10_000,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

/// Result of [`EventLedger::push`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Accepted and the queue reached the batch size
    Flushed(FlushSummary),
    /// Same id seen inside the dedup window
    Duplicate,
    /// Ledger already destroyed
    Closed,
}

impl PushOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PushOutcome::Queued | PushOutcome::Flushed(_))
    }
}

type FlushCallback = Box<dyn FnMut(&FlushSummary)>;

pub struct EventLedger {
    config: LedgerConfig,
    store: Box<dyn EventStore>,
    sink: Box<dyn BatchSink>,
    on_flush: Option<FlushCallback>,
    queue: Vec<EventRecord>,
    /// Event id -> time it was accepted
    seen: HashMap<String, DateTime<Utc>>,
    stats: LedgerStats,
    next_interval: Option<DateTime<Utc>>,
    idle_deadline: Option<DateTime<Utc>>,
    destroyed: bool,
}

impl std::fmt::Debug for EventLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLedger")
            .field("config", &self.config)
            .field("queue_size", &self.queue.len())
            .field("stats", &self.stats)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl EventLedger {
    /// Create a ledger, restore any persisted queue and start the interval timer
    pub fn new(
        config: LedgerConfig,
        store: impl EventStore + 'static,
        sink: impl BatchSink + 'static,
        now: DateTime<Utc>,
    ) -> Self {
        let mut ledger = Self {
            next_interval: now.checked_add_signed(ms(config.flush_interval_ms)),
            config,
            store: Box::new(store),
            sink: Box::new(sink),
            on_flush: None,
            queue: Vec::new(),
            seen: HashMap::new(),
            stats: LedgerStats::default(),
            idle_deadline: None,
            destroyed: false,
        };
        ledger.restore();
        ledger
    }

    pub fn set_flush_callback(&mut self, callback: impl FnMut(&FlushSummary) + 'static) {
        self.on_flush = Some(Box::new(callback));
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Queue a record unless it duplicates a recent id
    pub fn push(&mut self, record: EventRecord, now: DateTime<Utc>) -> PushOutcome {
        if self.destroyed {
            return PushOutcome::Closed;
        }

        let window = ms(self.config.dedup_window_ms);
        if let Some(accepted_at) = self.seen.get(&record.id) {
            if now.signed_duration_since(*accepted_at) < window {
                self.stats.duplicates_dropped += 1;
                debug!(event_id = %record.id, "duplicate event dropped");
                return PushOutcome::Duplicate;
            }
        }

        self.seen.insert(record.id.clone(), now);
        self.queue.push(record);
        self.stats.received += 1;
        self.idle_deadline = now.checked_add_signed(ms(self.config.idle_timeout_ms));
        self.persist();

        if self.queue.len() >= self.config.batch_size {
            if let Some(summary) = self.flush(FlushTrigger::BatchFull, now) {
                return PushOutcome::Flushed(summary);
            }
        }
        PushOutcome::Queued
    }

    /// Flush the queue as one batch; `None` when there is nothing to send
    pub fn flush(&mut self, trigger: FlushTrigger, now: DateTime<Utc>) -> Option<FlushSummary> {
        if self.destroyed || self.queue.is_empty() {
            return None;
        }

        let events = std::mem::take(&mut self.queue);
        self.idle_deadline = None;
        if let Err(e) = self.store.remove(&self.config.storage_key) {
            debug!(error = %e, "failed to clear persisted queue");
        }
        self.prune_seen(now);

        let batch = Batch {
            id: Uuid::new_v4().to_string(),
            session_id: events[0].session_id.clone(),
            events,
            flushed_at: now,
            trigger,
            dedup_stats: DedupStats {
                duplicates_dropped: self.stats.duplicates_dropped,
                tracked_ids: self.seen.len(),
            },
        };

        let summary = FlushSummary {
            batch_id: batch.id.clone(),
            event_count: batch.event_count(),
            trigger,
            flushed_at: now,
        };

        self.stats.flushed += summary.event_count as u64;
        self.stats.batches_sent += 1;
        self.stats.last_flush = Some(LastFlush {
            at: now,
            trigger,
            event_count: summary.event_count,
        });

        info!(
            batch_id = %summary.batch_id,
            events = summary.event_count,
            trigger = %trigger,
            "flushing batch"
        );

        if let Some(callback) = self.on_flush.as_mut() {
            callback(&summary);
        }
        if let Err(e) = self.sink.deliver(&batch) {
            warn!(batch_id = %batch.id, error = %e, "batch delivery failed");
        }

        Some(summary)
    }

    /// Fire any timers whose deadline has passed
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<FlushSummary> {
        if self.destroyed {
            return Vec::new();
        }

        let mut flushed = Vec::new();

        if self.next_interval.is_some_and(|at| now >= at) {
            flushed.extend(self.flush(FlushTrigger::Interval, now));
            self.next_interval = now.checked_add_signed(ms(self.config.flush_interval_ms));
        }

        if self.idle_deadline.is_some_and(|at| now >= at) {
            flushed.extend(self.flush(FlushTrigger::Idle, now));
            self.idle_deadline = None;
        }

        flushed
    }

    /// Earliest pending timer deadline, for hosts that schedule wake-ups
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        match (self.next_interval, self.idle_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn on_visibility_hidden(&mut self, now: DateTime<Utc>) -> Option<FlushSummary> {
        self.flush(FlushTrigger::VisibilityHidden, now)
    }

    pub fn on_page_unload(&mut self, now: DateTime<Utc>) -> Option<FlushSummary> {
        self.flush(FlushTrigger::PageUnload, now)
    }

    /// Final manual flush, then stop all timers. Calling again does nothing.
    pub fn destroy(&mut self, now: DateTime<Utc>) -> Option<FlushSummary> {
        if self.destroyed {
            return None;
        }
        let summary = self.flush(FlushTrigger::Manual, now);
        self.destroyed = true;
        self.next_interval = None;
        self.idle_deadline = None;
        summary
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            queue_size: self.queue.len(),
            ..self.stats.clone()
        }
    }

    pub fn queue(&self) -> &[EventRecord] {
        &self.queue
    }

    fn persist(&mut self) {
        let start = self.queue.len().saturating_sub(self.config.persist_cap);
        let snapshot = match serde_json::to_string(&self.queue[start..]) {
            Ok(json) => json,
            Err(e) => {
                debug!(error = %e, "failed to encode queue snapshot");
                return;
            }
        };
        if let Err(e) = self.store.save(&self.config.storage_key, &snapshot) {
            debug!(error = %e, "failed to persist queue snapshot");
        }
    }

    fn restore(&mut self) {
        let raw = match self.store.load(&self.config.storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "persisted queue unavailable");
                return;
            }
        };

        match serde_json::from_str::<Vec<EventRecord>>(&raw) {
            Ok(records) => {
                for record in &records {
                    self.seen.insert(record.id.clone(), record.timestamp);
                }
                if !records.is_empty() {
                    info!(events = records.len(), "restored persisted queue");
                }
                self.queue = records;
            }
            Err(e) => debug!(error = %e, "ignoring corrupt persisted queue"),
        }
    }

    fn prune_seen(&mut self, now: DateTime<Utc>) {
        let horizon = ms(self.config.dedup_window_ms.saturating_mul(2));
        self.seen
            .retain(|_, accepted_at| now.signed_duration_since(*accepted_at) <= horizon);
    }
}

/// Millisecond setting as a duration, saturating instead of wrapping
pub(crate) fn ms(millis: u64) -> Duration {
    Duration::milliseconds(i64::try_from(millis).unwrap_or(i64::MAX / 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::sink::BufferSink;
    use crate::behavior::store::MemoryStore;
    use crate::behavior::types::{ElementDescriptor, EventType, SemanticScore};
    use crate::error::{SinkError, StoreError};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn record(id: &str) -> EventRecord {
        EventRecord {
            id: id.to_string(),
            event_type: EventType::CtaClick,
            category_or_variant_id: "default".to_string(),
            cumulative_session_score: 0.0,
            path: "/".to_string(),
            is_friction: false,
            timestamp: at(0),
            session_id: "sess-1".to_string(),
            semantic_score: SemanticScore::default(),
            element: ElementDescriptor {
                tag: "button".to_string(),
                text: "Buy".to_string(),
                class_list: vec![],
                id: None,
                aria_label: None,
                role: None,
                href: None,
                data_attributes: BTreeMap::new(),
                is_product_card: false,
                in_navigation: false,
            },
            middleware_data: None,
        }
    }

    fn ledger_with(config: LedgerConfig) -> (EventLedger, MemoryStore, BufferSink) {
        let store = MemoryStore::new();
        let sink = BufferSink::new();
        let ledger = EventLedger::new(config, store.clone(), sink.clone(), at(0));
        (ledger, store, sink)
    }

    #[test]
    fn test_duplicate_inside_window_rejected() {
        let (mut ledger, _, _) = ledger_with(LedgerConfig::default());

        assert_eq!(ledger.push(record("e1"), at(0)), PushOutcome::Queued);
        assert_eq!(ledger.push(record("e1"), at(4999)), PushOutcome::Duplicate);

        let stats = ledger.stats();
        assert_eq!(stats.duplicates_dropped, 1);
        assert_eq!(stats.queue_size, 1);

        // window measured from the accepted push
        assert_eq!(ledger.push(record("e1"), at(5000)), PushOutcome::Queued);
        assert_eq!(ledger.stats().queue_size, 2);
    }

    #[test]
    fn test_batch_full_flush() {
        let config = LedgerConfig {
            batch_size: 3,
            ..LedgerConfig::default()
        };
        let (mut ledger, _, sink) = ledger_with(config);

        let summaries = Rc::new(RefCell::new(Vec::new()));
        let captured = summaries.clone();
        ledger.set_flush_callback(move |s| captured.borrow_mut().push(s.clone()));

        ledger.push(record("e1"), at(0));
        ledger.push(record("e2"), at(10));
        let outcome = ledger.push(record("e3"), at(20));
        assert!(matches!(outcome, PushOutcome::Flushed(_)));

        let summaries = summaries.borrow();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].event_count, 3);
        assert_eq!(summaries[0].trigger, FlushTrigger::BatchFull);

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].id, summaries[0].batch_id);
        assert_eq!(batches[0].session_id, "sess-1");

        let stats = ledger.stats();
        assert_eq!(stats.queue_size, 0);
        assert_eq!(stats.flushed, 3);
        assert_eq!(stats.batches_sent, 1);
        assert_eq!(stats.last_flush.unwrap().trigger, FlushTrigger::BatchFull);
    }

    #[test]
    fn test_exactly_batch_size_flushes_once() {
        let (mut ledger, _, sink) = ledger_with(LedgerConfig::default());
        for i in 0..20 {
            ledger.push(record(&format!("e{}", i)), at(i));
        }
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.batches()[0].trigger, FlushTrigger::BatchFull);
        assert_eq!(ledger.stats().queue_size, 0);
    }

    #[test]
    fn test_flush_empty_queue_is_noop() {
        let (mut ledger, _, sink) = ledger_with(LedgerConfig::default());
        assert_eq!(ledger.flush(FlushTrigger::Manual, at(0)), None);
        assert!(sink.is_empty());
        assert_eq!(ledger.stats().batches_sent, 0);
    }

    #[test]
    fn test_persistence_snapshot_and_clear() {
        let config = LedgerConfig {
            persist_cap: 2,
            ..LedgerConfig::default()
        };
        let (mut ledger, store, _) = ledger_with(config);

        ledger.push(record("e1"), at(0));
        ledger.push(record("e2"), at(1));
        ledger.push(record("e3"), at(2));

        let snapshot: Vec<EventRecord> =
            serde_json::from_str(&store.get(DEFAULT_STORAGE_KEY).unwrap()).unwrap();
        let ids: Vec<&str> = snapshot.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e3"]);

        ledger.on_visibility_hidden(at(3));
        assert_eq!(store.get(DEFAULT_STORAGE_KEY), None);
    }

    #[test]
    fn test_restore_on_construction() {
        let mut store = MemoryStore::new();
        let records = vec![record("e1"), record("e2")];
        store
            .save(DEFAULT_STORAGE_KEY, &serde_json::to_string(&records).unwrap())
            .unwrap();

        let sink = BufferSink::new();
        let mut ledger = EventLedger::new(LedgerConfig::default(), store, sink.clone(), at(1000));
        assert_eq!(ledger.stats().queue_size, 2);

        // restored ids stay deduplicated
        assert_eq!(ledger.push(record("e1"), at(1000)), PushOutcome::Duplicate);

        ledger.on_page_unload(at(2000));
        assert_eq!(sink.batches()[0].event_count(), 2);
        assert_eq!(sink.batches()[0].trigger, FlushTrigger::PageUnload);
    }

    #[test]
    fn test_corrupt_snapshot_ignored() {
        let mut store = MemoryStore::new();
        store.save(DEFAULT_STORAGE_KEY, "{not json").unwrap();
        let ledger = EventLedger::new(LedgerConfig::default(), store, BufferSink::new(), at(0));
        assert_eq!(ledger.stats().queue_size, 0);
    }

    struct BrokenStore;

    impl EventStore for BrokenStore {
        fn load(&self, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("private mode".to_string()))
        }
        fn save(&mut self, _: &str, _: &str) -> Result<(), StoreError> {
            Err(StoreError::QuotaExceeded {
                needed: 10,
                available: 0,
            })
        }
        fn remove(&mut self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("private mode".to_string()))
        }
    }

    #[test]
    fn test_storage_and_sink_failures_are_swallowed() {
        let failing_sink = |_: &Batch| -> Result<(), SinkError> {
            Err(SinkError::Rejected("offline".to_string()))
        };
        let mut ledger = EventLedger::new(LedgerConfig::default(), BrokenStore, failing_sink, at(0));

        assert_eq!(ledger.push(record("e1"), at(0)), PushOutcome::Queued);
        let summary = ledger.flush(FlushTrigger::Manual, at(10)).unwrap();
        assert_eq!(summary.event_count, 1);
        assert_eq!(ledger.stats().queue_size, 0);
    }

    #[test]
    fn test_interval_and_idle_timers() {
        let (mut ledger, _, sink) = ledger_with(LedgerConfig::default());

        ledger.push(record("e1"), at(0));
        assert!(ledger.tick(at(9_999)).is_empty());

        let fired = ledger.tick(at(10_000));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].trigger, FlushTrigger::Idle);

        ledger.push(record("e2"), at(25_000));
        let fired = ledger.tick(at(30_000));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].trigger, FlushTrigger::Interval);

        // interval rescheduled from the tick that fired it
        assert_eq!(ledger.next_deadline(), Some(at(60_000)));
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let (mut ledger, _, sink) = ledger_with(LedgerConfig::default());
        ledger.push(record("e1"), at(0));

        let summary = ledger.destroy(at(100)).unwrap();
        assert_eq!(summary.trigger, FlushTrigger::Manual);
        assert!(ledger.is_destroyed());

        assert_eq!(ledger.destroy(at(200)), None);
        assert_eq!(ledger.push(record("e2"), at(300)), PushOutcome::Closed);
        assert!(ledger.tick(at(60_000)).is_empty());
        assert_eq!(ledger.next_deadline(), None);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_dedup_index_pruned_at_flush() {
        let (mut ledger, _, sink) = ledger_with(LedgerConfig::default());
        ledger.push(record("old"), at(0));
        ledger.flush(FlushTrigger::Manual, at(1));
        ledger.push(record("new"), at(10_000));
        ledger.flush(FlushTrigger::Manual, at(10_001));

        let last = sink.batches().pop().unwrap();
        assert_eq!(last.dedup_stats.tracked_ids, 1);
    }
}
