//! Behavioral event pipeline orchestration
//!
//! Wires the stages together: raw interaction → classifier → middleware →
//! frustration detector → event record → ledger.

use crate::behavior::capture::CaptureHandle;
use crate::behavior::classifier::ElementClassifier;
use crate::behavior::frustration::{identity_key, FrustrationDetector};
use crate::behavior::ledger::{EventLedger, PushOutcome};
use crate::behavior::middleware::{Middleware, MiddlewareContext, MiddlewareChain};
use crate::behavior::sink::BatchSink;
use crate::behavior::store::EventStore;
use crate::behavior::types::{
    EventRecord, EventType, FlushSummary, FlushTrigger, LedgerStats, RawInteraction,
};
use crate::config::FluxConfig;
use crate::types::Category;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

/// Result of handling one interaction
#[derive(Debug, Clone, PartialEq)]
pub enum HandleOutcome {
    /// Capture is not attached yet, or was cancelled
    NotAttached,
    /// No event: not actionable, gated out and no friction
    Ignored,
    Recorded {
        record: EventRecord,
        push: PushOutcome,
    },
}

/// Stateful per-session pipeline.
///
/// Not thread-safe; a multi-threaded host should wrap it in a mutex.
#[derive(Debug)]
pub struct EventPipeline {
    classifier: ElementClassifier,
    middleware: MiddlewareChain,
    frustration: FrustrationDetector,
    ledger: EventLedger,
    capture: CaptureHandle,
    session_id: String,
    cumulative_score: f64,
    active_variant: String,
}

impl EventPipeline {
    /// Create a pipeline with a fresh session id. Capture starts pending.
    pub fn new(
        config: &FluxConfig,
        store: impl EventStore + 'static,
        sink: impl BatchSink + 'static,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            classifier: ElementClassifier::new(config.classifier.clone()),
            middleware: MiddlewareChain::new(),
            frustration: FrustrationDetector::new(config.frustration.clone()),
            ledger: EventLedger::new(config.ledger.clone(), store, sink, now),
            capture: CaptureHandle::new(),
            session_id: Uuid::new_v4().to_string(),
            cumulative_score: 0.0,
            active_variant: Category::Default.as_str().to_string(),
        }
    }

    pub fn with_session_id(mut self, session_id: &str) -> Self {
        self.session_id = session_id.to_string();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Variant id recorded on events that have no category guess
    pub fn set_active_variant(&mut self, variant_id: &str) {
        self.active_variant = variant_id.to_string();
    }

    pub fn register_middleware(&mut self, name: &str, middleware: impl Middleware + 'static) {
        self.middleware.register(name, middleware);
    }

    pub fn set_flush_callback(&mut self, callback: impl FnMut(&FlushSummary) + 'static) {
        self.ledger.set_flush_callback(callback);
    }

    /// Schedule capture attachment for `ready_at`; [`tick`](Self::tick) attaches it
    pub fn schedule_capture(&mut self, ready_at: DateTime<Utc>) -> bool {
        self.capture.schedule(ready_at)
    }

    /// Schedule and attach capture immediately
    pub fn attach(&mut self, now: DateTime<Utc>) -> bool {
        self.capture.schedule(now);
        self.capture.poll(now)
    }

    pub fn is_attached(&self) -> bool {
        self.capture.is_attached()
    }

    /// Process one interaction, using its timestamp as the current time
    pub fn handle(&mut self, interaction: &RawInteraction) -> HandleOutcome {
        if !self.capture.is_attached() {
            return HandleOutcome::NotAttached;
        }
        let now = interaction.timestamp;

        // Stage 1: Classify
        let evaluation = self.classifier.evaluate(&interaction.target);

        // Stage 2: Middleware overrides
        let ctx = MiddlewareContext {
            interaction,
            element: &evaluation.element,
            score: &evaluation.score,
            default_event: evaluation.event_type.as_ref(),
        };
        let (event_type, middleware_data) = match self.middleware.evaluate(&ctx) {
            Some((event_type, data)) => (Some(event_type), Some(data)),
            None => (evaluation.event_type.clone(), None),
        };

        // Stage 3: Frustration
        let key = identity_key(&evaluation.element);
        let is_friction = self.frustration.record(&key, now);

        let event_type = match (event_type, is_friction) {
            (Some(event_type), _) => event_type,
            (None, true) => EventType::Friction,
            (None, false) => {
                debug!(tag = %evaluation.element.tag, "interaction ignored");
                return HandleOutcome::Ignored;
            }
        };

        // Stage 4: Build record. The score only counts once the ledger accepts it.
        let score = evaluation.score.total;
        let cumulative_score = self.cumulative_score + score;
        let category_or_variant_id = evaluation
            .score
            .category_guess
            .map(|c| c.as_str().to_string())
            .unwrap_or_else(|| self.active_variant.clone());

        let record = EventRecord {
            id: format!("{}:{}:{}", event_type, key, now.timestamp_millis()),
            event_type,
            category_or_variant_id,
            cumulative_session_score: cumulative_score,
            path: interaction.path.clone(),
            is_friction,
            timestamp: now,
            session_id: self.session_id.clone(),
            semantic_score: evaluation.score,
            element: evaluation.element,
            middleware_data,
        };

        // Stage 5: Ledger
        let push = self.ledger.push(record.clone(), now);
        if push.is_accepted() {
            self.cumulative_score = cumulative_score;
        }
        HandleOutcome::Recorded { record, push }
    }

    /// Attach a scheduled capture if due, then fire ledger timers
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<FlushSummary> {
        self.capture.poll(now);
        self.ledger.tick(now)
    }

    pub fn flush(&mut self, trigger: FlushTrigger, now: DateTime<Utc>) -> Option<FlushSummary> {
        self.ledger.flush(trigger, now)
    }

    pub fn on_visibility_hidden(&mut self, now: DateTime<Utc>) -> Option<FlushSummary> {
        self.ledger.on_visibility_hidden(now)
    }

    pub fn on_page_unload(&mut self, now: DateTime<Utc>) -> Option<FlushSummary> {
        self.ledger.on_page_unload(now)
    }

    /// Detach capture and destroy the ledger. Safe to call more than once.
    pub fn destroy(&mut self, now: DateTime<Utc>) -> Option<FlushSummary> {
        self.capture.cancel();
        self.frustration.reset();
        self.ledger.destroy(now)
    }

    pub fn cumulative_score(&self) -> f64 {
        self.cumulative_score
    }

    pub fn stats(&self) -> LedgerStats {
        self.ledger.stats()
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.ledger.next_deadline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::middleware::MiddlewareOverride;
    use crate::behavior::sink::BufferSink;
    use crate::behavior::store::MemoryStore;
    use crate::behavior::types::InteractionTarget;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn pipeline() -> (EventPipeline, BufferSink) {
        let sink = BufferSink::new();
        let mut pipeline = EventPipeline::new(&FluxConfig::default(), MemoryStore::new(), sink.clone(), at(0))
            .with_session_id("sess-test");
        pipeline.attach(at(0));
        (pipeline, sink)
    }

    fn cart_button() -> InteractionTarget {
        InteractionTarget::new("span").within(
            InteractionTarget::new("button")
                .with_id("add-gaming-headset")
                .with_text("Add to cart")
                .with_class("btn")
                .with_aria_label("Add gaming headset to cart"),
        )
    }

    fn recorded(outcome: HandleOutcome) -> EventRecord {
        match outcome {
            HandleOutcome::Recorded { record, .. } => record,
            other => panic!("expected a record, got {:?}", other),
        }
    }

    #[test]
    fn test_not_attached_until_scheduled_capture_polls() {
        let sink = BufferSink::new();
        let mut pipeline = EventPipeline::new(&FluxConfig::default(), MemoryStore::new(), sink, at(0));
        let click = RawInteraction::click(cart_button(), at(10));
        assert_eq!(pipeline.handle(&click), HandleOutcome::NotAttached);

        assert!(pipeline.schedule_capture(at(50)));
        pipeline.tick(at(49));
        assert!(!pipeline.is_attached());
        pipeline.tick(at(50));
        assert!(pipeline.is_attached());
    }

    #[test]
    fn test_cart_click_recorded() {
        let (mut pipeline, _) = pipeline();
        let click = RawInteraction::click(cart_button(), at(1500)).on_path("/collections/gaming");

        let record = recorded(pipeline.handle(&click));
        assert_eq!(record.event_type, EventType::AddToCart);
        assert_eq!(record.id, format!("add_to_cart:add-gaming-headset:{}", at(1500).timestamp_millis()));
        assert_eq!(record.category_or_variant_id, "gaming");
        assert_eq!(record.path, "/collections/gaming");
        assert_eq!(record.session_id, "sess-test");
        assert!(!record.is_friction);
        assert_eq!(record.cumulative_session_score, record.semantic_score.total);
        assert_eq!(pipeline.stats().received, 1);
    }

    #[test]
    fn test_variant_used_without_category_guess() {
        let (mut pipeline, _) = pipeline();
        pipeline.set_active_variant("creator");
        let target = InteractionTarget::new("button").with_text("Checkout").with_id("checkout");

        let record = recorded(pipeline.handle(&RawInteraction::click(target, at(0))));
        assert_eq!(record.category_or_variant_id, "creator");
    }

    #[test]
    fn test_cumulative_score_accumulates() {
        let (mut pipeline, _) = pipeline();
        let first = recorded(pipeline.handle(&RawInteraction::click(cart_button(), at(0))));
        let second = recorded(pipeline.handle(&RawInteraction::click(cart_button(), at(5000))));
        assert_eq!(
            second.cumulative_session_score,
            first.semantic_score.total + second.semantic_score.total
        );
        assert_eq!(pipeline.cumulative_score(), second.cumulative_session_score);
    }

    #[test]
    fn test_non_actionable_ignored_then_friction() {
        let (mut pipeline, _) = pipeline();
        let target = InteractionTarget::new("div").with_text("Sold out");

        assert_eq!(pipeline.handle(&RawInteraction::click(target.clone(), at(0))), HandleOutcome::Ignored);
        assert_eq!(pipeline.handle(&RawInteraction::click(target.clone(), at(200))), HandleOutcome::Ignored);

        let record = recorded(pipeline.handle(&RawInteraction::click(target.clone(), at(400))));
        assert_eq!(record.event_type, EventType::Friction);
        assert!(record.is_friction);
        assert_eq!(record.id, format!("friction:div:Sold out:{}", at(400).timestamp_millis()));

        // the next click does not re-fire
        assert_eq!(pipeline.handle(&RawInteraction::click(target, at(500))), HandleOutcome::Ignored);
    }

    #[test]
    fn test_rage_click_on_button_flags_record() {
        let (mut pipeline, _) = pipeline();
        let mut outcomes = Vec::new();
        for ms in [0, 150, 300] {
            outcomes.push(recorded(pipeline.handle(&RawInteraction::click(cart_button(), at(ms)))));
        }
        assert!(!outcomes[0].is_friction);
        assert!(!outcomes[1].is_friction);
        assert!(outcomes[2].is_friction);
        assert_eq!(outcomes[2].event_type, EventType::AddToCart);
    }

    #[test]
    fn test_middleware_override() {
        let (mut pipeline, _) = pipeline();
        pipeline.register_middleware("newsletter", |ctx: &MiddlewareContext<'_>| {
            (ctx.element.text == "Notify me").then(|| {
                MiddlewareOverride::new(EventType::Custom("newsletter_signup".to_string()))
                    .with_label("Restock alert")
            })
        });

        let target = InteractionTarget::new("button").with_text("Notify me");
        let record = recorded(pipeline.handle(&RawInteraction::click(target, at(0))));
        assert_eq!(record.event_type.as_str(), "newsletter_signup");
        let data = record.middleware_data.unwrap();
        assert_eq!(data.middleware, "newsletter");
        assert_eq!(data.label.as_deref(), Some("Restock alert"));
    }

    #[test]
    fn test_duplicate_click_same_millisecond() {
        let (mut pipeline, _) = pipeline();
        let click = RawInteraction::click(cart_button(), at(0));
        pipeline.handle(&click);

        match pipeline.handle(&click) {
            HandleOutcome::Recorded { push, .. } => assert_eq!(push, PushOutcome::Duplicate),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(pipeline.stats().duplicates_dropped, 1);
    }

    #[test]
    fn test_duplicate_does_not_add_to_session_score() {
        let (mut pipeline, _) = pipeline();
        let click = RawInteraction::click(cart_button(), at(0));
        let first = recorded(pipeline.handle(&click));
        let after_first = pipeline.cumulative_score();
        assert_eq!(after_first, first.semantic_score.total);

        pipeline.handle(&click);
        assert_eq!(pipeline.cumulative_score(), after_first);
        assert_eq!(pipeline.stats().received, 1);

        let next = recorded(pipeline.handle(&RawInteraction::click(cart_button(), at(6000))));
        assert_eq!(
            next.cumulative_session_score,
            first.semantic_score.total + next.semantic_score.total
        );
    }

    #[test]
    fn test_destroy_flushes_and_detaches() {
        let (mut pipeline, sink) = pipeline();
        pipeline.handle(&RawInteraction::click(cart_button(), at(0)));

        let summary = pipeline.destroy(at(100)).unwrap();
        assert_eq!(summary.trigger, FlushTrigger::Manual);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.batches()[0].session_id, "sess-test");

        assert_eq!(pipeline.destroy(at(200)), None);
        assert_eq!(
            pipeline.handle(&RawInteraction::click(cart_button(), at(300))),
            HandleOutcome::NotAttached
        );
    }
}
