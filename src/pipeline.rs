//! Intent pipeline orchestration
//!
//! This module provides the public API for intent resolution. It orchestrates
//! the full pipeline: visit context → signal collection → intent resolution →
//! decision composition.

use crate::collector::SignalCollector;
use crate::composer::{ContentTables, DecisionComposer};
use crate::config::{FluxConfig, IntentConfig};
use crate::error::FluxError;
use crate::resolver::IntentResolver;
use crate::types::{Decision, VisitContext};

/// Convert visit JSON to decision JSON (stateless, one-shot, default tables).
///
/// # Arguments
/// * `visit_json` - `{ "params": {..}, "referrer": ".." }` or `{ "url": "..", "referrer": ".." }`
///
/// # Returns
/// Decision JSON payload string
///
/// # Example
/// ```ignore
/// let decision_json = visit_to_decision(r#"{ "url": "/?utm_campaign=rgb-week" }"#)?;
/// ```
pub fn visit_to_decision(visit_json: &str) -> Result<String, FluxError> {
    IntentEngine::new().decide_json(visit_json)
}

/// Reusable intent engine over immutable configuration tables.
///
/// The engine holds no per-visit state, so one instance can serve any
/// number of visits.
#[derive(Debug, Clone, Default)]
pub struct IntentEngine {
    collector: SignalCollector,
    resolver: IntentResolver,
    composer: DecisionComposer,
}

impl IntentEngine {
    /// Create an engine with the built-in tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine from intent configuration and content tables
    pub fn with_tables(intent: &IntentConfig, content: ContentTables) -> Self {
        Self {
            collector: SignalCollector::new(intent),
            resolver: IntentResolver::new(intent.thresholds.clone()),
            composer: DecisionComposer::new(content),
        }
    }

    /// Create an engine from a full configuration
    pub fn from_config(config: &FluxConfig) -> Self {
        Self::with_tables(&config.intent, config.content.clone())
    }

    /// Resolve a visit to a decision
    pub fn decide(&self, visit: &VisitContext) -> Decision {
        // Stage 1: Collect signals
        let collection = self.collector.collect(visit);

        // Stage 2: Resolve intent
        let resolution = self.resolver.resolve(&collection.signals);

        // Stage 3: Compose decision
        self.composer.compose(resolution, collection.notes)
    }

    /// Resolve a landing URL and referrer
    pub fn decide_url(&self, url: &str, referrer: &str) -> Decision {
        self.decide(&VisitContext::from_url(url, referrer))
    }

    /// Resolve visit JSON to decision JSON
    pub fn decide_json(&self, visit_json: &str) -> Result<String, FluxError> {
        let visit: VisitContext = serde_json::from_str(visit_json)
            .map_err(|e| FluxError::ParseError(format!("Failed to parse visit: {}", e)))?;
        let decision = self.decide(&visit);
        serde_json::to_string(&decision).map_err(|e| FluxError::EncodingError(e.to_string()))
    }
}
