//! Rapid repeated-click detection
//!
//! Tracks recent interaction times per element identity over a sliding
//! window. Reaching the threshold reports friction once and clears the
//! element's history, so the next click starts a fresh count.

use crate::behavior::types::ElementDescriptor;
use crate::behavior::ledger::ms;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Characters of element text used in a fallback identity key
const TEXT_KEY_CHARS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrustrationConfig {
    /// Sliding window length
    pub window_ms: u64,
    /// Interactions inside the window that count as friction
    pub threshold: usize,
}

impl Default for FrustrationConfig {
    fn default() -> Self {
        Self {
            window_ms: 1000,
            threshold: 3,
        }
    }
}

/// Stable identity for an element snapshot.
///
/// Explicit id first, then `data-testid`, then `tag:` plus the first 20
/// characters of the text.
pub fn identity_key(element: &ElementDescriptor) -> String {
    if let Some(id) = element.id.as_deref().filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    if let Some(test_id) = element
        .data_attributes
        .get("testid")
        .filter(|id| !id.is_empty())
    {
        return test_id.clone();
    }
    let prefix: String = element.text.chars().take(TEXT_KEY_CHARS).collect();
    format!("{}:{}", element.tag, prefix)
}

#[derive(Debug, Clone, Default)]
pub struct FrustrationDetector {
    config: FrustrationConfig,
    recent: HashMap<String, Vec<DateTime<Utc>>>,
}

impl FrustrationDetector {
    pub fn new(config: FrustrationConfig) -> Self {
        Self {
            config,
            recent: HashMap::new(),
        }
    }

    /// Record an interaction on `key` at `now`; returns true when it reaches
    /// the friction threshold.
    pub fn record(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        let window = ms(self.config.window_ms);

        // Drop stale history for every key so the map stays bounded
        self.recent.retain(|_, stamps| {
            stamps.retain(|t| now.signed_duration_since(*t) <= window);
            !stamps.is_empty()
        });

        let stamps = self.recent.entry(key.to_string()).or_default();
        stamps.push(now);

        if stamps.len() >= self.config.threshold {
            self.recent.remove(key);
            return true;
        }
        false
    }

    /// Keys with interactions still inside the window
    pub fn tracked_keys(&self) -> usize {
        self.recent.len()
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::classifier::ElementClassifier;
    use crate::behavior::types::InteractionTarget;
    use chrono::{Duration, TimeZone};

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn describe(target: InteractionTarget) -> ElementDescriptor {
        ElementClassifier::default().describe(&target)
    }

    #[test]
    fn test_identity_key_precedence() {
        let with_id = describe(
            InteractionTarget::new("button")
                .with_id("checkout")
                .with_data("testid", "checkout-btn")
                .with_text("Checkout"),
        );
        assert_eq!(identity_key(&with_id), "checkout");

        let with_test_id = describe(
            InteractionTarget::new("button")
                .with_data("testid", "checkout-btn")
                .with_text("Checkout"),
        );
        assert_eq!(identity_key(&with_test_id), "checkout-btn");

        let text_only = describe(
            InteractionTarget::new("div").with_text("A very long label that keeps going"),
        );
        assert_eq!(identity_key(&text_only), "div:A very long label t");
    }

    #[test]
    fn test_below_threshold_never_fires() {
        let mut detector = FrustrationDetector::default();
        assert!(!detector.record("buy", at(0)));
        assert!(!detector.record("buy", at(200)));
    }

    #[test]
    fn test_threshold_fires_once() {
        let mut detector = FrustrationDetector::default();
        assert!(!detector.record("buy", at(0)));
        assert!(!detector.record("buy", at(200)));
        assert!(detector.record("buy", at(400)));
        // history was cleared
        assert!(!detector.record("buy", at(500)));
    }

    #[test]
    fn test_window_expiry() {
        let mut detector = FrustrationDetector::default();
        assert!(!detector.record("buy", at(0)));
        assert!(!detector.record("buy", at(600)));
        // the first click is now outside the window
        assert!(!detector.record("buy", at(1300)));
        assert!(detector.record("buy", at(1400)));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut detector = FrustrationDetector::default();
        assert!(!detector.record("a", at(0)));
        assert!(!detector.record("b", at(10)));
        assert!(!detector.record("a", at(20)));
        assert!(!detector.record("b", at(30)));
        assert_eq!(detector.tracked_keys(), 2);
    }

    #[test]
    fn test_stale_keys_are_pruned() {
        let mut detector = FrustrationDetector::default();
        detector.record("a", at(0));
        detector.record("b", at(5000));
        assert_eq!(detector.tracked_keys(), 1);
    }

    #[test]
    fn test_custom_threshold() {
        let mut detector = FrustrationDetector::new(FrustrationConfig {
            window_ms: 500,
            threshold: 2,
        });
        assert!(!detector.record("x", at(0)));
        assert!(detector.record("x", at(100)));
    }

    #[test]
    fn test_oversized_window_saturates() {
        let mut detector = FrustrationDetector::new(FrustrationConfig {
            window_ms: u64::MAX,
            threshold: 3,
        });
        assert!(!detector.record("x", at(0)));
        assert!(!detector.record("x", at(60_000)));
        assert!(detector.record("x", at(3_600_000)));
    }
}
