//! Signal collection
//!
//! Extracts weighted [`Signal`]s from a [`VisitContext`]. Every parameter is
//! classified by key, decoded defensively and scanned against the category
//! keyword tables. Nothing here fails: malformed input is passed through and
//! noted.

use crate::config::{CategoryTable, IntentConfig, ReferrerRule, SourceWeights};
use crate::text::{keyword_position, percent_decode};
use crate::types::{Category, Signal, SignalSource, VisitContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;
use url::Url;

/// Search queries this short (in characters) are ignored
const MIN_SEARCH_QUERY_CHARS: usize = 3;

/// Signals and advisory notes collected from one visit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub signals: Vec<Signal>,
    pub notes: Vec<String>,
}

/// Signal collector over immutable keyword and weight tables
#[derive(Debug, Clone)]
pub struct SignalCollector {
    keywords: CategoryTable<Vec<String>>,
    known_referrers: Vec<ReferrerRule>,
    weights: SourceWeights,
}

impl Default for SignalCollector {
    fn default() -> Self {
        Self::new(&IntentConfig::default())
    }
}

impl SignalCollector {
    /// Create a collector; keyword and referrer patterns are lowercased once here
    pub fn new(config: &IntentConfig) -> Self {
        Self {
            keywords: config.keywords.map(|_, words| {
                words
                    .iter()
                    .map(|w| w.trim().to_lowercase())
                    .filter(|w| !w.is_empty())
                    .collect()
            }),
            known_referrers: config
                .known_referrers
                .iter()
                .map(|rule| ReferrerRule {
                    pattern: rule.pattern.to_lowercase(),
                    category: rule.category,
                })
                .collect(),
            weights: config.weights.clone(),
        }
    }

    /// Collect signals from a visit
    pub fn collect(&self, visit: &VisitContext) -> Collection {
        let mut out = Collection::default();

        if visit.is_empty() {
            out.notes
                .push("empty visit: no parameters or referrer; nothing to collect".to_string());
            return out;
        }

        let mut seen = BTreeSet::new();

        for (key, raw) in visit.params() {
            let source = SignalSource::from_param_key(key);
            let value = self.decode(key, raw, &mut out.notes);
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            let signals = match source {
                SignalSource::Override => self.override_signals(key, value, &mut out.notes),
                SignalSource::Search if value.chars().count() < MIN_SEARCH_QUERY_CHARS => {
                    out.notes.push(format!(
                        "search query `{}` is too short to classify; ignored",
                        value
                    ));
                    Vec::new()
                }
                _ => self.scan(source, key, value, self.base_weight(source)),
            };

            self.admit(source, key, signals, &mut seen, &mut out);
        }

        let referrer = visit.referrer().trim();
        if !referrer.is_empty() {
            let decoded = self.decode("referrer", referrer, &mut out.notes);
            let signals = self.referrer_signals(&decoded);
            self.admit(SignalSource::Referrer, "referrer", signals, &mut seen, &mut out);
        }

        debug!(
            signals = out.signals.len(),
            notes = out.notes.len(),
            "collected visit signals"
        );
        out
    }

    /// Append a parameter's signals, decaying the primary one if its class
    /// already produced signals earlier in the visit.
    ///
    /// Compound (secondary) signals keep only their compound reduction.
    fn admit(
        &self,
        source: SignalSource,
        key: &str,
        mut signals: Vec<Signal>,
        seen: &mut BTreeSet<SignalSource>,
        out: &mut Collection,
    ) {
        if signals.is_empty() {
            return;
        }

        if !seen.insert(source) {
            let decay = self.weights.repeat_source_decay;
            if let Some(primary) = signals.first_mut() {
                primary.weight = (primary.weight * decay).clamp(0.0, 1.0);
            }
            out.notes.push(format!(
                "repeat {} signal from `{}` decayed by {}x",
                source, key, decay
            ));
        }

        out.signals.extend(signals);
    }

    fn decode(&self, key: &str, raw: &str, notes: &mut Vec<String>) -> String {
        match percent_decode(raw) {
            Some(decoded) => decoded,
            None => {
                notes.push(format!(
                    "malformed encoding in `{}`; using raw value",
                    key
                ));
                raw.to_string()
            }
        }
    }

    fn base_weight(&self, source: SignalSource) -> f64 {
        let w = &self.weights;
        match source {
            SignalSource::Override => w.override_exact,
            SignalSource::Campaign => w.campaign,
            SignalSource::TrafficSource => w.traffic_source,
            SignalSource::Medium => w.medium,
            SignalSource::Search => w.search,
            SignalSource::CategoryTag => w.category_tag,
            SignalSource::Referrer => w.referrer,
            SignalSource::Unrecognized => w.unrecognized,
        }
    }

    /// Categories matched by `text`, ordered by first keyword position
    /// (priority order breaks equal positions)
    pub fn match_categories(&self, text: &str) -> Vec<Category> {
        let lower = text.to_lowercase();
        let mut hits: Vec<(usize, usize, Category)> = Category::NAMED
            .into_iter()
            .filter_map(|category| {
                self.keywords
                    .get(category)
                    .iter()
                    .filter_map(|kw| keyword_position(&lower, kw))
                    .min()
                    .map(|pos| (pos, category.priority(), category))
            })
            .collect();

        hits.sort_unstable();
        hits.into_iter().map(|(_, _, category)| category).collect()
    }

    /// Keyword scan of one value. The first matched category gets the full
    /// weight, later ones are reduced by the compound factor.
    fn scan(&self, source: SignalSource, key: &str, value: &str, weight: f64) -> Vec<Signal> {
        self.match_categories(value)
            .into_iter()
            .enumerate()
            .map(|(i, category)| {
                let w = if i == 0 {
                    weight
                } else {
                    weight * self.weights.compound_factor
                };
                Signal::new(source, key, value, category, w)
            })
            .collect()
    }

    fn override_signals(&self, key: &str, value: &str, notes: &mut Vec<String>) -> Vec<Signal> {
        if let Some(category) = Category::from_name(value) {
            return vec![Signal::new(
                SignalSource::Override,
                key,
                value,
                category,
                self.weights.override_exact,
            )];
        }

        match self.match_categories(value).first() {
            Some(&category) => {
                notes.push(format!(
                    "override `{}` is not a category name; fuzzy-matched to {}",
                    value, category
                ));
                vec![Signal::new(
                    SignalSource::Override,
                    key,
                    value,
                    category,
                    self.weights.override_fuzzy,
                )]
            }
            None => {
                notes.push(format!(
                    "override `{}` rejected: no matching category",
                    value
                ));
                Vec::new()
            }
        }
    }

    fn referrer_signals(&self, referrer: &str) -> Vec<Signal> {
        let known = referrer_host(referrer).and_then(|host| {
            self.known_referrers
                .iter()
                .find(|rule| rule.matches_host(&host))
        });

        if let Some(rule) = known {
            return vec![Signal::new(
                SignalSource::Referrer,
                "referrer",
                referrer,
                rule.category,
                self.weights.known_referrer,
            )];
        }

        self.scan(
            SignalSource::Referrer,
            "referrer",
            referrer,
            self.weights.referrer,
        )
    }
}

/// Host of a referrer URL; bare hosts like `twitch.tv/foo` are accepted too
fn referrer_host(referrer: &str) -> Option<String> {
    let parsed = match Url::parse(referrer) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{}", referrer)).ok()?
        }
        Err(_) => return None,
    };
    parsed.host_str().map(|host| host.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn collect(query: &str, referrer: &str) -> Collection {
        SignalCollector::default().collect(&VisitContext::from_query(query, referrer))
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_empty_visit_short_circuits() {
        let out = collect("", "");
        assert!(out.signals.is_empty());
        assert_eq!(out.notes.len(), 1);
        assert!(out.notes[0].contains("empty visit"));
    }

    #[test]
    fn test_exact_override_gets_full_weight() {
        let out = collect("intent=Student", "");
        assert_eq!(out.signals.len(), 1);
        assert_eq!(out.signals[0].category, Category::Student);
        assert_eq!(out.signals[0].source, SignalSource::Override);
        assert_eq!(out.signals[0].weight, 1.0);
        assert!(out.notes.is_empty());
    }

    #[test]
    fn test_fuzzy_override_is_reduced_and_noted() {
        let out = collect("intent=gamer+setup", "");
        assert_eq!(out.signals.len(), 1);
        assert_eq!(out.signals[0].category, Category::Gaming);
        assert!(approx(out.signals[0].weight, 0.6));
        assert!(out.notes.iter().any(|n| n.contains("fuzzy")));
    }

    #[test]
    fn test_unknown_override_rejected() {
        let out = collect("intent=astronaut", "");
        assert!(out.signals.is_empty());
        assert!(out.notes.iter().any(|n| n.contains("rejected")));
    }

    #[test]
    fn test_compound_value_emits_reduced_secondary() {
        let out = collect("utm_campaign=gaming-deals", "");
        assert_eq!(out.signals.len(), 2);

        let first = &out.signals[0];
        let second = &out.signals[1];
        assert_eq!(first.category, Category::Gaming);
        assert_eq!(second.category, Category::Budget);
        assert_eq!(first.source, second.source);
        assert!(approx(first.weight, 0.8));
        assert!(approx(second.weight, 0.4));
        assert!(second.weight < first.weight);
    }

    #[test]
    fn test_compound_order_follows_keyword_position() {
        let out = collect("tag=budget%20gaming", "");
        let categories: Vec<Category> = out.signals.iter().map(|s| s.category).collect();
        assert_eq!(categories, vec![Category::Budget, Category::Gaming]);
    }

    #[test]
    fn test_short_keyword_needs_word_boundary() {
        let out = collect("q=productivity+tools", "");
        let categories: Vec<Category> = out.signals.iter().map(|s| s.category).collect();
        assert_eq!(categories, vec![Category::Business]);

        let out = collect("q=macbook+pro", "");
        assert_eq!(out.signals[0].category, Category::Premium);
    }

    #[test]
    fn test_malformed_encoding_used_as_is() {
        let out = collect("q=gaming%zz", "");
        assert_eq!(out.signals.len(), 1);
        assert_eq!(out.signals[0].raw_value, "gaming%zz");
        assert!(out.notes.iter().any(|n| n.contains("malformed")));
    }

    #[test]
    fn test_short_search_query_ignored() {
        let out = collect("q=pc", "");
        assert!(out.signals.is_empty());
        assert!(out.notes.iter().any(|n| n.contains("too short")));
    }

    #[test]
    fn test_known_referrer_skips_keyword_scan() {
        let out = collect("", "https://www.twitch.tv/somestreamer");
        assert_eq!(out.signals.len(), 1);
        assert_eq!(out.signals[0].category, Category::Gaming);
        assert_eq!(out.signals[0].source, SignalSource::Referrer);
        assert!(approx(out.signals[0].weight, 0.6));
    }

    #[test]
    fn test_known_referrer_matches_host_suffix() {
        let out = collect("", "https://cs.stanford.edu/admissions");
        assert_eq!(out.signals.len(), 1);
        assert_eq!(out.signals[0].category, Category::Student);
        assert!(approx(out.signals[0].weight, 0.6));

        let out = collect("", "twitch.tv/somestreamer");
        assert_eq!(out.signals[0].category, Category::Gaming);
        assert!(approx(out.signals[0].weight, 0.6));
    }

    #[test]
    fn test_known_referrer_ignores_lookalike_hosts() {
        // `.edu` is not a suffix of this host; only the keyword scan runs
        let out = collect("", "https://www.education.com/");
        assert!(out.signals.iter().all(|s| !approx(s.weight, 0.6)));

        let out = collect("", "https://nottwitch.tv.example.com/");
        assert!(out.signals.iter().all(|s| !approx(s.weight, 0.6)));
    }

    #[test]
    fn test_referrer_keyword_scan() {
        let out = collect("", "https://www.google.com/search?q=college+laptop");
        assert_eq!(out.signals.len(), 1);
        assert_eq!(out.signals[0].category, Category::Student);
        assert!(approx(out.signals[0].weight, 0.4));
    }

    #[test]
    fn test_repeat_source_decays_primary() {
        let out = collect("q=gaming+mouse&query=rgb+keyboard", "");
        assert_eq!(out.signals.len(), 2);
        assert!(approx(out.signals[0].weight, 0.7));
        assert!(approx(out.signals[1].weight, 0.7 * 0.7));
        assert!(out.notes.iter().any(|n| n.contains("repeat search")));
    }

    #[test]
    fn test_repeat_decay_does_not_stack_on_compound() {
        let out = collect("q=office&query=gaming+deal", "");
        assert_eq!(out.signals.len(), 3);
        // primary of the repeat value: decayed
        assert_eq!(out.signals[1].category, Category::Gaming);
        assert!(approx(out.signals[1].weight, 0.7 * 0.7));
        // secondary of the repeat value: compound reduction only
        assert_eq!(out.signals[2].category, Category::Budget);
        assert!(approx(out.signals[2].weight, 0.7 * 0.5));
    }

    #[test]
    fn test_unrecognized_param_falls_through() {
        let out = collect("promo=student-week", "");
        assert_eq!(out.signals.len(), 1);
        assert_eq!(out.signals[0].source, SignalSource::Unrecognized);
        assert!(approx(out.signals[0].weight, 0.25));
    }

    #[test]
    fn test_weights_stay_in_unit_range() {
        let out = collect(
            "intent=gaming&utm_campaign=gaming&tag=gaming&q=gaming&s=gaming",
            "https://twitch.tv",
        );
        assert!(out.signals.iter().all(|s| (0.0..=1.0).contains(&s.weight)));
    }

    #[test]
    fn test_custom_tables_are_used() {
        let mut config = IntentConfig::default();
        config.keywords.creator = vec!["Synth".to_string()];
        let collector = SignalCollector::new(&config);

        let out = collector.collect(&VisitContext::from_query("q=modular+synth", ""));
        assert_eq!(out.signals.len(), 1);
        assert_eq!(out.signals[0].category, Category::Creator);
    }
}
