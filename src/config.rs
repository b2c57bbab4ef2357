//! Static configuration tables
//!
//! Keyword tables, source weights, thresholds and tunables are plain data
//! passed into constructors. Every table keyed by category is a
//! [`CategoryTable`], which has one field per category so coverage is checked
//! by the compiler rather than by a default case.

use crate::behavior::classifier::ClassifierConfig;
use crate::behavior::frustration::FrustrationConfig;
use crate::behavior::ledger::LedgerConfig;
use crate::composer::ContentTables;
use crate::error::FluxError;
use crate::types::Category;
use serde::{Deserialize, Serialize};

/// A value for every category, including the default fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTable<T> {
    pub gaming: T,
    pub creator: T,
    pub business: T,
    pub student: T,
    pub budget: T,
    pub premium: T,
    pub default: T,
}

impl<T> CategoryTable<T> {
    pub fn get(&self, category: Category) -> &T {
        match category {
            Category::Gaming => &self.gaming,
            Category::Creator => &self.creator,
            Category::Business => &self.business,
            Category::Student => &self.student,
            Category::Budget => &self.budget,
            Category::Premium => &self.premium,
            Category::Default => &self.default,
        }
    }

    /// Apply `f` to every entry
    pub fn map<U>(&self, mut f: impl FnMut(Category, &T) -> U) -> CategoryTable<U> {
        CategoryTable {
            gaming: f(Category::Gaming, &self.gaming),
            creator: f(Category::Creator, &self.creator),
            business: f(Category::Business, &self.business),
            student: f(Category::Student, &self.student),
            budget: f(Category::Budget, &self.budget),
            premium: f(Category::Premium, &self.premium),
            default: f(Category::Default, &self.default),
        }
    }
}

/// Base weight per parameter class plus the two decay factors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceWeights {
    /// Override value exactly naming a category
    pub override_exact: f64,
    /// Override value matched through the keyword tables
    pub override_fuzzy: f64,
    pub campaign: f64,
    pub traffic_source: f64,
    pub medium: f64,
    pub search: f64,
    pub category_tag: f64,
    /// Referrer matched through the keyword tables
    pub referrer: f64,
    /// Referrer matched a known domain rule
    pub known_referrer: f64,
    pub unrecognized: f64,
    /// Multiplier for the second and later categories matched in one value
    pub compound_factor: f64,
    /// Multiplier for a repeat signal from an already-seen parameter class
    pub repeat_source_decay: f64,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            override_exact: 1.0,
            override_fuzzy: 0.6,
            campaign: 0.8,
            traffic_source: 0.5,
            medium: 0.3,
            search: 0.7,
            category_tag: 0.9,
            referrer: 0.4,
            known_referrer: 0.6,
            unrecognized: 0.25,
            compound_factor: 0.5,
            repeat_source_decay: 0.7,
        }
    }
}

/// Resolver thresholds.
///
/// The three margins are intentionally independent values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverThresholds {
    /// Top score at or above which confidence is high
    pub high: f64,
    /// Top score at or above which confidence can be medium
    pub medium: f64,
    /// Minimum top score for any named category to win
    pub low: f64,
    /// Adjacent scores closer than this are ordered by category priority
    pub tie_break_margin: f64,
    /// Margin below which a close-contest note is added
    pub close_contest_margin: f64,
    /// Margin to the runner-up required for medium confidence
    pub medium_margin: f64,
}

impl Default for ResolverThresholds {
    fn default() -> Self {
        Self {
            high: 0.8,
            medium: 0.4,
            low: 0.3,
            tie_break_margin: 0.05,
            close_contest_margin: 0.15,
            medium_margin: 0.1,
        }
    }
}

/// Referrer host suffix mapped straight to a category.
///
/// `twitch.tv` matches `twitch.tv` and `www.twitch.tv`; `.edu` matches any
/// host under the `edu` label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferrerRule {
    pub pattern: String,
    pub category: Category,
}

impl ReferrerRule {
    pub fn new(pattern: &str, category: Category) -> Self {
        Self {
            pattern: pattern.to_string(),
            category,
        }
    }

    /// Whether `host` (lowercase) equals the pattern or is a subdomain of it
    pub fn matches_host(&self, host: &str) -> bool {
        let suffix = self.pattern.trim_start_matches('.');
        if suffix.is_empty() {
            return false;
        }
        host == suffix
            || host
                .strip_suffix(suffix)
                .is_some_and(|rest| rest.ends_with('.'))
    }
}

/// Configuration for the signal collector and intent resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    /// Keywords per category; the default entry is normally empty
    pub keywords: CategoryTable<Vec<String>>,
    /// Known referrer hosts, checked in order
    pub known_referrers: Vec<ReferrerRule>,
    pub weights: SourceWeights,
    pub thresholds: ResolverThresholds,
}

impl Default for IntentConfig {
    fn default() -> Self {
        fn words(list: &[&str]) -> Vec<String> {
            list.iter().map(|w| w.to_string()).collect()
        }

        Self {
            keywords: CategoryTable {
                gaming: words(&[
                    "gaming", "gamer", "game", "esports", "fps", "rgb", "console", "streamer",
                    "twitch", "gpu", "controller",
                ]),
                creator: words(&[
                    "creator", "creative", "design", "editing", "photo", "studio", "render",
                    "youtube", "podcast", "art",
                ]),
                business: words(&[
                    "business", "office", "enterprise", "b2b", "workstation", "productivity",
                    "team", "professional", "corporate", "saas",
                ]),
                student: words(&[
                    "student", "college", "school", "campus", "university", "edu", "study",
                    "dorm", "semester",
                ]),
                budget: words(&[
                    "budget", "cheap", "deal", "sale", "discount", "coupon", "affordable",
                    "clearance", "bargain", "save",
                ]),
                premium: words(&[
                    "premium", "luxury", "pro", "flagship", "high-end", "elite", "exclusive",
                    "ultra", "signature",
                ]),
                default: Vec::new(),
            },
            known_referrers: vec![
                ReferrerRule::new("twitch.tv", Category::Gaming),
                ReferrerRule::new("discord.com", Category::Gaming),
                ReferrerRule::new("steampowered.com", Category::Gaming),
                ReferrerRule::new("behance.net", Category::Creator),
                ReferrerRule::new("dribbble.com", Category::Creator),
                ReferrerRule::new("linkedin.com", Category::Business),
                ReferrerRule::new(".edu", Category::Student),
                ReferrerRule::new("slickdeals.net", Category::Budget),
                ReferrerRule::new("retailmenot.com", Category::Budget),
            ],
            weights: SourceWeights::default(),
            thresholds: ResolverThresholds::default(),
        }
    }
}

/// Complete configuration for both pipelines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluxConfig {
    pub intent: IntentConfig,
    pub content: ContentTables,
    pub classifier: ClassifierConfig,
    pub frustration: FrustrationConfig,
    pub ledger: LedgerConfig,
}

impl FluxConfig {
    /// Load configuration from JSON; missing sections fall back to defaults
    pub fn from_json(json: &str) -> Result<Self, FluxError> {
        let config: FluxConfig = serde_json::from_str(json)
            .map_err(|e| FluxError::ConfigError(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, FluxError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values that would break weight or window invariants
    pub fn validate(&self) -> Result<(), FluxError> {
        let w = &self.intent.weights;
        let weights = [
            ("override_exact", w.override_exact),
            ("override_fuzzy", w.override_fuzzy),
            ("campaign", w.campaign),
            ("traffic_source", w.traffic_source),
            ("medium", w.medium),
            ("search", w.search),
            ("category_tag", w.category_tag),
            ("referrer", w.referrer),
            ("known_referrer", w.known_referrer),
            ("unrecognized", w.unrecognized),
            ("compound_factor", w.compound_factor),
            ("repeat_source_decay", w.repeat_source_decay),
        ];
        if let Some((name, value)) = weights.iter().find(|(_, v)| !(0.0..=1.0).contains(v)) {
            return Err(FluxError::ConfigError(format!(
                "weight `{}` must be within [0, 1], got {}",
                name, value
            )));
        }

        if self.ledger.batch_size == 0 {
            return Err(FluxError::ConfigError(
                "ledger.batch_size must be at least 1".to_string(),
            ));
        }
        if self.frustration.threshold == 0 {
            return Err(FluxError::ConfigError(
                "frustration.threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
