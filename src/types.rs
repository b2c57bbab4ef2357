//! Core types for intent resolution
//!
//! This module defines the data structures that flow through each stage of the
//! intent pipeline: visit context, signals, score boards, resolutions, and the
//! final decision handed to the rendering layer.

use crate::text::percent_decode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Base that relative landing URLs such as `/?intent=budget` are joined onto
const LANDING_BASE: &str = "https://storefront.invalid/";

/// Visitor intent category.
///
/// The set is closed. Declaration order doubles as the tie-break priority
/// order (earlier wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Gaming,
    Creator,
    Business,
    Student,
    Budget,
    Premium,
    /// Fallback when no named category wins
    Default,
}

impl Category {
    /// Every named category, in priority order (excludes `Default`)
    pub const NAMED: [Category; 6] = [
        Category::Gaming,
        Category::Creator,
        Category::Business,
        Category::Student,
        Category::Budget,
        Category::Premium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Gaming => "gaming",
            Category::Creator => "creator",
            Category::Business => "business",
            Category::Student => "student",
            Category::Budget => "budget",
            Category::Premium => "premium",
            Category::Default => "default",
        }
    }

    /// Exact (case-insensitive) lookup of a named category.
    ///
    /// `default` is not a name a visitor can ask for, so it yields `None`.
    pub fn from_name(name: &str) -> Option<Category> {
        let name = name.trim();
        Category::NAMED
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
    }

    /// Tie-break priority (lower wins)
    pub fn priority(&self) -> usize {
        Category::NAMED
            .iter()
            .position(|c| c == self)
            .unwrap_or(Category::NAMED.len())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class of visit parameter a signal was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Explicit category override (`?intent=gaming`)
    Override,
    Campaign,
    TrafficSource,
    Medium,
    Search,
    CategoryTag,
    Referrer,
    /// Any parameter not covered by the classes above
    Unrecognized,
}

impl SignalSource {
    /// Classify a (lowercased) parameter key
    pub fn from_param_key(key: &str) -> SignalSource {
        match key {
            "intent" | "force_intent" => SignalSource::Override,
            "utm_campaign" | "campaign" => SignalSource::Campaign,
            "utm_source" | "source" | "ref" => SignalSource::TrafficSource,
            "utm_medium" | "medium" => SignalSource::Medium,
            "q" | "query" | "search" | "s" | "utm_term" | "keyword" => SignalSource::Search,
            "category" | "cat" | "tag" | "collection" => SignalSource::CategoryTag,
            _ => SignalSource::Unrecognized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Override => "override",
            SignalSource::Campaign => "campaign",
            SignalSource::TrafficSource => "traffic_source",
            SignalSource::Medium => "medium",
            SignalSource::Search => "search",
            SignalSource::CategoryTag => "category_tag",
            SignalSource::Referrer => "referrer",
            SignalSource::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A weighted observation tying a piece of visit context to a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Parameter class the value came from
    pub source: SignalSource,
    /// Parameter key (or `referrer`)
    pub key: String,
    /// Decoded value that produced the match
    pub raw_value: String,
    /// Category the value points at
    pub category: Category,
    /// Weight in [0, 1]
    pub weight: f64,
}

impl Signal {
    pub fn new(
        source: SignalSource,
        key: impl Into<String>,
        raw_value: impl Into<String>,
        category: Category,
        weight: f64,
    ) -> Self {
        Self {
            source,
            key: key.into(),
            raw_value: raw_value.into(),
            category,
            weight: weight.clamp(0.0, 1.0),
        }
    }
}

/// Per-category sum of signal weights for one resolution.
///
/// Always carries every named category, zero when unmatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreBoard(BTreeMap<Category, f64>);

impl ScoreBoard {
    /// Board with every named category at zero
    pub fn zeroed() -> Self {
        Self(Category::NAMED.into_iter().map(|c| (c, 0.0)).collect())
    }

    /// Sum signal weights per category
    pub fn from_signals(signals: &[Signal]) -> Self {
        let mut board = Self::zeroed();
        for signal in signals {
            *board.0.entry(signal.category).or_insert(0.0) += signal.weight;
        }
        board
    }

    /// Score for a category (zero when absent)
    pub fn get(&self, category: Category) -> f64 {
        self.0.get(&category).copied().unwrap_or(0.0)
    }

    /// Iterate `(category, score)` in priority order
    pub fn iter(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        self.0.iter().map(|(c, s)| (*c, *s))
    }

    /// Whether every score is zero
    pub fn is_zero(&self) -> bool {
        self.0.values().all(|s| *s == 0.0)
    }
}

impl Default for ScoreBoard {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Qualitative confidence band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visitor readiness state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    /// Ready to transact
    ReadyToBuy,
    /// Actively comparing options
    Comparing,
    /// Exploring, not yet committed
    Exploring,
}

impl FunnelStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunnelStage::ReadyToBuy => "ready_to_buy",
            FunnelStage::Comparing => "comparing",
            FunnelStage::Exploring => "exploring",
        }
    }
}

/// How strongly the hero CTA is styled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CtaPriority {
    Primary,
    Secondary,
    Soft,
}

impl CtaPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            CtaPriority::Primary => "primary",
            CtaPriority::Secondary => "secondary",
            CtaPriority::Soft => "soft",
        }
    }
}

/// Page section below the hero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionId {
    /// Transactional product grid
    Products,
    /// Decision-support comparison table
    Comparison,
    /// Trust-building testimonials and guarantees
    Trust,
}

impl SectionId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionId::Products => "products",
            SectionId::Comparison => "comparison",
            SectionId::Trust => "trust",
        }
    }
}

/// Hero call to action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cta {
    pub text: String,
    pub link: String,
    pub priority: CtaPriority,
}

/// Content copy and assets for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentVariant {
    pub headline: String,
    pub subheadline: String,
    pub cta_text: String,
    pub cta_link: String,
    pub badge: String,
    pub hero_asset_key: String,
    pub funnel_stage: FunnelStage,
}

/// Output of the intent resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Winning category (or `Default`)
    pub category: Category,
    pub confidence: Confidence,
    pub score_board: ScoreBoard,
    /// Named categories ordered by rank after tie-breaking
    pub ranking: Vec<Category>,
    /// Highest-weight signal of the winning category
    pub dominant_signal: Option<Signal>,
    /// Advisory notes produced during resolution
    pub notes: Vec<String>,
    /// Human-readable explanation of the outcome
    pub reasoning: String,
}

/// Structured content/layout decision consumed by the rendering layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub category: Category,
    pub confidence: Confidence,
    pub template_id: String,
    pub funnel_stage: FunnelStage,
    pub headline: String,
    pub subheadline: String,
    pub badge: String,
    pub cta: Cta,
    /// Always one of the three fixed permutations, chosen by `funnel_stage`
    pub section_order: [SectionId; 3],
    pub hero_asset_key: String,
    pub score_board: ScoreBoard,
    pub reasoning: String,
    pub edge_case_notes: Vec<String>,
    pub reasoning_log: Vec<String>,
}

/// Visit context: ordered query parameters plus the referrer.
///
/// Parameter keys are lowercased on construction; values are kept raw and
/// decoded by the collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawVisit", into = "RawVisit")]
pub struct VisitContext {
    params: Vec<(String, String)>,
    referrer: String,
}

impl VisitContext {
    pub fn new<K, V>(params: impl IntoIterator<Item = (K, V)>, referrer: impl Into<String>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            params: params
                .into_iter()
                .map(|(k, v)| (k.as_ref().trim().to_lowercase(), v.into()))
                .filter(|(k, _)| !k.is_empty())
                .collect(),
            referrer: referrer.into(),
        }
    }

    /// Build from a raw query string (with or without a leading `?`).
    ///
    /// Keys are percent-decoded; undecodable keys are kept as-is. Values stay
    /// raw so the collector can note malformed encodings.
    pub fn from_query(query: &str, referrer: impl Into<String>) -> Self {
        let query = query.trim_start_matches('?');
        let pairs = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (decode_key(k), v.to_string()),
                None => (decode_key(pair), String::new()),
            });
        Self::new(pairs, referrer)
    }

    /// Build from a landing URL, absolute or relative to the storefront root.
    ///
    /// Only the query is used; the fragment is dropped. An unparseable URL
    /// yields no parameters.
    pub fn from_url(url: &str, referrer: impl Into<String>) -> Self {
        let query = parse_landing_url(url)
            .and_then(|parsed| parsed.query().map(str::to_string))
            .unwrap_or_default();
        Self::from_query(&query, referrer)
    }
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn referrer(&self) -> &str {
        &self.referrer
    }

    /// No parameters and a blank referrer
    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.referrer.trim().is_empty()
    }
}

fn parse_landing_url(url: &str) -> Option<Url> {
    let url = url.trim();
    match Url::parse(url) {
        Ok(parsed) => Some(parsed),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(LANDING_BASE)
            .and_then(|base| base.join(url))
            .ok(),
        Err(_) => None,
    }
}

fn decode_key(key: &str) -> String {
    percent_decode(key).unwrap_or_else(|| key.to_string())
}

/// Wire form of [`VisitContext`]: a parameter object, a URL, or both
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawVisit {
    /// Landing URL; its query string is parsed before `params`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub referrer: String,
}

impl From<RawVisit> for VisitContext {
    fn from(raw: RawVisit) -> Self {
        let mut visit = match raw.url {
            Some(url) => VisitContext::from_url(&url, raw.referrer),
            None => VisitContext::new(Vec::<(String, String)>::new(), raw.referrer),
        };
        visit.params.extend(
            raw.params
                .into_iter()
                .map(|(k, v)| (k.trim().to_lowercase(), v))
                .filter(|(k, _)| !k.is_empty()),
        );
        visit
    }
}

impl From<VisitContext> for RawVisit {
    fn from(visit: VisitContext) -> Self {
        RawVisit {
            url: None,
            params: visit.params.into_iter().collect(),
            referrer: visit.referrer,
        }
    }
}
