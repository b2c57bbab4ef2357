//! Behavioral event types
//!
//! This module defines the types that flow through the behavioral event
//! pipeline: raw interactions, element snapshots, semantic scores, event
//! records and the batches the ledger hands to a sink.

use crate::error::FluxError;
use crate::types::Category;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Snapshot of an interaction target and its ancestor chain.
///
/// Data attribute keys are stored without the `data-` prefix
/// (`product-card`, `testid`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionTarget {
    /// Lowercase tag name
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub class_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data_attributes: BTreeMap<String, String>,
    /// Parent element, if captured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<InteractionTarget>>,
}

impl InteractionTarget {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.class_list.push(class.to_string());
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_aria_label(mut self, label: &str) -> Self {
        self.aria_label = Some(label.to_string());
        self
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    pub fn with_href(mut self, href: &str) -> Self {
        self.href = Some(href.to_string());
        self
    }

    pub fn with_data(mut self, key: &str, value: &str) -> Self {
        self.data_attributes.insert(key.to_string(), value.to_string());
        self
    }

    /// Place this element inside `parent`
    pub fn within(mut self, parent: InteractionTarget) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Iterate this element followed by its ancestors
    pub fn ancestors(&self) -> impl Iterator<Item = &InteractionTarget> {
        std::iter::successors(Some(self), |el| el.parent.as_deref())
    }
}

/// Kind of native interaction that was forwarded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    #[default]
    Click,
    Tap,
    Keyboard,
}

/// A native interaction forwarded by the capture layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInteraction {
    pub target: InteractionTarget,
    pub timestamp: DateTime<Utc>,
    /// Page path the interaction happened on
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub kind: InteractionKind,
}

fn default_path() -> String {
    "/".to_string()
}

impl RawInteraction {
    pub fn click(target: InteractionTarget, timestamp: DateTime<Utc>) -> Self {
        Self {
            target,
            timestamp,
            path: default_path(),
            kind: InteractionKind::Click,
        }
    }

    pub fn on_path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }
}

/// Immutable snapshot of the actionable element behind an interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    pub tag: String,
    /// Whitespace-collapsed text, at most 100 characters
    pub text: String,
    pub class_list: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    pub data_attributes: BTreeMap<String, String>,
    /// Element is, or sits inside, a product card
    pub is_product_card: bool,
    /// Element is a link or sits inside a `nav`
    pub in_navigation: bool,
}

/// Keyword-match score for an element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticScore {
    pub text_score: f64,
    pub class_score: f64,
    pub aria_score: f64,
    /// Sum of the three component scores
    pub total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_guess: Option<Category>,
}

/// Semantic event type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Cart or purchase action
    AddToCart,
    /// Comparison action
    Compare,
    /// Link or navigation action
    Navigation,
    /// Product card interaction
    ProductView,
    /// Generic call to action
    CtaClick,
    /// Rapid repeated clicks on a non-actionable outcome
    Friction,
    /// Type assigned by a middleware override
    #[serde(untagged)]
    Custom(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::AddToCart => "add_to_cart",
            EventType::Compare => "compare",
            EventType::Navigation => "navigation",
            EventType::ProductView => "product_view",
            EventType::CtaClick => "cta_click",
            EventType::Friction => "friction",
            EventType::Custom(name) => name.as_str(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data attached by the middleware that overrode classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiddlewareData {
    /// Name of the middleware that produced the override
    pub middleware: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// A classified behavioral event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event identifier; unique only within the ledger's dedup window
    pub id: String,
    pub event_type: EventType,
    /// Guessed category, or the active content variant when there is no guess
    pub category_or_variant_id: String,
    /// Running sum of semantic totals for the session, including this event
    pub cumulative_session_score: f64,
    pub path: String,
    pub is_friction: bool,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub semantic_score: SemanticScore,
    pub element: ElementDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middleware_data: Option<MiddlewareData>,
}

/// Reason a batch was flushed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushTrigger {
    /// Queue reached the batch size
    BatchFull,
    /// Page lost visibility
    VisibilityHidden,
    /// Navigation away from the page
    PageUnload,
    /// No accepted events for the idle timeout
    Idle,
    /// Fixed interval timer
    Interval,
    /// Explicit call, including the final flush on destroy
    Manual,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::BatchFull => "batch_full",
            FlushTrigger::VisibilityHidden => "visibility_hidden",
            FlushTrigger::PageUnload => "page_unload",
            FlushTrigger::Idle => "idle",
            FlushTrigger::Interval => "interval",
            FlushTrigger::Manual => "manual",
        }
    }
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlushTrigger {
    type Err = FluxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "batch_full" => Ok(FlushTrigger::BatchFull),
            "visibility_hidden" => Ok(FlushTrigger::VisibilityHidden),
            "page_unload" => Ok(FlushTrigger::PageUnload),
            "idle" => Ok(FlushTrigger::Idle),
            "interval" => Ok(FlushTrigger::Interval),
            "manual" => Ok(FlushTrigger::Manual),
            other => Err(FluxError::UnknownTrigger(other.to_string())),
        }
    }
}

/// Dedup counters captured at flush time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
    pub duplicates_dropped: u64,
    /// Ids currently held in the dedup index
    pub tracked_ids: usize,
}

/// An immutable group of flushed event records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    /// Session id of the first queued record
    pub session_id: String,
    pub events: Vec<EventRecord>,
    pub flushed_at: DateTime<Utc>,
    pub trigger: FlushTrigger,
    pub dedup_stats: DedupStats,
}

impl Batch {
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

/// What the flush callback receives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushSummary {
    pub batch_id: String,
    pub event_count: usize,
    pub trigger: FlushTrigger,
    pub flushed_at: DateTime<Utc>,
}

/// Most recent flush
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastFlush {
    pub at: DateTime<Utc>,
    pub trigger: FlushTrigger,
    pub event_count: usize,
}

/// Running ledger counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Accepted pushes
    pub received: u64,
    /// Events handed to the sink
    pub flushed: u64,
    pub batches_sent: u64,
    pub duplicates_dropped: u64,
    pub queue_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_flush: Option<LastFlush>,
}
