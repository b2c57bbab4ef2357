//! Pluggable classification overrides
//!
//! Middleware runs in registration order after the classifier. The first
//! middleware that returns an override wins; the rest are skipped.

use crate::behavior::types::{
    ElementDescriptor, EventType, MiddlewareData, RawInteraction, SemanticScore,
};

/// What a middleware sees for one interaction
#[derive(Debug, Clone, Copy)]
pub struct MiddlewareContext<'a> {
    pub interaction: &'a RawInteraction,
    pub element: &'a ElementDescriptor,
    pub score: &'a SemanticScore,
    /// Classifier result; `None` when the classifier rejected the element
    pub default_event: Option<&'a EventType>,
}

/// A replacement classification
#[derive(Debug, Clone, PartialEq)]
pub struct MiddlewareOverride {
    pub event_type: EventType,
    pub label: Option<String>,
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl MiddlewareOverride {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            label: None,
            data: serde_json::Map::new(),
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_data(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

pub trait Middleware {
    fn evaluate(&self, ctx: &MiddlewareContext<'_>) -> Option<MiddlewareOverride>;
}

impl<F> Middleware for F
where
    F: Fn(&MiddlewareContext<'_>) -> Option<MiddlewareOverride>,
{
    fn evaluate(&self, ctx: &MiddlewareContext<'_>) -> Option<MiddlewareOverride> {
        self(ctx)
    }
}

/// Ordered, named middleware list
#[derive(Default)]
pub struct MiddlewareChain {
    entries: Vec<(String, Box<dyn Middleware>)>,
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(name, _)| name))
            .finish()
    }
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, middleware: impl Middleware + 'static) {
        self.entries.push((name.to_string(), Box::new(middleware)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First override in registration order, tagged with the middleware name
    pub fn evaluate(&self, ctx: &MiddlewareContext<'_>) -> Option<(EventType, MiddlewareData)> {
        self.entries.iter().find_map(|(name, middleware)| {
            middleware.evaluate(ctx).map(|o| {
                (
                    o.event_type,
                    MiddlewareData {
                        middleware: name.clone(),
                        label: o.label,
                        data: o.data,
                    },
                )
            })
        })
    }
}
