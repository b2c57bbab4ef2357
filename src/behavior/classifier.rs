//! Semantic element classification
//!
//! Finds the actionable element behind an interaction, snapshots it as an
//! [`ElementDescriptor`], scores it against keyword tables and derives an
//! [`EventType`].

use crate::behavior::types::{ElementDescriptor, EventType, InteractionTarget, SemanticScore};
use crate::text::{collapse_and_truncate, contains_keyword};
use crate::types::Category;
use serde::{Deserialize, Serialize};

/// Tags that are interactive without any extra markup
const NATIVE_INTERACTIVE_TAGS: [&str; 6] = ["button", "a", "input", "select", "textarea", "summary"];

/// Roles that mark an element as actionable
const ACTIONABLE_ROLES: [&str; 4] = ["button", "link", "menuitem", "tab"];

/// Data attributes (without the `data-` prefix) that mark a product card
const PRODUCT_MARKERS: [&str; 2] = ["product-card", "product-id"];

/// A keyword and the score it contributes when present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedKeyword {
    pub keyword: String,
    pub weight: f64,
}

impl WeightedKeyword {
    pub fn new(keyword: &str, weight: f64) -> Self {
        Self {
            keyword: keyword.to_lowercase(),
            weight,
        }
    }
}

/// Substring rule mapping element text to a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub pattern: String,
    pub category: Category,
}

impl CategoryRule {
    pub fn new(pattern: &str, category: Category) -> Self {
        Self {
            pattern: pattern.to_lowercase(),
            category,
        }
    }
}

fn weighted(pairs: &[(&str, f64)]) -> Vec<WeightedKeyword> {
    pairs.iter().map(|(k, w)| WeightedKeyword::new(k, *w)).collect()
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

/// Classifier tables and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Ancestor levels searched above the target
    pub max_ancestor_depth: usize,
    pub max_text_len: usize,
    /// Minimum semantic total for a non-product element to produce an event
    pub min_total_score: f64,
    pub text_keywords: Vec<WeightedKeyword>,
    /// Matched against class names and the element id
    pub class_keywords: Vec<WeightedKeyword>,
    pub aria_keywords: Vec<WeightedKeyword>,
    /// Cart or purchase wording
    pub cart_words: Vec<String>,
    /// Comparison wording
    pub compare_words: Vec<String>,
    /// Evaluated in order; first match wins
    pub category_rules: Vec<CategoryRule>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_ancestor_depth: 5,
            max_text_len: 100,
            min_total_score: 2.0,
            text_keywords: weighted(&[
                ("add to cart", 3.0),
                ("buy", 3.0),
                ("checkout", 3.0),
                ("purchase", 3.0),
                ("order", 2.0),
                ("cart", 2.0),
                ("compare", 2.0),
                ("shop", 2.0),
                ("subscribe", 2.0),
                ("sign up", 2.0),
                ("get started", 2.0),
                ("details", 1.0),
                ("learn more", 1.0),
                ("view", 1.0),
                ("deal", 1.0),
                ("explore", 1.0),
            ]),
            class_keywords: weighted(&[
                ("cta", 2.0),
                ("add-to-cart", 2.0),
                ("buy", 2.0),
                ("checkout", 2.0),
                ("btn", 1.0),
                ("button", 1.0),
                ("primary", 1.0),
                ("compare", 1.0),
                ("product", 1.0),
            ]),
            aria_keywords: weighted(&[
                ("cart", 2.0),
                ("buy", 2.0),
                ("purchase", 2.0),
                ("compare", 1.0),
                ("add", 1.0),
                ("view", 1.0),
            ]),
            cart_words: words(&["add to cart", "add to bag", "cart", "buy", "checkout", "purchase"]),
            compare_words: words(&["compare", "comparison", "versus", "vs"]),
            category_rules: vec![
                CategoryRule::new("gaming", Category::Gaming),
                CategoryRule::new("gamer", Category::Gaming),
                CategoryRule::new("rgb", Category::Gaming),
                CategoryRule::new("esports", Category::Gaming),
                CategoryRule::new("creator", Category::Creator),
                CategoryRule::new("studio", Category::Creator),
                CategoryRule::new("design", Category::Creator),
                CategoryRule::new("business", Category::Business),
                CategoryRule::new("office", Category::Business),
                CategoryRule::new("team", Category::Business),
                CategoryRule::new("student", Category::Student),
                CategoryRule::new("campus", Category::Student),
                CategoryRule::new("education", Category::Student),
                CategoryRule::new("deal", Category::Budget),
                CategoryRule::new("sale", Category::Budget),
                CategoryRule::new("discount", Category::Budget),
                CategoryRule::new("budget", Category::Budget),
                CategoryRule::new("premium", Category::Premium),
                CategoryRule::new("flagship", Category::Premium),
                CategoryRule::new("luxury", Category::Premium),
            ],
        }
    }
}

/// Classifier output for one interaction target
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// The actionable element, or the raw target when none was found
    pub element: ElementDescriptor,
    pub score: SemanticScore,
    /// Whether an actionable or natively interactive element was found
    pub captured: bool,
    /// Default event type; `None` when the interaction is ignored
    pub event_type: Option<EventType>,
}

/// Keyword-table element classifier
#[derive(Debug, Clone, Default)]
pub struct ElementClassifier {
    config: ClassifierConfig,
}

impl ElementClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Find and snapshot the actionable element behind `target`.
    ///
    /// Walks the target and at most `max_ancestor_depth` ancestors. Falls back
    /// to the target itself when it is natively interactive.
    pub fn capture(&self, target: &InteractionTarget) -> Option<ElementDescriptor> {
        let actionable = target
            .ancestors()
            .take(self.config.max_ancestor_depth + 1)
            .find(|el| is_actionable(el));

        match actionable {
            Some(el) => Some(self.describe(el)),
            None if has_tag(target, &NATIVE_INTERACTIVE_TAGS) => Some(self.describe(target)),
            None => None,
        }
    }

    /// Snapshot any element, actionable or not
    pub fn describe(&self, el: &InteractionTarget) -> ElementDescriptor {
        let depth = self.config.max_ancestor_depth + 1;
        let is_product_card = el.ancestors().take(depth).any(has_product_marker);
        let in_navigation = has_tag(el, &["a"])
            || el.href.is_some()
            || el.role.as_deref() == Some("link")
            || el.ancestors().take(depth).any(|a| has_tag(a, &["nav"]));

        ElementDescriptor {
            tag: el.tag.to_lowercase(),
            text: collapse_and_truncate(&el.text, self.config.max_text_len),
            class_list: el.class_list.clone(),
            id: el.id.clone(),
            aria_label: el.aria_label.clone(),
            role: el.role.clone(),
            href: el.href.clone(),
            data_attributes: el.data_attributes.clone(),
            is_product_card,
            in_navigation,
        }
    }

    /// Keyword-match score for a captured element
    pub fn score(&self, element: &ElementDescriptor) -> SemanticScore {
        let text = element.text.to_lowercase();
        let mut class_text = element.class_list.join(" ").to_lowercase();
        if let Some(id) = &element.id {
            class_text.push(' ');
            class_text.push_str(&id.to_lowercase());
        }
        let aria = element.aria_label.as_deref().unwrap_or_default().to_lowercase();

        let text_score = keyword_sum(&text, &self.config.text_keywords);
        let class_score = keyword_sum(&class_text, &self.config.class_keywords);
        let aria_score = keyword_sum(&aria, &self.config.aria_keywords);

        let category_guess = self
            .config
            .category_rules
            .iter()
            .find(|rule| text.contains(&rule.pattern) || aria.contains(&rule.pattern))
            .map(|rule| rule.category);

        SemanticScore {
            text_score,
            class_score,
            aria_score,
            total: text_score + class_score + aria_score,
            category_guess,
        }
    }

    /// Default event type, or `None` when the element does not qualify
    pub fn classify(&self, element: &ElementDescriptor, score: &SemanticScore) -> Option<EventType> {
        if score.total < self.config.min_total_score && !element.is_product_card {
            return None;
        }

        let wording = match &element.aria_label {
            Some(label) => format!("{} {}", element.text, label).to_lowercase(),
            None => element.text.to_lowercase(),
        };

        let event_type = if any_word(&wording, &self.config.cart_words) {
            EventType::AddToCart
        } else if any_word(&wording, &self.config.compare_words) {
            EventType::Compare
        } else if element.in_navigation {
            EventType::Navigation
        } else if element.is_product_card {
            EventType::ProductView
        } else {
            EventType::CtaClick
        };

        Some(event_type)
    }

    /// Capture, score and classify in one pass
    pub fn evaluate(&self, target: &InteractionTarget) -> Evaluation {
        match self.capture(target) {
            Some(element) => {
                let score = self.score(&element);
                let event_type = self.classify(&element, &score);
                Evaluation {
                    element,
                    score,
                    captured: true,
                    event_type,
                }
            }
            None => {
                let element = self.describe(target);
                let score = self.score(&element);
                Evaluation {
                    element,
                    score,
                    captured: false,
                    event_type: None,
                }
            }
        }
    }
}

fn has_tag(el: &InteractionTarget, tags: &[&str]) -> bool {
    tags.iter().any(|t| el.tag.eq_ignore_ascii_case(t))
}

fn is_actionable(el: &InteractionTarget) -> bool {
    has_tag(el, &["button", "a"])
        || el
            .role
            .as_deref()
            .is_some_and(|role| ACTIONABLE_ROLES.contains(&role))
        || has_product_marker(el)
}

fn has_product_marker(el: &InteractionTarget) -> bool {
    PRODUCT_MARKERS
        .iter()
        .any(|marker| el.data_attributes.contains_key(*marker))
}

fn keyword_sum(text: &str, keywords: &[WeightedKeyword]) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    keywords
        .iter()
        .filter(|k| contains_keyword(text, &k.keyword))
        .map(|k| k.weight)
        .sum()
}

fn any_word(text: &str, words: &[String]) -> bool {
    words.iter().any(|w| contains_keyword(text, w))
}
