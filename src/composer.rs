//! Decision composition
//!
//! Maps a [`Resolution`] to the [`Decision`] handed to the rendering layer. All
//! lookups go through [`CategoryTable`]s, and section order is a fixed
//! function of funnel stage.

use crate::config::CategoryTable;
use crate::types::{
    ContentVariant, Cta, CtaPriority, Decision, FunnelStage, Resolution, SectionId,
};
use serde::{Deserialize, Serialize};

/// Category-keyed content variants and layout templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentTables {
    pub variants: CategoryTable<ContentVariant>,
    pub templates: CategoryTable<String>,
}

fn variant(
    headline: &str,
    subheadline: &str,
    cta_text: &str,
    cta_link: &str,
    badge: &str,
    hero_asset_key: &str,
    funnel_stage: FunnelStage,
) -> ContentVariant {
    ContentVariant {
        headline: headline.to_string(),
        subheadline: subheadline.to_string(),
        cta_text: cta_text.to_string(),
        cta_link: cta_link.to_string(),
        badge: badge.to_string(),
        hero_asset_key: hero_asset_key.to_string(),
        funnel_stage,
    }
}

impl Default for ContentTables {
    fn default() -> Self {
        Self {
            variants: CategoryTable {
                gaming: variant(
                    "Frames that keep up with you",
                    "High-refresh rigs and peripherals tuned for competitive play",
                    "Shop gaming gear",
                    "/collections/gaming",
                    "Esports ready",
                    "hero/gaming-battlestation",
                    FunnelStage::ReadyToBuy,
                ),
                creator: variant(
                    "Built for the creative workflow",
                    "Color-accurate displays and the power to render without waiting",
                    "Explore creator setups",
                    "/collections/creator",
                    "Creator picks",
                    "hero/creator-studio",
                    FunnelStage::Comparing,
                ),
                business: variant(
                    "Equip your team in one order",
                    "Fleet pricing, managed warranties and fast provisioning",
                    "Compare business plans",
                    "/business/compare",
                    "Volume pricing",
                    "hero/business-office",
                    FunnelStage::Comparing,
                ),
                student: variant(
                    "Ready for every semester",
                    "Lightweight laptops with education pricing",
                    "See student deals",
                    "/collections/student",
                    "Education pricing",
                    "hero/student-campus",
                    FunnelStage::Exploring,
                ),
                budget: variant(
                    "More for less, all week",
                    "Hand-picked deals with real price history",
                    "Shop today's deals",
                    "/deals",
                    "Limited-time deals",
                    "hero/budget-deals",
                    FunnelStage::ReadyToBuy,
                ),
                premium: variant(
                    "The flagship collection",
                    "Our best hardware, white-glove delivery included",
                    "Discover flagship models",
                    "/collections/flagship",
                    "Flagship",
                    "hero/premium-flagship",
                    FunnelStage::Exploring,
                ),
                default: variant(
                    "Find the right setup for you",
                    "Laptops, displays and accessories for every kind of work and play",
                    "Browse all products",
                    "/collections/all",
                    "Free shipping",
                    "hero/default-lineup",
                    FunnelStage::Exploring,
                ),
            },
            templates: CategoryTable {
                gaming: "immersive-dark".to_string(),
                creator: "portfolio-grid".to_string(),
                business: "split-comparison".to_string(),
                student: "friendly-cards".to_string(),
                budget: "deal-banner".to_string(),
                premium: "editorial-showcase".to_string(),
                default: "standard-hero".to_string(),
            },
        }
    }
}

/// Section order for a funnel stage; one of exactly three permutations
pub fn section_order(stage: FunnelStage) -> [SectionId; 3] {
    match stage {
        FunnelStage::ReadyToBuy => [SectionId::Products, SectionId::Comparison, SectionId::Trust],
        FunnelStage::Comparing => [SectionId::Comparison, SectionId::Products, SectionId::Trust],
        FunnelStage::Exploring => [SectionId::Trust, SectionId::Products, SectionId::Comparison],
    }
}

/// CTA emphasis for a funnel stage
pub fn cta_priority(stage: FunnelStage) -> CtaPriority {
    match stage {
        FunnelStage::ReadyToBuy => CtaPriority::Primary,
        FunnelStage::Comparing => CtaPriority::Secondary,
        FunnelStage::Exploring => CtaPriority::Soft,
    }
}

/// Composer over immutable content tables
#[derive(Debug, Clone, Default)]
pub struct DecisionComposer {
    tables: ContentTables,
}

impl DecisionComposer {
    pub fn new(tables: ContentTables) -> Self {
        Self { tables }
    }

    /// Compose the final decision.
    ///
    /// `collector_notes` come first in `edge_case_notes`, followed by the
    /// resolver's notes.
    pub fn compose(&self, resolution: Resolution, collector_notes: Vec<String>) -> Decision {
        let category = resolution.category;
        let variant = self.tables.variants.get(category);
        let template_id = self.tables.templates.get(category).clone();
        let funnel_stage = variant.funnel_stage;
        let priority = cta_priority(funnel_stage);
        let order = section_order(funnel_stage);

        let mut edge_case_notes = collector_notes;
        edge_case_notes.extend(resolution.notes);

        let cta = Cta {
            text: variant.cta_text.clone(),
            link: variant.cta_link.clone(),
            priority,
        };

        let reasoning_log = vec![
            format!(
                "Resolved category: {} (confidence: {})",
                category, resolution.confidence
            ),
            format!("Selected template: {}", template_id),
            format!(
                "Funnel stage: {} (CTA priority: {})",
                funnel_stage.as_str(),
                priority.as_str()
            ),
            format!("Hero asset: {}", variant.hero_asset_key),
            format!(
                "Section order: {}",
                order.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" → ")
            ),
            format!("Primary CTA: \"{}\" → {}", cta.text, cta.link),
            format!("Edge cases handled: {}", edge_case_notes.len()),
        ];

        Decision {
            category,
            confidence: resolution.confidence,
            template_id,
            funnel_stage,
            headline: variant.headline.clone(),
            subheadline: variant.subheadline.clone(),
            badge: variant.badge.clone(),
            cta,
            section_order: order,
            hero_asset_key: variant.hero_asset_key.clone(),
            score_board: resolution.score_board,
            reasoning: resolution.reasoning,
            edge_case_notes,
            reasoning_log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::IntentResolver;
    use crate::types::{Category, Confidence, Signal, SignalSource};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn resolution_for(category: Category, weight: f64) -> Resolution {
        IntentResolver::default().resolve(&[Signal::new(
            SignalSource::CategoryTag,
            "tag",
            category.as_str(),
            category,
            weight,
        )])
    }

    #[test]
    fn test_section_orders_are_fixed_permutations() {
        let orders = [
            section_order(FunnelStage::ReadyToBuy),
            section_order(FunnelStage::Comparing),
            section_order(FunnelStage::Exploring),
        ];

        assert_eq!(orders[0][0], SectionId::Products);
        assert_eq!(orders[1][0], SectionId::Comparison);
        assert_eq!(orders[2][0], SectionId::Trust);

        for order in orders {
            let mut ids = order.to_vec();
            ids.sort_by_key(|s| s.as_str());
            ids.dedup();
            assert_eq!(ids.len(), 3);
        }
    }

    #[test]
    fn test_compose_gaming_decision() {
        let decision = DecisionComposer::default().compose(resolution_for(Category::Gaming, 0.9), vec![]);

        assert_eq!(decision.category, Category::Gaming);
        assert_eq!(decision.confidence, Confidence::High);
        assert_eq!(decision.template_id, "immersive-dark");
        assert_eq!(decision.funnel_stage, FunnelStage::ReadyToBuy);
        assert_eq!(decision.cta.priority, CtaPriority::Primary);
        assert_eq!(decision.section_order, section_order(FunnelStage::ReadyToBuy));
        assert_eq!(decision.hero_asset_key, "hero/gaming-battlestation");
        assert_eq!(decision.score_board.get(Category::Gaming), 0.9);
    }

    #[test]
    fn test_reasoning_log_order() {
        let decision = DecisionComposer::default().compose(
            resolution_for(Category::Business, 0.9),
            vec!["malformed encoding in `q`; using raw value".to_string()],
        );

        let log = &decision.reasoning_log;
        assert_eq!(log.len(), 7);
        assert!(log[0].starts_with("Resolved category: business"));
        assert!(log[1].contains("split-comparison"));
        assert!(log[2].contains("comparing"));
        assert!(log[3].contains("hero/business-office"));
        assert!(log[4].starts_with("Section order: comparison"));
        assert!(log[5].contains("/business/compare"));
        assert_eq!(log[6], "Edge cases handled: 1");
    }

    #[test]
    fn test_notes_merge_collector_first() {
        let decision = DecisionComposer::default().compose(
            IntentResolver::default().resolve(&[]),
            vec!["empty visit".to_string()],
        );
        assert_eq!(decision.category, Category::Default);
        assert_eq!(decision.template_id, "standard-hero");
        assert_eq!(decision.edge_case_notes[0], "empty visit");
        assert_eq!(decision.edge_case_notes.len(), 2);
    }

    #[test]
    fn test_every_category_has_stage_consistent_layout() {
        let composer = DecisionComposer::default();
        for category in Category::NAMED {
            let decision = composer.compose(resolution_for(category, 1.0), vec![]);
            assert_eq!(decision.section_order, section_order(decision.funnel_stage));
            assert_eq!(decision.cta.priority, cta_priority(decision.funnel_stage));
        }
    }

    #[test]
    fn test_custom_tables() {
        let mut tables = ContentTables::default();
        tables.templates.student = "campus-v2".to_string();
        tables.variants.student.funnel_stage = FunnelStage::ReadyToBuy;

        let decision = DecisionComposer::new(tables).compose(resolution_for(Category::Student, 0.9), vec![]);
        assert_eq!(decision.template_id, "campus-v2");
        assert_eq!(decision.section_order[0], SectionId::Products);
    }

    #[test]
    fn test_decision_serialization() {
        let decision = DecisionComposer::default().compose(resolution_for(Category::Budget, 0.85), vec![]);
        let value = serde_json::to_value(&decision).unwrap();
        assert_eq!(value["category"], "budget");
        assert_eq!(value["funnel_stage"], "ready_to_buy");
        assert_eq!(value["section_order"][0], "products");
        assert_eq!(value["cta"]["priority"], "primary");
        assert_eq!(value["score_board"]["budget"], 0.85);
    }

    proptest! {
        #[test]
        fn property_section_order_follows_funnel_stage(
            signals in proptest::collection::vec(
                (proptest::sample::select(Category::NAMED.to_vec()), 0.0f64..=1.0),
                0..10,
            )
        ) {
            let signals: Vec<Signal> = signals
                .into_iter()
                .map(|(category, weight)| {
                    Signal::new(SignalSource::Campaign, "utm_campaign", "x", category, weight)
                })
                .collect();
            let resolution = IntentResolver::default().resolve(&signals);
            let decision = DecisionComposer::default().compose(resolution, vec![]);
            prop_assert_eq!(decision.section_order, section_order(decision.funnel_stage));
            prop_assert_eq!(decision.cta.priority, cta_priority(decision.funnel_stage));
        }
    }
}
