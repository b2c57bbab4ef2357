//! Intent resolution
//!
//! Aggregates signals into a [`ScoreBoard`] and picks a winning category with a
//! confidence band. Resolution is pure and deterministic.

use crate::config::ResolverThresholds;
use crate::types::{Category, Confidence, Resolution, ScoreBoard, Signal};
use tracing::debug;

/// Tolerance for threshold comparisons on summed decimal weights
const SCORE_EPSILON: f64 = 1e-9;

/// Resolver over a fixed set of thresholds
#[derive(Debug, Clone, Default)]
pub struct IntentResolver {
    thresholds: ResolverThresholds,
}

impl IntentResolver {
    pub fn new(thresholds: ResolverThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ResolverThresholds {
        &self.thresholds
    }

    /// Resolve signals to a category and confidence
    pub fn resolve(&self, signals: &[Signal]) -> Resolution {
        if signals.is_empty() {
            return Resolution {
                category: Category::Default,
                confidence: Confidence::Low,
                score_board: ScoreBoard::zeroed(),
                ranking: Category::NAMED.to_vec(),
                dominant_signal: None,
                notes: vec!["no signals collected; using default content".to_string()],
                reasoning: "No intent signals were present; showing default content".to_string(),
            };
        }

        let t = &self.thresholds;
        let score_board = ScoreBoard::from_signals(signals);
        let ranking = self.rank(&score_board);

        let top = ranking[0];
        let top_score = score_board.get(top);
        let runner_up_score = ranking.get(1).map(|c| score_board.get(*c)).unwrap_or(0.0);
        let margin = (top_score - runner_up_score).abs();

        let mut notes = Vec::new();

        let (category, confidence) = if at_least(top_score, t.high) {
            (top, Confidence::High)
        } else if at_least(top_score, t.medium) && at_least(margin, t.medium_margin) {
            (top, Confidence::Medium)
        } else if at_least(top_score, t.low) {
            notes.push(format!(
                "imprecise intent: {} leads with {:.2} (margin {:.2})",
                top, top_score, margin
            ));
            (top, Confidence::Low)
        } else {
            notes.push(format!(
                "top score {:.2} for {} is below threshold {:.2}; using default content",
                top_score, top, t.low
            ));
            (Category::Default, Confidence::Low)
        };

        if margin < t.close_contest_margin - SCORE_EPSILON && at_least(top_score, t.medium) {
            let runner_up = ranking.get(1).copied().unwrap_or(Category::Default);
            notes.push(format!(
                "close contest: {} ({:.2}) vs {} ({:.2})",
                top, top_score, runner_up, runner_up_score
            ));
        }

        let dominant_signal = if category == Category::Default {
            None
        } else {
            signals
                .iter()
                .filter(|s| s.category == category)
                .fold(None::<&Signal>, |best, s| match best {
                    Some(b) if b.weight >= s.weight => Some(b),
                    _ => Some(s),
                })
                .cloned()
        };

        let reasoning = match &dominant_signal {
            Some(signal) => format!(
                "Dominant signal `{}` from {} ({}) points to {} with score {:.2}",
                signal.raw_value, signal.source, signal.key, category, top_score
            ),
            None => format!(
                "No category cleared the {:.2} threshold (best: {} at {:.2}); showing default content",
                t.low, top, top_score
            ),
        };

        debug!(
            category = %category,
            confidence = %confidence,
            top_score,
            margin,
            "resolved visit intent"
        );

        Resolution {
            category,
            confidence,
            score_board,
            ranking,
            dominant_signal,
            notes,
            reasoning,
        }
    }

    /// Rank named categories by score. Entries whose score is within the
    /// tie-break margin of the entry ahead of them are ordered by priority.
    fn rank(&self, board: &ScoreBoard) -> Vec<Category> {
        let mut ranked: Vec<(Category, f64)> = Category::NAMED
            .into_iter()
            .map(|c| (c, board.get(c)))
            .collect();

        ranked.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| a.0.priority().cmp(&b.0.priority()))
        });

        // Group runs of adjacent near-equal scores, then order each run by priority.
        // Scores tie only when their raw difference is strictly below the margin.
        // Unscored categories never join a run with scored ones.
        let margin = self.thresholds.tie_break_margin;
        let mut start = 0;
        for i in 1..=ranked.len() {
            let run_ends = i == ranked.len()
                || ranked[i - 1].1 - ranked[i].1 >= margin
                || (ranked[i].1 <= 0.0) != (ranked[i - 1].1 <= 0.0);
            if run_ends {
                ranked[start..i].sort_by_key(|(c, _)| c.priority());
                start = i;
            }
        }

        ranked.into_iter().map(|(c, _)| c).collect()
    }
}

fn at_least(value: f64, threshold: f64) -> bool {
    value >= threshold - SCORE_EPSILON
}
