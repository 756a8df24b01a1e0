//! Growth suggestions: which nodes most urgently need more children.

use std::cmp::Ordering;

use itertools::Itertools;

use crate::domain::entities::Suggestion;
use crate::domain::metrics::round_to;
use crate::domain::network::Network;

/// Weight of criticality against depth in the priority score.
const CRITICALITY_WEIGHT: f64 = 100.0;

pub const DEFAULT_SUGGESTION_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct SuggestionRanker {
    limit: usize,
}

impl Default for SuggestionRanker {
    fn default() -> Self {
        Self::new(DEFAULT_SUGGESTION_LIMIT)
    }
}

impl SuggestionRanker {
    /// A limit of zero is raised to one.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn priority(criticality: f64, depth: usize) -> f64 {
        round_to(criticality * CRITICALITY_WEIGHT - depth as f64, 4)
    }

    /// Nodes still needing children with non-zero criticality, highest
    /// priority first, ties broken by id.
    pub fn rank(&self, network: &Network) -> Vec<Suggestion> {
        network
            .nodes()
            .filter(|n| n.metrics.needed_children > 0 && n.metrics.criticality > 0.0)
            .map(|n| Suggestion {
                id: n.id.clone(),
                criticality: n.metrics.criticality,
                current_children: n.metrics.children_count,
                suggested_children: n.metrics.suggested_child_count,
                needed_children: n.metrics.needed_children,
                depth: n.metrics.depth,
                priority: Self::priority(n.metrics.criticality, n.metrics.depth),
                profit: n.metrics.profit,
                value: n.value,
            })
            .sorted_by(|a, b| {
                b.priority
                    .partial_cmp(&a.priority)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .take(self.limit)
            .collect()
    }
}
