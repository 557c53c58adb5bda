//! Heuristic "automation percentage" for a conversion.
//!
//! The score is a diagnostic ratio of rules that fired on the source against
//! rules plus constructs that usually need a human look in the output. It says
//! nothing about whether the generated model is correct.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::conversion_rule::RuleTable;

static CASE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"\bCASE\s+WHEN\b.*?\bTHEN\b.*?\bELSE\b.*?\bEND\b")
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .expect("case block indicator is a valid regex")
});

static JOIN_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"\bJOIN\b")
        .case_insensitive(true)
        .build()
        .expect("join indicator is a valid regex")
});

static GROUP_BY: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"\bGROUP\s+BY\b")
        .case_insensitive(true)
        .build()
        .expect("group by indicator is a valid regex")
});

/// Joins beyond this count are flagged for manual review
const JOIN_REVIEW_THRESHOLD: usize = 2;

/// Fallback and ceiling applied by [`estimate_automation`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Returned when neither rules nor indicators match
    pub fallback: f64,
    /// Upper bound on the score; `None` leaves it uncapped
    pub ceiling: Option<f64>,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            fallback: 0.0,
            ceiling: None,
        }
    }
}

/// Indicators in converted text that usually need manual intervention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ManualIndicators {
    pub case_block: bool,
    pub many_joins: bool,
    pub group_by: bool,
}

impl ManualIndicators {
    pub fn detect(transformed: &str) -> Self {
        Self {
            case_block: CASE_BLOCK.is_match(transformed),
            many_joins: JOIN_KEYWORD.find_iter(transformed).count() > JOIN_REVIEW_THRESHOLD,
            group_by: GROUP_BY.is_match(transformed),
        }
    }

    pub fn count(&self) -> usize {
        [self.case_block, self.many_joins, self.group_by]
            .iter()
            .filter(|present| **present)
            .count()
    }
}

/// Score in `[0, 100]`: `100 * matched / (matched + manual)`
pub fn estimate_automation(
    rules: &RuleTable,
    policy: &ScoringPolicy,
    original: &str,
    transformed: &str,
) -> f64 {
    let matched = rules.count_matching(original);
    let manual = ManualIndicators::detect(transformed).count();

    let total = matched + manual;
    if total == 0 {
        return policy.fallback;
    }

    let score = 100.0 * matched as f64 / total as f64;
    match policy.ceiling {
        Some(ceiling) => score.min(ceiling),
        None => score,
    }
}
