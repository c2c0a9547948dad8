use std::collections::HashSet;

use yif_core::rules::{RouteScope, Rule, RuleAction};
use yif_core::types::FeatureFlag;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
}

/// Drop exact duplicates, keeping the first occurrence and load order.
pub fn optimize_rules(rules: &mut Vec<Rule>) -> OptimizeStats {
    let before = rules.len();

    let mut seen: HashSet<RuleKey> = HashSet::new();
    let mut deduped = 0usize;
    rules.retain(|rule| {
        if seen.insert(RuleKey::from(rule)) {
            true
        } else {
            deduped += 1;
            false
        }
    });

    let after = rules.len();

    OptimizeStats {
        before,
        after,
        deduped,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RuleKey {
    flag: FeatureFlag,
    scope: RouteScope,
    action: RuleAction,
    selector: String,
}

impl From<&Rule> for RuleKey {
    fn from(rule: &Rule) -> Self {
        Self {
            flag: rule.flag(),
            scope: rule.scope(),
            action: rule.action().clone(),
            selector: rule.source().to_string(),
        }
    }
}
