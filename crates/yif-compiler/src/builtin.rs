//! Built-in rule list
//!
//! The selectors the product ships with. Extra lists compiled at runtime are
//! appended after these.

use yif_core::rules::RuleSet;

use crate::optimizer::optimize_rules;
use crate::parser::{parse_rule_list, RuleParseIssue};

pub const BUILTIN_RULES: &str = r#"
! Intention Filter built-in rules
! Syntax: <category>[@<scope>][:<action>] <selector>

! --- Recommendations (home feed only) ---
recommendations@home ytd-rich-grid-renderer
recommendations@home ytd-rich-section-renderer

! --- Recommendations (watch page) ---
recommendations ytd-watch-next-secondary-results-renderer
recommendations ytd-player .ytp-endscreen-content
recommendations ytd-player .ytp-endscreen-paginate
recommendations ytd-watch-next-secondary-results-renderer #related
recommendations ytd-toggle-button-renderer[aria-label*="autoplay" i]

! --- Shorts ---
shorts ytd-rich-item-renderer[is-shorts]
shorts ytd-rich-grid-row[is-shorts]
shorts ytd-mini-guide-entry-renderer[aria-label*="Shorts"]
shorts ytd-guide-entry-renderer[aria-label*="Shorts"]
shorts ytd-video-renderer[is-shorts]
shorts ytd-rich-section-renderer[section-identifier="shorts"]
shorts ytd-rich-section-renderer[section-identifier="shorts"] ytd-rich-item-renderer
shorts ytd-reel-shelf-renderer
shorts ytd-reel-item-renderer
shorts ytd-reel-shelf-renderer ~ ytd-shelf-renderer[is-shorts]
shorts ytd-section-list-renderer ytd-reel-shelf-renderer
shorts:closest=ytd-guide-entry-renderer a[title="Shorts"]

! --- Autoplay ---
autoplay:clear-autoplay video[autoplay]
autoplay:release-toggle ytd-toggle-button-renderer button[aria-label*="autoplay" i][aria-pressed="true"]

! --- Comments ---
comments ytd-comments#comments
comments ytd-comments#comments ytd-comments-header-renderer
comments ytd-comments#comments ytd-comments-renderer
"#;

/// The built-in rules, parsed and deduplicated.
pub fn builtin_rule_set() -> RuleSet {
    let (rules, issues) = rule_set_with("");
    for issue in issues {
        log::warn!("Built-in rule list: {}", issue);
    }
    rules
}

/// Built-in rules followed by `extra`, deduplicated across both.
///
/// Issues refer to line numbers in `extra`.
pub fn rule_set_with(extra: &str) -> (RuleSet, Vec<RuleParseIssue>) {
    let mut rules = parse_rule_list(BUILTIN_RULES).rules;
    let parsed = parse_rule_list(extra);
    rules.extend(parsed.rules);

    let stats = optimize_rules(&mut rules);
    log::debug!(
        "Compiled {} rules ({} duplicates dropped)",
        stats.after,
        stats.deduped
    );
    (RuleSet::new(rules), parsed.issues)
}
