//! Rule and rule set definitions
//!
//! A rule ties one feature flag to one structural pattern, a route scope and
//! an action. Rules are immutable once built; the set groups them by flag in
//! the order they were loaded.

use crate::dom::Document;
use crate::selector::{Selector, SelectorError};
use crate::types::{FeatureFlag, PageContext};

// =============================================================================
// Rule Scope and Action
// =============================================================================

/// Page-context predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RouteScope {
    /// Applies on every route
    #[default]
    Any,
    /// Applies only on discovery/home feeds (never subscriptions or search)
    DiscoveryFeed,
}

impl RouteScope {
    pub fn admits(self, page: &PageContext) -> bool {
        match self {
            Self::Any => true,
            Self::DiscoveryFeed => page.is_discovery_feed(),
        }
    }
}

/// What the engine does with a matched element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum RuleAction {
    /// Hide the matched element
    #[default]
    Hide,
    /// Hide the nearest ancestor-or-self with this tag
    HideClosest(String),
    /// Clear the native media autoplay attribute (one-shot per scan)
    ClearAutoplay,
    /// Activate a pressed toggle once to switch it off (one-shot per scan)
    ReleaseToggle,
}

impl RuleAction {
    /// Does this action leave a hidden mark behind?
    pub fn hides(&self) -> bool {
        matches!(self, Self::Hide | Self::HideClosest(_))
    }
}

// =============================================================================
// Rule
// =============================================================================

/// One declarative match pattern.
///
/// A selector that fails to compile is kept on the rule; the engine logs and
/// skips it at scan time instead of rejecting the whole set.
#[derive(Debug, Clone)]
pub struct Rule {
    flag: FeatureFlag,
    scope: RouteScope,
    action: RuleAction,
    source: String,
    selector: Result<Selector, SelectorError>,
}

impl Rule {
    pub fn new(flag: FeatureFlag, scope: RouteScope, action: RuleAction, selector: &str) -> Self {
        Self {
            flag,
            scope,
            action,
            source: selector.trim().to_string(),
            selector: Selector::parse(selector),
        }
    }

    /// Shorthand for an any-route hide rule.
    pub fn hide(flag: FeatureFlag, selector: &str) -> Self {
        Self::new(flag, RouteScope::Any, RuleAction::Hide, selector)
    }

    pub fn flag(&self) -> FeatureFlag {
        self.flag
    }

    pub fn scope(&self) -> RouteScope {
        self.scope
    }

    pub fn action(&self) -> &RuleAction {
        &self.action
    }

    /// Selector text as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn selector(&self) -> Result<&Selector, &SelectorError> {
        self.selector.as_ref()
    }

    /// Is the rule applicable on this page at all?
    pub fn applies_to(&self, page: &PageContext) -> bool {
        self.scope.admits(page)
    }

    /// Pure match test: applicability, then the structural pattern.
    ///
    /// Never fails; an uncompilable selector matches nothing.
    pub fn matches<D: Document>(&self, doc: &D, node: &D::Node, page: &PageContext) -> bool {
        self.applies_to(page)
            && self
                .selector
                .as_ref()
                .map_or(false, |selector| selector.matches(doc, node))
    }
}

// =============================================================================
// Rule Set
// =============================================================================

/// Ordered rules grouped by feature flag.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    by_flag: [Vec<Rule>; 4],
}

impl RuleSet {
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut set = Self::default();
        for rule in rules {
            set.by_flag[flag_slot(rule.flag)].push(rule);
        }
        set
    }

    /// Rules for one flag, in load order. Pure and total.
    pub fn rules_for(&self, flag: FeatureFlag) -> &[Rule] {
        &self.by_flag[flag_slot(flag)]
    }

    /// All rules, flag by flag.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.by_flag.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_flag.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rules whose selector failed to compile.
    pub fn invalid(&self) -> impl Iterator<Item = (&Rule, &SelectorError)> {
        self.iter()
            .filter_map(|rule| rule.selector().err().map(|err| (rule, err)))
    }

    /// Add rules after the existing ones.
    pub fn extend(&mut self, rules: impl IntoIterator<Item = Rule>) {
        for rule in rules {
            self.by_flag[flag_slot(rule.flag)].push(rule);
        }
    }
}

fn flag_slot(flag: FeatureFlag) -> usize {
    match flag {
        FeatureFlag::HideRecommendations => 0,
        FeatureFlag::HideShorts => 1,
        FeatureFlag::DisableAutoplay => 2,
        FeatureFlag::HideComments => 3,
    }
}
