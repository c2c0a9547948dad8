use yif_core::rules::{RouteScope, Rule, RuleAction};
use yif_core::types::FeatureFlag;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct RuleParseIssue {
    pub line: usize,
    pub kind: IssueKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IssueKind {
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("unknown scope '{0}'")]
    UnknownScope(String),
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("'closest=' needs a tag name")]
    MissingClosestTag,
    #[error("missing selector")]
    MissingSelector,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedRuleList {
    pub rules: Vec<Rule>,
    pub issues: Vec<RuleParseIssue>,
}

/// Parse a rule list.
///
/// Each line is `<category>[@<scope>][:<action>] <selector>`. Lines starting
/// with `!` or `#` are comments. A bad line is reported and skipped; a bad
/// selector is kept on its rule for the engine to skip at scan time.
pub fn parse_rule_list(text: &str) -> ParsedRuleList {
    let mut parsed = ParsedRuleList::default();

    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || is_comment_line(line) {
            continue;
        }

        match parse_rule_line(line) {
            Ok(rule) => parsed.rules.push(rule),
            Err(kind) => parsed.issues.push(RuleParseIssue {
                line: index + 1,
                kind,
            }),
        }
    }

    log::debug!(
        "Parsed {} rules ({} issues)",
        parsed.rules.len(),
        parsed.issues.len()
    );
    parsed
}

fn parse_rule_line(line: &str) -> Result<Rule, IssueKind> {
    let (head, selector) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    let (target, action_text) = match head.split_once(':') {
        Some((target, action)) => (target, Some(action)),
        None => (head, None),
    };
    let (category, scope_text) = match target.split_once('@') {
        Some((category, scope)) => (category, Some(scope)),
        None => (target, None),
    };

    let flag = FeatureFlag::from_category(&category.to_ascii_lowercase())
        .ok_or_else(|| IssueKind::UnknownCategory(category.to_string()))?;
    let scope = match scope_text {
        Some(scope) => parse_scope(scope)?,
        None => RouteScope::Any,
    };
    let action = match action_text {
        Some(action) => parse_action(action)?,
        None => RuleAction::Hide,
    };

    if selector.is_empty() {
        return Err(IssueKind::MissingSelector);
    }

    Ok(Rule::new(flag, scope, action, selector))
}

fn parse_scope(text: &str) -> Result<RouteScope, IssueKind> {
    match text.to_ascii_lowercase().as_str() {
        "any" => Ok(RouteScope::Any),
        "home" => Ok(RouteScope::DiscoveryFeed),
        _ => Err(IssueKind::UnknownScope(text.to_string())),
    }
}

fn parse_action(text: &str) -> Result<RuleAction, IssueKind> {
    let lower = text.to_ascii_lowercase();
    if let Some(tag) = lower.strip_prefix("closest=") {
        if tag.is_empty() {
            return Err(IssueKind::MissingClosestTag);
        }
        return Ok(RuleAction::HideClosest(tag.to_string()));
    }

    match lower.as_str() {
        "hide" => Ok(RuleAction::Hide),
        "clear-autoplay" => Ok(RuleAction::ClearAutoplay),
        "release-toggle" => Ok(RuleAction::ReleaseToggle),
        _ => Err(IssueKind::UnknownAction(text.to_string())),
    }
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('#')
}
