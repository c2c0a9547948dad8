//! CSS-subset selector parser and matcher
//!
//! Rules are written as CSS selectors. The supported subset covers what
//! structural page filtering needs:
//!
//! - type (`ytd-comments`), universal (`*`), `#id` and `.class` selectors
//! - attribute selectors: `[a]`, `[a=v]`, `[a*=v]`, `[a^=v]`, `[a$=v]`,
//!   `[a~=v]`, `[a|=v]`, with an optional ` i` case-insensitivity flag
//! - `:not(<compound>)`
//! - descendant (` `), child (`>`), next-sibling (`+`) and
//!   subsequent-sibling (`~`) combinators
//! - comma-separated selector lists
//!
//! Anything else is a [`SelectorError`]. Matching is pure and works against
//! any [`Document`]; an element lacking an attribute simply does not match.

use crate::dom::Document;

/// Error type for selector compilation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("Empty selector")]
    Empty,
    #[error("Unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("Unexpected end of selector")]
    UnexpectedEnd,
    #[error("Unterminated attribute selector at offset {0}")]
    UnterminatedAttribute(usize),
    #[error("Unterminated string at offset {0}")]
    UnterminatedString(usize),
    #[error("Unsupported pseudo-class ':{0}'")]
    UnsupportedPseudo(String),
    #[error("Combinator without a following selector at offset {0}")]
    DanglingCombinator(usize),
}

// =============================================================================
// Selector AST
// =============================================================================

/// Compiled selector (list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<ComplexSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ComplexSelector {
    subject: Compound,
    /// Combinator/compound pairs walking away from the subject, nearest first.
    context: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    /// Explicit `*`; matches any element on its own.
    universal: bool,
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
    negations: Vec<Compound>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    matcher: Option<AttrMatcher>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrMatcher {
    op: AttrOp,
    value: String,
    case_insensitive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Equals,
    Contains,
    Prefix,
    Suffix,
    Includes,
    DashMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
    NextSibling,
    SubsequentSibling,
}

impl Selector {
    /// Compile a selector.
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let mut parser = Parser { input: source, pos: 0 };
        let alternatives = parser.parse_list()?;
        Ok(Self {
            source: source.trim().to_string(),
            alternatives,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Tag every alternative's subject requires, if they agree on one.
    ///
    /// Used to narrow candidate enumeration (`getElementsByTagName`).
    pub fn key_tag(&self) -> Option<&str> {
        let mut tags = self.alternatives.iter().map(|alt| alt.subject.tag.as_deref());
        let first = tags.next()??;
        tags.all(|tag| tag == Some(first)).then_some(first)
    }

    /// Does the element match any alternative?
    pub fn matches<D: Document>(&self, doc: &D, node: &D::Node) -> bool {
        self.alternatives.iter().any(|alt| alt.matches(doc, node))
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

// =============================================================================
// Matching
// =============================================================================

impl ComplexSelector {
    fn matches<D: Document>(&self, doc: &D, node: &D::Node) -> bool {
        self.subject.matches(doc, node) && self.matches_context(doc, node, 0)
    }

    fn matches_context<D: Document>(&self, doc: &D, node: &D::Node, idx: usize) -> bool {
        let Some((combinator, compound)) = self.context.get(idx) else {
            return true;
        };

        let repeat = matches!(combinator, Combinator::Descendant | Combinator::SubsequentSibling);

        let mut current = combinator.step(doc, node);
        while let Some(candidate) = current {
            if compound.matches(doc, &candidate) && self.matches_context(doc, &candidate, idx + 1) {
                return true;
            }
            if !repeat {
                return false;
            }
            current = combinator.step(doc, &candidate);
        }
        false
    }
}

impl Combinator {
    /// Next element to test when walking away from the subject.
    fn step<D: Document>(self, doc: &D, node: &D::Node) -> Option<D::Node> {
        match self {
            Combinator::Descendant | Combinator::Child => doc.parent(node),
            Combinator::NextSibling | Combinator::SubsequentSibling => doc.previous_sibling(node),
        }
    }
}

impl Compound {
    fn is_empty(&self) -> bool {
        !self.universal
            && self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.negations.is_empty()
    }

    fn matches<D: Document>(&self, doc: &D, node: &D::Node) -> bool {
        if let Some(tag) = &self.tag {
            if doc.tag_name(node) != *tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if doc.attribute(node, "id").as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|class| doc.has_class(node, class)) {
            return false;
        }
        if !self.attrs.iter().all(|attr| attr.matches(doc, node)) {
            return false;
        }
        !self.negations.iter().any(|neg| neg.matches(doc, node))
    }
}

impl AttrSelector {
    fn matches<D: Document>(&self, doc: &D, node: &D::Node) -> bool {
        let Some(actual) = doc.attribute(node, &self.name) else {
            return false;
        };
        let Some(matcher) = &self.matcher else {
            return true;
        };

        let (actual, expected) = if matcher.case_insensitive {
            (actual.to_ascii_lowercase(), matcher.value.to_ascii_lowercase())
        } else {
            (actual, matcher.value.clone())
        };

        match matcher.op {
            AttrOp::Equals => actual == expected,
            AttrOp::Contains => !expected.is_empty() && actual.contains(&expected),
            AttrOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
            AttrOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
            AttrOp::Includes => {
                !expected.is_empty()
                    && !expected.contains(char::is_whitespace)
                    && actual.split_ascii_whitespace().any(|word| word == expected)
            }
            AttrOp::DashMatch => {
                actual == expected
                    || actual
                        .strip_prefix(expected.as_str())
                        .map_or(false, |rest| rest.starts_with('-'))
            }
        }
    }
}

// =============================================================================
// Parser
// =============================================================================

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.input[self.pos..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().map_or(false, char::is_whitespace) {
            self.bump();
        }
        self.pos != start
    }

    fn unexpected(&self) -> SelectorError {
        match self.peek() {
            Some(ch) => SelectorError::UnexpectedChar { ch, offset: self.pos },
            None => SelectorError::UnexpectedEnd,
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), SelectorError> {
        if self.peek() == Some(expected) {
            self.bump();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn parse_list(&mut self) -> Result<Vec<ComplexSelector>, SelectorError> {
        self.skip_whitespace();
        if self.peek().is_none() {
            return Err(SelectorError::Empty);
        }

        let mut alternatives = Vec::new();
        loop {
            self.skip_whitespace();
            alternatives.push(self.parse_complex()?);
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some(',') => {
                    self.bump();
                }
                Some(_) => return Err(self.unexpected()),
            }
        }
        Ok(alternatives)
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, SelectorError> {
        let first = self.parse_compound()?;
        if first.is_empty() {
            return Err(self.unexpected());
        }

        // Left-to-right: compounds[i] is joined to compounds[i + 1] by combinators[i].
        let mut compounds = vec![first];
        let mut combinators = Vec::new();

        loop {
            let had_space = self.skip_whitespace();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => Combinator::Child,
                Some('+') => Combinator::NextSibling,
                Some('~') => Combinator::SubsequentSibling,
                Some(_) if had_space => Combinator::Descendant,
                Some(_) => return Err(self.unexpected()),
            };

            let combinator_at = self.pos;
            if combinator != Combinator::Descendant {
                self.bump();
                self.skip_whitespace();
            }

            let compound = self.parse_compound()?;
            if compound.is_empty() {
                return Err(match self.peek() {
                    Some(_) => self.unexpected(),
                    None => SelectorError::DanglingCombinator(combinator_at),
                });
            }
            combinators.push(combinator);
            compounds.push(compound);
        }

        let subject = compounds.pop().unwrap_or_default();
        let context = combinators
            .into_iter()
            .rev()
            .zip(compounds.into_iter().rev())
            .collect();

        Ok(ComplexSelector { subject, context })
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        let start = self.pos;

        loop {
            match self.peek() {
                Some('*') if self.pos == start => {
                    self.bump();
                    compound.universal = true;
                }
                Some(ch) if self.pos == start && is_ident_start(ch) => {
                    compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
                }
                Some('#') => {
                    self.bump();
                    compound.id = Some(self.parse_ident()?);
                }
                Some('.') => {
                    self.bump();
                    compound.classes.push(self.parse_ident()?);
                }
                Some('[') => {
                    compound.attrs.push(self.parse_attribute()?);
                }
                Some(':') => {
                    self.bump();
                    let name = self.parse_ident()?.to_ascii_lowercase();
                    if name != "not" {
                        return Err(SelectorError::UnsupportedPseudo(name));
                    }
                    self.expect('(')?;
                    self.skip_whitespace();
                    let inner = self.parse_compound()?;
                    if inner.is_empty() {
                        return Err(self.unexpected());
                    }
                    self.skip_whitespace();
                    self.expect(')')?;
                    compound.negations.push(inner);
                }
                _ => break,
            }
        }

        Ok(compound)
    }

    fn parse_ident(&mut self) -> Result<String, SelectorError> {
        let start = self.pos;
        while self.peek().map_or(false, is_ident_char) {
            self.bump();
        }
        if self.pos == start {
            return Err(self.unexpected());
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_attribute(&mut self) -> Result<AttrSelector, SelectorError> {
        let open_at = self.pos;
        self.expect('[')?;
        self.skip_whitespace();
        let name = self.parse_ident()?.to_ascii_lowercase();
        self.skip_whitespace();

        let op = match (self.peek(), self.peek_second()) {
            (Some(']'), _) => {
                self.bump();
                return Ok(AttrSelector { name, matcher: None });
            }
            (Some('='), _) => AttrOp::Equals,
            (Some('*'), Some('=')) => AttrOp::Contains,
            (Some('^'), Some('=')) => AttrOp::Prefix,
            (Some('$'), Some('=')) => AttrOp::Suffix,
            (Some('~'), Some('=')) => AttrOp::Includes,
            (Some('|'), Some('=')) => AttrOp::DashMatch,
            (None, _) => return Err(SelectorError::UnterminatedAttribute(open_at)),
            _ => return Err(self.unexpected()),
        };
        if op != AttrOp::Equals {
            self.bump();
        }
        self.bump();
        self.skip_whitespace();

        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => self.parse_string(quote)?,
            Some(_) => self.parse_ident()?,
            None => return Err(SelectorError::UnterminatedAttribute(open_at)),
        };
        self.skip_whitespace();

        let mut case_insensitive = false;
        if let Some(flag @ ('i' | 'I' | 's' | 'S')) = self.peek() {
            self.bump();
            case_insensitive = flag.eq_ignore_ascii_case(&'i');
            self.skip_whitespace();
        }

        match self.peek() {
            Some(']') => {
                self.bump();
            }
            Some(_) => return Err(self.unexpected()),
            None => return Err(SelectorError::UnterminatedAttribute(open_at)),
        }

        Ok(AttrSelector {
            name,
            matcher: Some(AttrMatcher { op, value, case_insensitive }),
        })
    }

    fn parse_string(&mut self, quote: char) -> Result<String, SelectorError> {
        let open_at = self.pos;
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some(escaped) => value.push(escaped),
                    None => return Err(SelectorError::UnterminatedString(open_at)),
                },
                Some(ch) if ch == quote => return Ok(value),
                Some(ch) => value.push(ch),
                None => return Err(SelectorError::UnterminatedString(open_at)),
            }
        }
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '-' || !ch.is_ascii()
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || !ch.is_ascii()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDocument;

    fn sample() -> (MemoryDocument, Vec<crate::dom::NodeId>) {
        let mut doc = MemoryDocument::new("/");
        let body = doc.body();
        let player = doc.append(body, "ytd-player", &[("id", "ytd-player")]);
        let endscreen = doc.append(player, "div", &[("class", "ytp-endscreen-content html5-endscreen")]);
        let shelf = doc.append(body, "ytd-reel-shelf-renderer", &[]);
        let shelf_title = doc.append(body, "ytd-shelf-renderer", &[("is-shorts", "")]);
        let toggle = doc.append(body, "ytd-toggle-button-renderer", &[("aria-label", "Autoplay is on")]);
        (doc, vec![player, endscreen, shelf, shelf_title, toggle])
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Selector::parse("   "), Err(SelectorError::Empty));
        assert_eq!(
            Selector::parse("div:hover"),
            Err(SelectorError::UnsupportedPseudo("hover".to_string()))
        );
        assert_eq!(Selector::parse("a[title=\"Shorts]"), Err(SelectorError::UnterminatedString(8)));
        assert_eq!(Selector::parse("a[title"), Err(SelectorError::UnterminatedAttribute(1)));
        assert_eq!(Selector::parse("a >"), Err(SelectorError::DanglingCombinator(2)));
        assert!(matches!(
            Selector::parse("a ! b"),
            Err(SelectorError::UnexpectedChar { ch: '!', .. })
        ));
    }

    #[test]
    fn test_descendant_with_class() {
        let (doc, nodes) = sample();
        let sel = Selector::parse("ytd-player .ytp-endscreen-content").unwrap();
        assert!(sel.matches(&doc, &nodes[1]));
        assert!(!sel.matches(&doc, &nodes[0]));
        assert_eq!(sel.key_tag(), None);
    }

    #[test]
    fn test_universal_selector() {
        let (doc, nodes) = sample();

        let any = Selector::parse("*").unwrap();
        assert!(nodes.iter().all(|node| any.matches(&doc, node)));
        assert_eq!(any.key_tag(), None);

        let under_player = Selector::parse("ytd-player > *").unwrap();
        assert!(under_player.matches(&doc, &nodes[1]));
        assert!(!under_player.matches(&doc, &nodes[0]));

        assert!(Selector::parse("* > div").unwrap().matches(&doc, &nodes[1]));
        assert!(Selector::parse("*.ytp-endscreen-content").unwrap().matches(&doc, &nodes[1]));
        assert!(!Selector::parse("*[is-shorts]").unwrap().matches(&doc, &nodes[2]));
        assert_eq!(Selector::parse("div >"), Err(SelectorError::DanglingCombinator(4)));
    }

    #[test]
    fn test_id_and_child() {
        let (doc, nodes) = sample();
        assert!(Selector::parse("ytd-player#ytd-player").unwrap().matches(&doc, &nodes[0]));
        assert!(Selector::parse("body > ytd-player").unwrap().matches(&doc, &nodes[0]));
        assert!(!Selector::parse("html > ytd-player").unwrap().matches(&doc, &nodes[0]));
    }

    #[test]
    fn test_sibling_combinators() {
        let (doc, nodes) = sample();
        let general = Selector::parse("ytd-reel-shelf-renderer ~ ytd-shelf-renderer[is-shorts]").unwrap();
        assert!(general.matches(&doc, &nodes[3]));
        let adjacent = Selector::parse("ytd-player + ytd-shelf-renderer").unwrap();
        assert!(!adjacent.matches(&doc, &nodes[3]));
        let adjacent = Selector::parse("ytd-reel-shelf-renderer + ytd-shelf-renderer").unwrap();
        assert!(adjacent.matches(&doc, &nodes[3]));
    }

    #[test]
    fn test_attribute_operators() {
        let (doc, nodes) = sample();
        let toggle = &nodes[4];
        assert!(!Selector::parse("[aria-label*=\"autoplay\"]").unwrap().matches(&doc, toggle));
        assert!(Selector::parse("[aria-label*=\"Autoplay\"]").unwrap().matches(&doc, toggle));
        assert!(Selector::parse("[aria-label*=\"autoplay\" i]").unwrap().matches(&doc, toggle));
        assert!(Selector::parse("[aria-label^=Autoplay]").unwrap().matches(&doc, toggle));
        assert!(Selector::parse("[aria-label$='is on']").unwrap().matches(&doc, toggle));
        assert!(Selector::parse("[aria-label~=is]").unwrap().matches(&doc, toggle));
        assert!(!Selector::parse("[aria-label*=\"\"]").unwrap().matches(&doc, toggle));
        assert!(!Selector::parse("[title]").unwrap().matches(&doc, toggle));
    }

    #[test]
    fn test_negation_and_lists() {
        let (doc, nodes) = sample();
        let sel = Selector::parse("ytd-shelf-renderer:not([is-shorts])").unwrap();
        assert!(!sel.matches(&doc, &nodes[3]));

        let list = Selector::parse("ytd-reel-shelf-renderer, ytd-shelf-renderer").unwrap();
        assert!(list.matches(&doc, &nodes[2]));
        assert!(list.matches(&doc, &nodes[3]));
        assert_eq!(list.key_tag(), None);

        let same = Selector::parse("ytd-comments#comments, ytd-comments.x").unwrap();
        assert_eq!(same.key_tag(), Some("ytd-comments"));
    }

    #[test]
    fn test_missing_attributes_never_fail() {
        let (doc, nodes) = sample();
        let sel = Selector::parse("button[aria-pressed=\"true\"][aria-label*=autoplay i]").unwrap();
        for node in &nodes {
            assert!(!sel.matches(&doc, node));
        }
    }
}
