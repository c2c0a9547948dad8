//! Intention Filter Rule List Compiler
//!
//! This crate compiles line-based rule lists into a [`yif_core::RuleSet`]
//! and carries the built-in list the product ships with.

pub mod parser;
pub mod optimizer;
pub mod builtin;

pub use builtin::{builtin_rule_set, rule_set_with, BUILTIN_RULES};
pub use optimizer::{optimize_rules, OptimizeStats};
pub use parser::{parse_rule_list, IssueKind, ParsedRuleList, RuleParseIssue};
