//! # Response Validation
//!
//! Decides whether a test step passed by comparing the actual status, body
//! and headers against the declared expectation. Everything in here is a
//! pure, synchronous function of its inputs.

pub mod diff;
pub mod dispatch;
pub mod jsonpath;
pub mod logs;
pub mod pattern;
pub mod percent;
pub mod status;
pub mod types;

pub use diff::{Differ, diff};
pub use dispatch::{Capabilities, Rule, RuleTable, Strategy, Validator, judge, validate};
pub use logs::validate_log_pattern;
pub use pattern::{PatternMatch, classify, evaluate};
pub use percent::{flatten, match_percent};
pub use types::{
    DiffKind, Difference, ExpectedStatus, MatchResult, PatternClassification, PatternKind,
    ValidationContext,
};
