//! nfcheck: response validation and pattern matching for network-function
//! API test steps.
//!
//! The [`validation`] module is the engine: given a [`ValidationContext`]
//! it picks one strategy from an ordered rule table and returns a
//! [`MatchResult`]. [`testing`] drives suites of steps through a
//! [`Transport`] and collects the verdicts into a [`RunReport`].

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod reference;
pub mod testing;
pub mod validation;

pub use config::ValidationConfig;
pub use error::{Error, Result};
pub use http::client::{HttpTransport, Transport};
pub use http::method::HttpMethod;
pub use reference::ReferenceCache;
pub use testing::{RunMode, RunReport, Runner, Step, StepOutcome, Suite};
pub use validation::{
    DiffKind, Difference, ExpectedStatus, MatchResult, PatternClassification, PatternKind,
    ValidationContext, Validator, classify, validate,
};
