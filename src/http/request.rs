use std::collections::BTreeMap;

use super::method::HttpMethod;

/// A fully resolved request for one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl StepRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout_ms: None,
        }
    }
}
