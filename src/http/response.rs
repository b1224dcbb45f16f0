use std::collections::BTreeMap;

/// What came back for one step. Header names are lower-cased.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub duration_ms: u128,
}
