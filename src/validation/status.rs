//! Status matching: exact codes and `<digit>XX` classes.

use super::types::ExpectedStatus;

/// Whether `actual` satisfies `expected`. Absent or unparsable input never matches.
pub fn matches(expected: Option<&ExpectedStatus>, actual: Option<u16>) -> bool {
    let (Some(expected), Some(actual)) = (expected, actual) else {
        return false;
    };
    match expected {
        ExpectedStatus::Exact(code) => *code == actual,
        ExpectedStatus::Class(digit) => actual / 100 == u16::from(*digit),
        ExpectedStatus::Invalid(_) => false,
    }
}

/// Convenience over raw text, e.g. `matches_str("2XX", 201)`.
pub fn matches_str(expected: &str, actual: u16) -> bool {
    matches(Some(&ExpectedStatus::parse(expected)), Some(actual))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_wildcard() {
        assert!(matches_str("2XX", 201));
        assert!(!matches_str("2XX", 301));
        assert!(matches_str("5xx", 503));
    }

    #[test]
    fn exact_code() {
        let expected = ExpectedStatus::Exact(200);
        assert!(matches(Some(&expected), Some(200)));
        assert!(!matches(Some(&expected), Some(201)));
    }

    #[test]
    fn absent_or_invalid_never_matches() {
        assert!(!matches(None, Some(200)));
        assert!(!matches(Some(&ExpectedStatus::Exact(200)), None));
        assert!(!matches_str("twohundred", 200));
        assert!(!matches_str("2X", 200));
    }
}
