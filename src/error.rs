//! Error types for nfcheck.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the crate error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the runner and, internally, by the validation engine.
///
/// The engine never lets these escape `validate`; they are folded into a
/// failed `MatchResult` at the dispatcher boundary.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors with the offending path
    #[error("IO error on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Transport-level failure reported by a step transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// A named expected-payload file could not be located
    #[error("Reference file `{name}` not found at `{}`", path.display())]
    MissingReferenceFile { name: String, path: PathBuf },

    /// A pattern looked like JSON/regex but failed to parse
    #[error("Malformed pattern: {0}")]
    MalformedPattern(String),

    /// Unexpected failure while diffing or flattening
    #[error("Comparison error: {0}")]
    Comparison(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a comparison error.
    pub fn comparison(message: impl Into<String>) -> Self {
        Self::Comparison(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_reference_message_names_file() {
        let err = Error::MissingReferenceFile {
            name: "nf_profile.json".into(),
            path: PathBuf::from("refs/nf_profile.json"),
        };
        let text = err.to_string();
        assert!(text.contains("nf_profile.json"));
        assert!(text.contains("refs/nf_profile.json"));
    }

    #[test]
    fn io_error_includes_path() {
        let err = Error::io(
            "suite.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "IO error on `suite.json`: gone");
    }
}
