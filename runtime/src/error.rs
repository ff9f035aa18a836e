// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the harvesting engine.
//!
//! Fingerprint, match and selector failures are returned to the caller as
//! values so an operator UI can show actionable feedback. A fingerprint that
//! matches nothing is not an error at all: it yields `count = 0`.

/// All errors the engine can report.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    /// The sample fragment did not parse into exactly one element.
    #[error("parse error: {0}")]
    Parse(String),

    /// The fingerprint is too generic to score safely.
    #[error("fingerprint too generic: {found} candidates exceed the cap of {cap}")]
    TooManyCandidates { found: usize, cap: usize },

    /// A selector string could not be parsed.
    #[error("invalid selector '{selector}': {message}")]
    SelectorSyntax { selector: String, message: String },

    /// Readiness polling exhausted its retry budget.
    #[error("host page not found after {attempts} probes")]
    HostNotFound { attempts: u32 },

    /// Best-effort delivery to the relay failed. Always swallowed by callers.
    #[error("relay delivery failed: {0}")]
    RelayDelivery(String),

    /// A pattern with this name is already committed.
    #[error("pattern already exists: {0}")]
    PatternExists(String),

    /// No pattern with this name is committed.
    #[error("pattern not found: {0}")]
    PatternNotFound(String),

    /// The pattern store backend failed.
    #[error("pattern store error: {0}")]
    Store(String),

    /// A protocol request carried missing or malformed parameters.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl HarvestError {
    /// Stable error code used in protocol error responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse(_) => "E_PARSE",
            Self::TooManyCandidates { .. } => "E_TOO_MANY_CANDIDATES",
            Self::SelectorSyntax { .. } => "E_SELECTOR_SYNTAX",
            Self::HostNotFound { .. } => "E_HOST_NOT_FOUND",
            Self::RelayDelivery(_) => "E_RELAY_DELIVERY",
            Self::PatternExists(_) => "E_PATTERN_EXISTS",
            Self::PatternNotFound(_) => "E_PATTERN_NOT_FOUND",
            Self::Store(_) => "E_STORE",
            Self::InvalidParams(_) => "E_INVALID_PARAMS",
            Self::Config(_) => "E_CONFIG",
        }
    }
}

impl From<rusqlite::Error> for HarvestError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<serde_json::Error> for HarvestError {
    fn from(e: serde_json::Error) -> Self {
        Self::Store(format!("serialization: {e}"))
    }
}

/// Convenience alias used across the engine.
pub type Result<T> = std::result::Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(HarvestError::Parse("x".into()).code(), "E_PARSE");
        assert_eq!(
            HarvestError::TooManyCandidates { found: 3000, cap: 2000 }.code(),
            "E_TOO_MANY_CANDIDATES"
        );
        assert_eq!(
            HarvestError::SelectorSyntax {
                selector: "[".into(),
                message: "bad".into()
            }
            .code(),
            "E_SELECTOR_SYNTAX"
        );
        assert_eq!(HarvestError::HostNotFound { attempts: 3 }.code(), "E_HOST_NOT_FOUND");
    }

    #[test]
    fn test_error_display() {
        let err = HarvestError::TooManyCandidates {
            found: 2500,
            cap: 2000,
        };
        assert_eq!(
            err.to_string(),
            "fingerprint too generic: 2500 candidates exceed the cap of 2000"
        );
    }
}
