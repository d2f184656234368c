//! Shared primitives used across Navshield crates.

use core::fmt;

/// Result alias used across the workspace.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Broad failure classes. Every class is recovered locally by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input that could not be parsed, such as an unparseable URL.
    MalformedInput,
    /// A collaborator (settings store, rule provider) could not answer.
    ResolverUnavailable,
    /// The decision was superseded by a newer navigation on the same tab.
    StaleDecision,
    /// Engine configuration failed validation.
    InvalidConfiguration,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MalformedInput => "malformed_input",
            Self::ResolverUnavailable => "resolver_unavailable",
            Self::StaleDecision => "stale_decision",
            Self::InvalidConfiguration => "invalid_configuration",
        }
    }
}

/// Top-level error type for policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyError {
    pub code: &'static str,
    pub kind: ErrorKind,
    pub message: String,
}

impl PolicyError {
    pub fn new(code: &'static str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code,
            kind,
            message: message.into(),
        }
    }

    pub fn malformed(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, ErrorKind::MalformedInput, message)
    }

    pub fn unavailable(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, ErrorKind::ResolverUnavailable, message)
    }

    pub fn invalid_config(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, ErrorKind::InvalidConfiguration, message)
    }
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PolicyError {}
