//! Error types shared by every layer of the runtime
//!
//! Batch operations (loading, instantiation, reload) discover as many errors
//! as they can in one pass and hand them back together in an [`ErrorReport`].

use core::fmt;

use thiserror::Error;

/// A single failure discovered while loading, instantiating or reloading
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// No constructor is registered under this type name
    #[error("unknown type '{type_name}' for '{object}'")]
    UnknownType { object: String, type_name: String },

    /// A reference slot names an identifier that exists nowhere
    #[error("unresolved reference from '{object}'.{slot} to '{target}'")]
    UnresolvedReference {
        object: String,
        slot: String,
        target: String,
    },

    /// Declared component dependencies form a cycle
    #[error("dependency cycle: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    /// A component depends on a type no sibling provides
    #[error("component '{component}' depends on type '{dependency}' which is not present in its composite")]
    MissingDependency {
        component: String,
        dependency: String,
    },

    /// A staged candidate refused to replace the live object
    #[error("staged replacement for '{object}' rejected: {reason}")]
    StagedReplacementRejected { object: String, reason: String },

    /// The same identifier was declared twice, or collides with a live one
    #[error("duplicate identifier '{0}'")]
    DuplicateIdentifier(String),

    /// Identifier is empty or blank
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// Staged initialization failed outside of a reload
    #[error("initialization of '{object}' failed: {reason}")]
    InitFailed { object: String, reason: String },

    /// An object is embedded by more than one owner
    #[error("'{target}' is embedded by both '{first}' and '{second}'")]
    OwnershipConflict {
        target: String,
        first: String,
        second: String,
    },

    /// An embedded reference points at an object outside its own batch
    #[error("embedded reference from '{object}'.{slot} to '{target}' must point into the same batch")]
    ForeignEmbed {
        object: String,
        slot: String,
        target: String,
    },

    /// A component pointer path could not be resolved
    #[error("component pointer '{path}' from '{component}': {reason}")]
    ComponentPath {
        component: String,
        path: String,
        reason: String,
    },
}

/// Reason given by an object or component that refused to initialize
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InitError(pub String);

impl InitError {
    /// Create from any displayable reason
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    /// The reason text
    pub fn reason(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InitError {
    fn from(reason: &str) -> Self {
        Self(reason.to_string())
    }
}

impl From<String> for InitError {
    fn from(reason: String) -> Self {
        Self(reason)
    }
}

/// Result type alias for single-error operations
pub type Result<T> = core::result::Result<T, Error>;

/// A non-empty list of errors collected in one pass
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorReport {
    errors: Vec<Error>,
}

impl ErrorReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Record an error
    pub fn push(&mut self, error: Error) {
        self.errors.push(error);
    }

    /// Merge another report into this one
    pub fn merge(&mut self, other: ErrorReport) {
        self.errors.extend(other.errors);
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of recorded errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Recorded errors, in discovery order
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Iterate over recorded errors
    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.errors.iter()
    }

    /// Consume the report
    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }

    /// Check whether any recorded error matches a predicate
    pub fn contains(&self, predicate: impl Fn(&Error) -> bool) -> bool {
        self.errors.iter().any(predicate)
    }

    /// `Ok(value)` when nothing was recorded, otherwise `Err(self)`
    pub fn into_result<T>(self, value: T) -> core::result::Result<T, ErrorReport> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    /// Return early with the collected errors, if any
    pub fn check(self) -> core::result::Result<(), ErrorReport> {
        self.into_result(())
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            0 => write!(f, "no errors"),
            1 => write!(f, "{}", self.errors[0]),
            n => {
                write!(f, "{} errors:", n)?;
                for error in &self.errors {
                    write!(f, "\n  - {}", error)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ErrorReport {}

impl From<Error> for ErrorReport {
    fn from(error: Error) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl From<Vec<Error>> for ErrorReport {
    fn from(errors: Vec<Error>) -> Self {
        Self { errors }
    }
}

impl Extend<Error> for ErrorReport {
    fn extend<I: IntoIterator<Item = Error>>(&mut self, iter: I) {
        self.errors.extend(iter);
    }
}

impl IntoIterator for ErrorReport {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

/// Result type alias for batch operations
pub type BatchResult<T> = core::result::Result<T, ErrorReport>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = Error::DependencyCycle {
            path: vec!["X".into(), "Y".into(), "X".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle: X -> Y -> X");
    }

    #[test]
    fn test_report_collects() {
        let mut report = ErrorReport::new();
        assert!(report.is_empty());
        report.push(Error::DuplicateIdentifier("a".into()));
        report.push(Error::InvalidIdentifier("".into()));

        assert_eq!(report.len(), 2);
        assert!(report.contains(|e| matches!(e, Error::DuplicateIdentifier(id) if id == "a")));
        assert!(report.to_string().starts_with("2 errors:"));
        assert!(report.check().is_err());
    }
}
