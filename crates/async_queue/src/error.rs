//! Error types for the async queue

use std::fmt::{Display, Formatter};

use thiserror::Error;

/// A type-erased error, used for hook failures and as the default branch
/// error type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced synchronously to the caller.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Invalid argument: {}", Violations(.violations))]
    InvalidArgument { violations: Vec<ConfigViolation> },

    #[error("Number of enqueued tasks exceeds the maximum results (limit was {max_results})")]
    LimitExceeded { max_results: usize },
}

/// Result type alias for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// A single problem found while validating configuration arguments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigViolation {
    #[error("no arguments provided, this would expand without bound")]
    NoArguments,

    #[error("received {0} arguments, expected one number, two numbers or an options object")]
    TooManyArguments(usize),

    #[error("{0}")]
    InvalidShape(String),

    #[error("option `{0}` was unexpected")]
    UnknownOption(String),

    #[error("option `{0}` was already defined")]
    DuplicateOption(String),

    #[error("option `{0}` expects a function")]
    NotCallable(String),

    #[error("option `{0}` expects a number")]
    ExpectedLimit(String),

    #[error("option `{name}` must not be negative (got {value})")]
    NegativeLimit { name: String, value: i64 },
}

struct Violations<'a>(&'a [ConfigViolation]);

impl Display for Violations<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

/// The optional data collection hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    CollectTransformedData,
    CollectRequeueData,
}

impl Display for HookKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            HookKind::CollectTransformedData => write!(f, "collectTransformedData"),
            HookKind::CollectRequeueData => write!(f, "collectRequeueData"),
        }
    }
}

/// A data collection hook failed. Logged and contained, never returned from
/// a run.
#[derive(Error, Debug)]
#[error("{hook} failed: {source}")]
pub struct HookFailure {
    pub hook: HookKind,
    #[source]
    pub source: BoxError,
}

/// A branch step failed. The branch is abandoned, the run continues.
#[derive(Error, Debug)]
pub enum BranchFailure<E> {
    #[error("operation failed: {0}")]
    Operation(E),

    #[error("callback failed: {0}")]
    Callback(E),

    #[error("requeue failed: {0}")]
    Requeue(E),
}

impl<E> BranchFailure<E> {
    /// The step of the branch that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            BranchFailure::Operation(_) => "operation",
            BranchFailure::Callback(_) => "callback",
            BranchFailure::Requeue(_) => "requeue",
        }
    }
}

impl QueueError {
    /// Create an invalid argument error from a single violation
    pub fn invalid_argument(violation: ConfigViolation) -> Self {
        QueueError::InvalidArgument {
            violations: vec![violation],
        }
    }

    /// Check if this error was caused by malformed arguments
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, QueueError::InvalidArgument { .. })
    }

    /// Check if this error was caused by the result limit
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, QueueError::LimitExceeded { .. })
    }

    /// The individual violations, empty for non-validation errors
    pub fn violations(&self) -> &[ConfigViolation] {
        match self {
            QueueError::InvalidArgument { violations } => violations,
            QueueError::LimitExceeded { .. } => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_helpers() {
        let invalid = QueueError::invalid_argument(ConfigViolation::NoArguments);
        assert!(invalid.is_invalid_argument());
        assert!(!invalid.is_limit_exceeded());
        assert_eq!(invalid.violations(), &[ConfigViolation::NoArguments]);

        let limit = QueueError::LimitExceeded { max_results: 3 };
        assert!(limit.is_limit_exceeded());
        assert!(limit.violations().is_empty());
        assert_eq!(
            limit.to_string(),
            "Number of enqueued tasks exceeds the maximum results (limit was 3)"
        );
    }

    #[test]
    fn test_violations_are_joined() {
        let err = QueueError::InvalidArgument {
            violations: vec![
                ConfigViolation::UnknownOption("depth".to_string()),
                ConfigViolation::NotCallable("shortCircuit".to_string()),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Invalid argument: option `depth` was unexpected; option `shortCircuit` expects a function"
        );
    }

    #[test]
    fn test_branch_failure_stage() {
        let failure: BranchFailure<String> = BranchFailure::Requeue("boom".to_string());
        assert_eq!(failure.stage(), "requeue");
        assert_eq!(failure.to_string(), "requeue failed: boom");

        let hook = HookFailure {
            hook: HookKind::CollectTransformedData,
            source: "bad map".into(),
        };
        assert_eq!(hook.to_string(), "collectTransformedData failed: bad map");
    }
}
