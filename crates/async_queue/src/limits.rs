//! Bounds applied to a single expansion run.

use std::fmt::{Display, Formatter};

/// An upper bound on either the expansion depth or the number of admitted
/// tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Limit {
    /// There is no limit.
    #[default]
    Unbounded,

    /// There is an upper limit.
    Max(usize),
}

impl From<usize> for Limit {
    fn from(value: usize) -> Self {
        Limit::Max(value)
    }
}

impl From<Option<usize>> for Limit {
    fn from(value: Option<usize>) -> Self {
        value.map(Limit::Max).unwrap_or(Limit::Unbounded)
    }
}

impl Limit {
    /// Converts a signed bound. Negative values are not representable and
    /// return `None`.
    pub fn from_signed(value: i64) -> Option<Self> {
        usize::try_from(value).ok().map(Limit::Max)
    }

    /// Returns the bound, or `None` if unbounded.
    pub fn max(self) -> Option<usize> {
        match self {
            Limit::Unbounded => None,
            Limit::Max(max) => Some(max),
        }
    }

    /// Returns true if `count` has reached (or passed) this bound.
    pub fn is_reached_by(self, count: usize) -> bool {
        match self {
            Limit::Unbounded => false,
            Limit::Max(max) => count >= max,
        }
    }

    /// Returns true if this bound admits nothing at all.
    pub fn is_zero(self) -> bool {
        self == Limit::Max(0)
    }
}

impl Display for Limit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Limit::Unbounded => write!(f, "unbounded"),
            Limit::Max(max) => write!(f, "{max}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_reached() {
        assert!(!Limit::Unbounded.is_reached_by(usize::MAX));
        assert!(!Limit::Max(3).is_reached_by(2));
        assert!(Limit::Max(3).is_reached_by(3));
        assert!(Limit::Max(0).is_reached_by(0));
    }

    #[test]
    fn test_limit_conversions() {
        assert_eq!(Limit::from_signed(-1), None);
        assert_eq!(Limit::from_signed(0), Some(Limit::Max(0)));
        assert_eq!(Limit::from(None), Limit::Unbounded);
        assert_eq!(Limit::from(Some(4)).max(), Some(4));
        assert!(Limit::Max(0).is_zero());
        assert!(!Limit::Unbounded.is_zero());
        assert_eq!(Limit::Unbounded.to_string(), "unbounded");
    }
}
