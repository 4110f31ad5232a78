use std::fmt;

/// Structured failure from bound derivation.
///
/// Each variant carries a stable numeric code via [`BoundsError::code`] so
/// callers can match on it across releases. An unsatisfiable range is *not*
/// an error — it is reported through `FieldRangeSet::match_possible` and
/// `FieldRange::is_empty`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundsError {
    /// Binding a range set to an index would produce one million or more
    /// scan intervals (`$in` values multiplied across key fields).
    CombinatorialLimit,
    /// `$or` operand was not a nonempty array.
    OrRequiresNonEmptyArray,
    /// A `$or` array element was not a document.
    OrClauseNotDocument,
    /// A `$or` clause used a special-index operator (e.g. `$near`).
    OrClauseSpecial,
    /// `pop_or_clause` was called with no clause left to pop.
    NoOrClauseToPop,
}

impl BoundsError {
    pub fn code(&self) -> u32 {
        match self {
            BoundsError::CombinatorialLimit => 13385,
            BoundsError::OrRequiresNonEmptyArray => 13262,
            BoundsError::OrClauseNotDocument => 13263,
            BoundsError::OrClauseSpecial => 13291,
            BoundsError::NoOrClauseToPop => 13274,
        }
    }
}

impl fmt::Display for BoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundsError::CombinatorialLimit => {
                write!(f, "combinatorial limit of $in partitioning of result set exceeded")
            }
            BoundsError::OrRequiresNonEmptyArray => write!(f, "$or requires nonempty array"),
            BoundsError::OrClauseNotDocument => write!(f, "$or array must contain objects"),
            BoundsError::OrClauseSpecial => write!(f, "$or may not contain 'special' query"),
            BoundsError::NoOrClauseToPop => write!(f, "no or clause to pop"),
        }
    }
}

impl std::error::Error for BoundsError {}
