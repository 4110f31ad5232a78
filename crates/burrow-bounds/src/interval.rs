use std::cmp::Ordering;
use std::sync::OnceLock;

use bson::Bson;

use crate::compare::canonical_cmp;

/// One side of an interval of valid values: a value and whether the
/// interval includes it.
#[derive(Debug, Clone)]
pub struct FieldBound {
    value: Bson,
    inclusive: bool,
}

impl FieldBound {
    pub fn new(value: Bson, inclusive: bool) -> Self {
        Self { value, inclusive }
    }

    pub fn value(&self) -> &Bson {
        &self.value
    }

    pub fn inclusive(&self) -> bool {
        self.inclusive
    }

    pub fn flip_inclusive(&mut self) {
        self.inclusive = !self.inclusive;
    }
}

impl PartialEq for FieldBound {
    fn eq(&self, other: &Self) -> bool {
        self.inclusive == other.inclusive
            && canonical_cmp(&self.value, &other.value) == Ordering::Equal
    }
}

/// Order two bounds used as interval *starts*: by value, and at equal
/// values an inclusive start sits before an exclusive one.
pub(crate) fn cmp_as_lower(a: &FieldBound, b: &FieldBound) -> Ordering {
    canonical_cmp(&a.value, &b.value).then(match (a.inclusive, b.inclusive) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => Ordering::Equal,
    })
}

/// Order two bounds used as interval *ends*: by value, and at equal values
/// an exclusive end sits before an inclusive one.
pub(crate) fn cmp_as_upper(a: &FieldBound, b: &FieldBound) -> Ordering {
    canonical_cmp(&a.value, &b.value).then(match (a.inclusive, b.inclusive) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        _ => Ordering::Equal,
    })
}

/// A closed or half-open interval of values, lower and upper [`FieldBound`].
///
/// Carries a lazily computed equality flag: unknown until first queried,
/// cleared again by any mutation of the endpoints.
#[derive(Debug, Clone)]
pub struct FieldInterval {
    lower: FieldBound,
    upper: FieldBound,
    equality: OnceLock<bool>,
}

impl FieldInterval {
    pub fn new(lower: FieldBound, upper: FieldBound) -> Self {
        Self { lower, upper, equality: OnceLock::new() }
    }

    /// The single-point interval `[value, value]`.
    pub fn point(value: Bson) -> Self {
        Self::new(FieldBound::new(value.clone(), true), FieldBound::new(value, true))
    }

    pub fn lower(&self) -> &FieldBound {
        &self.lower
    }

    pub fn upper(&self) -> &FieldBound {
        &self.upper
    }

    /// True iff at least one value can be contained: lower < upper, or
    /// lower == upper with both ends inclusive.
    pub fn strict_valid(&self) -> bool {
        match canonical_cmp(&self.lower.value, &self.upper.value) {
            Ordering::Less => true,
            Ordering::Equal => self.lower.inclusive && self.upper.inclusive,
            Ordering::Greater => false,
        }
    }

    /// True iff the interval constrains the field to a single value.
    pub fn is_equality(&self) -> bool {
        *self.equality.get_or_init(|| {
            self.lower.inclusive
                && self.upper.inclusive
                && canonical_cmp(&self.lower.value, &self.upper.value) == Ordering::Equal
        })
    }

    /// Make both ends exclusive.
    pub(crate) fn set_exclusive(&mut self) {
        self.lower.inclusive = false;
        self.upper.inclusive = false;
        self.equality = OnceLock::new();
    }

    /// Replace the upper bound, extending the interval during coalescing.
    pub(crate) fn set_upper(&mut self, upper: FieldBound) {
        self.upper = upper;
        self.equality = OnceLock::new();
    }
}

impl PartialEq for FieldInterval {
    fn eq(&self, other: &Self) -> bool {
        self.lower == other.lower && self.upper == other.upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(v: i32, inclusive: bool) -> FieldBound {
        FieldBound::new(Bson::Int32(v), inclusive)
    }

    #[test]
    fn point_is_equality_and_strict_valid() {
        let i = FieldInterval::point(Bson::Int32(5));
        assert!(i.strict_valid());
        assert!(i.is_equality());
    }

    #[test]
    fn equal_endpoints_need_both_inclusive() {
        let half = FieldInterval::new(bound(5, true), bound(5, false));
        assert!(!half.strict_valid());
        assert!(!half.is_equality());
    }

    #[test]
    fn inverted_interval_is_not_strict_valid() {
        let i = FieldInterval::new(bound(9, true), bound(2, true));
        assert!(!i.strict_valid());
    }

    #[test]
    fn equality_cache_cleared_on_mutation() {
        let mut i = FieldInterval::point(Bson::Int32(5));
        assert!(i.is_equality());
        i.set_exclusive();
        assert!(!i.is_equality());
        assert!(!i.strict_valid());
    }

    #[test]
    fn bound_tie_breaks() {
        assert_eq!(cmp_as_lower(&bound(5, true), &bound(5, false)), Ordering::Less);
        assert_eq!(cmp_as_upper(&bound(5, false), &bound(5, true)), Ordering::Less);
        assert_eq!(cmp_as_lower(&bound(4, false), &bound(5, true)), Ordering::Less);
    }

    #[test]
    fn flip_inclusive_round_trips() {
        let mut b = bound(1, true);
        b.flip_inclusive();
        assert!(!b.inclusive());
        b.flip_inclusive();
        assert!(b.inclusive());
    }
}
