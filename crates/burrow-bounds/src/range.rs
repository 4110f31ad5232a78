use std::cmp::Ordering;
use std::ops::{BitAndAssign, BitOrAssign, SubAssign};
use std::sync::LazyLock;

use bson::Bson;

use crate::compare::canonical_cmp;
use crate::interval::{FieldBound, FieldInterval, cmp_as_lower, cmp_as_upper};
use crate::regex_prefix::{simple_regex, simple_regex_end};

/// Comparison and structural operators recognized in predicate documents.
///
/// Unknown operator names parse to `None` and degrade to the trivial range;
/// the residual document filter still applies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Nin,
    Mod,
    Type,
    Exists,
    Size,
    All,
    ElemMatch,
    Regex,
    Options,
    Not,
    Near,
    Within,
}

impl QueryOp {
    pub fn parse(name: &str) -> Option<QueryOp> {
        Some(match name {
            "$eq" => QueryOp::Eq,
            "$ne" => QueryOp::Ne,
            "$lt" => QueryOp::Lt,
            "$lte" => QueryOp::Lte,
            "$gt" => QueryOp::Gt,
            "$gte" => QueryOp::Gte,
            "$in" => QueryOp::In,
            "$nin" => QueryOp::Nin,
            "$mod" => QueryOp::Mod,
            "$type" => QueryOp::Type,
            "$exists" => QueryOp::Exists,
            "$size" => QueryOp::Size,
            "$all" => QueryOp::All,
            "$elemMatch" => QueryOp::ElemMatch,
            "$regex" => QueryOp::Regex,
            "$options" => QueryOp::Options,
            "$not" => QueryOp::Not,
            "$near" => QueryOp::Near,
            "$within" => QueryOp::Within,
            _ => return None,
        })
    }
}

/// An ordered list of disjoint [`FieldInterval`]s constraining one field.
///
/// Invariants: intervals are sorted by lower bound, pairwise disjoint, not
/// mergeable with a neighbor, and strictly valid. An empty list means the
/// field is unsatisfiable; the single interval `[MinKey, MaxKey]` means it
/// is unconstrained. A `special` tag marks ranges that only a type-specific
/// scanner (e.g. geo) can interpret; those are opaque to the set algebra.
#[derive(Debug, Clone)]
pub struct FieldRange {
    intervals: Vec<FieldInterval>,
    special: Option<String>,
}

static TRIVIAL: LazyLock<FieldRange> = LazyLock::new(FieldRange::universal);

/// Shared trivial range, returned for fields a query does not constrain.
pub(crate) fn trivial_range() -> &'static FieldRange {
    &TRIVIAL
}

impl FieldRange {
    /// `[MinKey, MaxKey]` — matches every value.
    pub fn universal() -> Self {
        Self {
            intervals: vec![FieldInterval::new(
                FieldBound::new(Bson::MinKey, true),
                FieldBound::new(Bson::MaxKey, true),
            )],
            special: None,
        }
    }

    /// A range matching nothing.
    pub fn unsatisfiable() -> Self {
        Self { intervals: Vec::new(), special: None }
    }

    /// The single-point range `[value, value]`.
    pub fn point(value: Bson) -> Self {
        Self { intervals: vec![FieldInterval::point(value)], special: None }
    }

    /// A single-interval range; strictly invalid bounds yield the
    /// unsatisfiable range.
    pub fn bounded(lower: FieldBound, upper: FieldBound) -> Self {
        let interval = FieldInterval::new(lower, upper);
        if interval.strict_valid() {
            Self { intervals: vec![interval], special: None }
        } else {
            Self::unsatisfiable()
        }
    }

    /// `[MinKey, value]` or `[MinKey, value)`.
    pub fn below(value: Bson, inclusive: bool) -> Self {
        Self::bounded(FieldBound::new(Bson::MinKey, true), FieldBound::new(value, inclusive))
    }

    /// `[value, MaxKey]` or `(value, MaxKey]`.
    pub fn above(value: Bson, inclusive: bool) -> Self {
        Self::bounded(FieldBound::new(value, inclusive), FieldBound::new(Bson::MaxKey, true))
    }

    /// Range for a bare predicate value: equality, or the regex reduction
    /// when the value is a regular expression.
    pub fn from_value(value: &Bson, negated: bool) -> Self {
        match value {
            Bson::RegularExpression(re) => Self::from_regex(&re.pattern, &re.options, negated),
            other => {
                let point = Self::point(other.clone());
                if negated { point.complement() } else { point }
            }
        }
    }

    /// Range for one operator clause `(op, operand)`, optionally negated.
    ///
    /// Operators that cannot constrain an ordered scan (`$mod`, `$type`,
    /// `$exists`, `$size`, `$elemMatch`) produce the trivial range whether
    /// negated or not; the residual filter enforces them.
    pub fn from_op(op: QueryOp, operand: &Bson, negated: bool) -> Self {
        let bounded = match op {
            QueryOp::Eq => return Self::from_value(operand, negated),
            QueryOp::Ne => return Self::from_value(operand, !negated),
            QueryOp::Lt => Self::below(operand.clone(), false),
            QueryOp::Lte => Self::below(operand.clone(), true),
            QueryOp::Gt => Self::above(operand.clone(), false),
            QueryOp::Gte => Self::above(operand.clone(), true),
            QueryOp::In => match operand {
                Bson::Array(items) => return Self::from_in_list(items, negated),
                _ => return Self::universal(),
            },
            QueryOp::Nin => match operand {
                Bson::Array(items) => return Self::from_in_list(items, !negated),
                _ => return Self::universal(),
            },
            QueryOp::All => {
                // the index stores each array element, so the first listed
                // value bounds the scan; the filter checks the rest
                match operand {
                    Bson::Array(items) if !negated => match items.first() {
                        Some(first)
                            if !matches!(
                                first,
                                Bson::RegularExpression(_) | Bson::Document(_)
                            ) =>
                        {
                            return Self::point(first.clone());
                        }
                        _ => return Self::universal(),
                    },
                    _ => return Self::universal(),
                }
            }
            _ => return Self::universal(),
        };
        if negated { bounded.complement() } else { bounded }
    }

    /// Union of point ranges for an `$in` list; regex items contribute
    /// their prefix range. Negation over a regex-widened union would drop
    /// matching values, so it bails to trivial instead.
    fn from_in_list(items: &[Bson], negated: bool) -> Self {
        if negated && items.iter().any(|v| matches!(v, Bson::RegularExpression(_))) {
            return Self::universal();
        }
        let mut union = Self::unsatisfiable();
        for item in items {
            let piece = match item {
                Bson::RegularExpression(re) => Self::from_regex(&re.pattern, &re.options, false),
                other => Self::point(other.clone()),
            };
            union |= &piece;
        }
        if negated { union.complement() } else { union }
    }

    /// Range for a regex clause: `[prefix, simple_regex_end(prefix))` when
    /// the pattern reduces to an anchored literal, trivial otherwise. The
    /// regex itself stays in the residual filter either way.
    pub fn from_regex(pattern: &str, options: &str, negated: bool) -> Self {
        if negated {
            // the complement of a superset range would exclude matches
            return Self::universal();
        }
        let (prefix, _pure) = simple_regex(pattern, options);
        if prefix.is_empty() {
            return Self::universal();
        }
        let upper = match simple_regex_end(&prefix) {
            Some(end) => FieldBound::new(Bson::String(end), false),
            None => FieldBound::new(Bson::MaxKey, true),
        };
        Self::bounded(FieldBound::new(Bson::String(prefix), true), upper)
    }

    pub fn intervals(&self) -> &[FieldInterval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Drop all intervals so the range matches nothing.
    pub fn make_empty(&mut self) {
        self.intervals.clear();
    }

    pub fn special(&self) -> Option<&str> {
        self.special.as_deref()
    }

    pub(crate) fn set_special(&mut self, name: &str) {
        self.special = Some(name.to_string());
    }

    pub fn min(&self) -> &Bson {
        assert!(!self.is_empty(), "min() on an empty range");
        self.intervals[0].lower().value()
    }

    pub fn max(&self) -> &Bson {
        assert!(!self.is_empty(), "max() on an empty range");
        self.intervals[self.intervals.len() - 1].upper().value()
    }

    pub fn min_inclusive(&self) -> bool {
        assert!(!self.is_empty(), "min_inclusive() on an empty range");
        self.intervals[0].lower().inclusive()
    }

    pub fn max_inclusive(&self) -> bool {
        assert!(!self.is_empty(), "max_inclusive() on an empty range");
        self.intervals[self.intervals.len() - 1].upper().inclusive()
    }

    /// True iff the range pins the field to a single value.
    pub fn equality(&self) -> bool {
        self.intervals.len() == 1 && self.intervals[0].is_equality()
    }

    /// True iff every interval is an equality — the shape of an `$in`.
    pub fn in_query(&self) -> bool {
        !self.is_empty() && self.intervals.iter().all(FieldInterval::is_equality)
    }

    /// True iff the range excludes at least one value.
    pub fn nontrivial(&self) -> bool {
        !self.is_empty()
            && !(self.intervals.len() == 1
                && matches!(self.min(), Bson::MinKey)
                && matches!(self.max(), Bson::MaxKey))
    }

    /// Make every interval endpoint exclusive.
    pub fn set_exclusive_bounds(&mut self) {
        for interval in &mut self.intervals {
            interval.set_exclusive();
        }
    }

    /// Intervals in reverse order with lower/upper swapped verbatim, for
    /// traversal against the index direction. The result may contain
    /// strictly invalid intervals; only the range-vector cursor and
    /// matcher interpret it.
    pub fn reversed(&self) -> Self {
        assert!(self.special.is_none(), "cannot reverse a special range");
        Self {
            intervals: self
                .intervals
                .iter()
                .rev()
                .map(|i| FieldInterval::new(i.upper().clone(), i.lower().clone()))
                .collect(),
            special: None,
        }
    }

    /// Everything the range excludes.
    pub fn complement(&self) -> Self {
        let mut ret = Self::universal();
        ret -= self;
        ret
    }

    /// True iff every interval of `self` lies within an interval of `other`.
    pub fn is_subset_of(&self, other: &FieldRange) -> bool {
        let mut j = 0;
        'outer: for a in &self.intervals {
            while j < other.intervals.len() {
                let b = &other.intervals[j];
                if contains(b, a) {
                    continue 'outer;
                }
                if ends_before(b, a) {
                    j += 1;
                } else {
                    return false;
                }
            }
            return false;
        }
        true
    }

    fn intersect(&mut self, other: &FieldRange) {
        let a = &self.intervals;
        let b = &other.intervals;
        let mut result = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            let lower = if cmp_as_lower(a[i].lower(), b[j].lower()) == Ordering::Less {
                b[j].lower()
            } else {
                a[i].lower()
            };
            let upper = if cmp_as_upper(a[i].upper(), b[j].upper()) == Ordering::Greater {
                b[j].upper()
            } else {
                a[i].upper()
            };
            let candidate = FieldInterval::new(lower.clone(), upper.clone());
            if candidate.strict_valid() {
                result.push(candidate);
            }
            match cmp_as_upper(a[i].upper(), b[j].upper()) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
        }
        self.intervals = result;
        if self.special.is_none() {
            self.special = other.special.clone();
        }
    }

    fn union_with(&mut self, other: &FieldRange) {
        let mut merged: Vec<FieldInterval> = Vec::with_capacity(
            self.intervals.len() + other.intervals.len(),
        );
        let a = &self.intervals;
        let b = &other.intervals;
        let (mut i, mut j) = (0, 0);
        while i < a.len() || j < b.len() {
            let take_a = match (a.get(i), b.get(j)) {
                (Some(x), Some(y)) => cmp_as_lower(x.lower(), y.lower()) != Ordering::Greater,
                (Some(_), None) => true,
                _ => false,
            };
            let next = if take_a {
                i += 1;
                a[i - 1].clone()
            } else {
                j += 1;
                b[j - 1].clone()
            };
            match merged.last_mut() {
                Some(last) if joinable(last, &next) => {
                    if cmp_as_upper(last.upper(), next.upper()) == Ordering::Less {
                        last.set_upper(next.upper().clone());
                    }
                }
                _ => merged.push(next),
            }
        }
        self.intervals = merged;
        if self.special.is_none() {
            self.special = other.special.clone();
        }
    }

    fn subtract(&mut self, other: &FieldRange) {
        for b in &other.intervals {
            let mut next = Vec::with_capacity(self.intervals.len() + 1);
            for a in self.intervals.drain(..) {
                subtract_one(a, b, &mut next);
            }
            self.intervals = next;
        }
    }
}

/// True iff `outer` fully contains `inner`.
fn contains(outer: &FieldInterval, inner: &FieldInterval) -> bool {
    cmp_as_lower(outer.lower(), inner.lower()) != Ordering::Greater
        && cmp_as_upper(inner.upper(), outer.upper()) != Ordering::Greater
}

/// True iff `b` ends strictly before `a` begins (no shared value).
fn ends_before(b: &FieldInterval, a: &FieldInterval) -> bool {
    match canonical_cmp(b.upper().value(), a.lower().value()) {
        Ordering::Less => true,
        Ordering::Equal => !(b.upper().inclusive() && a.lower().inclusive()),
        Ordering::Greater => false,
    }
}

/// True iff two intervals overlap or touch closely enough to merge: the
/// next interval starts before the previous ends, or at the same value
/// with at least one inclusive side.
fn joinable(prev: &FieldInterval, next: &FieldInterval) -> bool {
    match canonical_cmp(next.lower().value(), prev.upper().value()) {
        Ordering::Less => true,
        Ordering::Equal => prev.upper().inclusive() || next.lower().inclusive(),
        Ordering::Greater => false,
    }
}

/// Remove `b` from `a`, pushing the surviving pieces. A cut in the middle
/// splits `a` in two; the freed bound flips its inclusivity.
fn subtract_one(a: FieldInterval, b: &FieldInterval, out: &mut Vec<FieldInterval>) {
    let overlap_lower = if cmp_as_lower(a.lower(), b.lower()) == Ordering::Less {
        b.lower()
    } else {
        a.lower()
    };
    let overlap_upper = if cmp_as_upper(a.upper(), b.upper()) == Ordering::Greater {
        b.upper()
    } else {
        a.upper()
    };
    if !FieldInterval::new(overlap_lower.clone(), overlap_upper.clone()).strict_valid() {
        out.push(a);
        return;
    }
    let mut left_upper = overlap_lower.clone();
    left_upper.flip_inclusive();
    let left = FieldInterval::new(a.lower().clone(), left_upper);
    if left.strict_valid() {
        out.push(left);
    }
    let mut right_lower = overlap_upper.clone();
    right_lower.flip_inclusive();
    let right = FieldInterval::new(right_lower, a.upper().clone());
    if right.strict_valid() {
        out.push(right);
    }
}

impl BitAndAssign<&FieldRange> for FieldRange {
    fn bitand_assign(&mut self, other: &FieldRange) {
        self.intersect(other);
    }
}

impl BitOrAssign<&FieldRange> for FieldRange {
    fn bitor_assign(&mut self, other: &FieldRange) {
        self.union_with(other);
    }
}

impl SubAssign<&FieldRange> for FieldRange {
    fn sub_assign(&mut self, other: &FieldRange) {
        self.subtract(other);
    }
}

impl PartialEq for FieldRange {
    fn eq(&self, other: &Self) -> bool {
        self.intervals == other.intervals && self.special == other.special
    }
}
