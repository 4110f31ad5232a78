use std::cmp::Ordering;

use bson::{Bson, Document};
use tracing::warn;

use crate::compare::canonical_cmp;
use crate::error::BoundsError;
use crate::index_spec::IndexSpec;
use crate::range::FieldRange;
use crate::set::{FieldRangeSet, IndexKey};

static MIN_ELEMENT: Bson = Bson::MinKey;
static MAX_ELEMENT: Bson = Bson::MaxKey;
static NULL_ELEMENT: Bson = Bson::Null;

/// A query's ranges projected onto one index: per key field, the field's
/// range — reversed when the key direction times the scan direction is
/// negative, so interval order always follows traversal order.
#[derive(Debug, Clone)]
pub struct FieldRangeVector {
    ranges: Vec<FieldRange>,
    /// Key field names paired with the effective traversal direction.
    fields: Vec<(String, bool)>,
    direction: i32,
}

impl FieldRangeVector {
    /// Bind `frs` to an index. Fails when the Cartesian product of
    /// per-field interval counts reaches one million — `$in` lists on
    /// several key fields multiply into that many scan ranges.
    pub fn new(
        frs: &FieldRangeSet,
        spec: &IndexSpec,
        direction: i32,
    ) -> Result<Self, BoundsError> {
        let direction = if direction >= 0 { 1 } else { -1 };
        let mut ranges = Vec::new();
        let mut fields = Vec::new();
        let mut size: u64 = 1;
        for (name, key_dir) in spec.fields() {
            let forward = key_dir * direction > 0;
            let range = frs.range(name);
            let projected = if forward { range.clone() } else { range.reversed() };
            size = size.saturating_mul(projected.intervals().len() as u64);
            if size >= 1_000_000 {
                warn!(index = spec.name(), "$in partitioning exceeds the scan-range limit");
                return Err(BoundsError::CombinatorialLimit);
            }
            ranges.push(projected);
            fields.push((name.to_string(), forward));
        }
        Ok(Self { ranges, fields, direction })
    }

    /// The number of scan ranges represented: the product of interval
    /// counts across key fields. Zero iff some field is unsatisfiable.
    pub fn size(&self) -> u64 {
        self.ranges
            .iter()
            .fold(1u64, |acc, r| acc.saturating_mul(r.intervals().len() as u64))
    }

    pub fn direction(&self) -> i32 {
        self.direction
    }

    pub fn ranges(&self) -> &[FieldRange] {
        &self.ranges
    }

    /// Key field names with their effective traversal direction.
    pub fn fields(&self) -> &[(String, bool)] {
        &self.fields
    }

    /// First composite key of the traversal: each field's first interval
    /// start.
    pub fn start_key(&self) -> IndexKey {
        assert!(self.size() > 0, "start_key() on an unsatisfiable range vector");
        self.ranges
            .iter()
            .map(|r| r.intervals()[0].lower().value().clone())
            .collect()
    }

    /// Last composite key of the traversal: each field's last interval end.
    pub fn end_key(&self) -> IndexKey {
        assert!(self.size() > 0, "end_key() on an unsatisfiable range vector");
        self.ranges
            .iter()
            .map(|r| r.intervals()[r.intervals().len() - 1].upper().value().clone())
            .collect()
    }

    /// Human-readable dump: `{field: [[lo, hi], …], …}`.
    pub fn obj(&self) -> Document {
        let mut out = Document::new();
        for (i, (name, _)) in self.fields.iter().enumerate() {
            let intervals: Vec<Bson> = self.ranges[i]
                .intervals()
                .iter()
                .map(|fi| {
                    Bson::Array(vec![fi.lower().value().clone(), fi.upper().value().clone()])
                })
                .collect();
            out.insert(name.clone(), Bson::Array(intervals));
        }
        out
    }

    /// True iff the document's index keys land inside every field's range —
    /// exactly the documents an index scan over these bounds would visit.
    /// Used to dedupe `$or` clauses: a document reachable through an
    /// earlier clause's scan is skipped in later ones.
    pub fn matches(&self, doc: &Document) -> bool {
        for (i, (name, forward)) in self.fields.iter().enumerate() {
            if self.ranges[i].intervals().is_empty() {
                return false;
            }
            let mut values = Vec::new();
            let parts: Vec<&str> = name.split('.').collect();
            collect_values(doc, &parts, &mut values);
            if !values.iter().any(|v| self.matches_element(v, i, *forward)) {
                return false;
            }
        }
        true
    }

    fn matches_element(&self, e: &Bson, field: usize, forward: bool) -> bool {
        let (l, _) = self.matching_low_element(e, field, forward);
        l >= 0 && l % 2 == 0
    }

    /// Binary-search the field's 2n interval bounds (in traversal order)
    /// for the last bound at or before `e`. An even result means `e` lies
    /// inside interval `l/2`; odd means the gap after interval `(l-1)/2`;
    /// −1 means before everything.
    ///
    /// Tie rules at `e == bound`: an inclusive lower or exclusive upper
    /// bound counts as passed; equality with an *exclusive lower* bound
    /// additionally sets the second return so the cursor can emit a
    /// skip-past hint for the forbidden boundary.
    pub(crate) fn matching_low_element(
        &self,
        e: &Bson,
        field: usize,
        forward: bool,
    ) -> (isize, bool) {
        let intervals = self.ranges[field].intervals();
        let mut l: isize = -1;
        let mut h: isize = intervals.len() as isize * 2;
        while l + 1 < h {
            let m = (l + h) / 2;
            let interval = &intervals[(m / 2) as usize];
            let (bound, is_lower) = if m % 2 == 0 {
                (interval.lower(), true)
            } else {
                (interval.upper(), false)
            };
            let mut cmp = canonical_cmp(bound.value(), e);
            if !forward {
                cmp = cmp.reverse();
            }
            match cmp {
                Ordering::Less => l = m,
                Ordering::Greater => h = m,
                Ordering::Equal => {
                    let passed = if is_lower { bound.inclusive() } else { !bound.inclusive() };
                    let low_equality = is_lower && !bound.inclusive();
                    return (if passed { m } else { m - 1 }, low_equality);
                }
            }
        }
        (l, false)
    }

    /// Per-field value that sorts past every key in traversal order, used
    /// to build skip-past-prefix seek targets.
    fn superlative(&self, field: usize) -> &'static Bson {
        if self.fields[field].1 { &MAX_ELEMENT } else { &MIN_ELEMENT }
    }

    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(self)
    }
}

/// Index keys are built from each array element of a multikey field; a
/// missing field indexes as null.
fn collect_values<'a>(value: &'a Document, parts: &[&str], out: &mut Vec<&'a Bson>) {
    fn descend<'a>(value: &'a Bson, parts: &[&str], out: &mut Vec<&'a Bson>) {
        let Some((head, rest)) = parts.split_first() else {
            match value {
                Bson::Array(items) if !items.is_empty() => out.extend(items.iter()),
                Bson::Array(_) => out.push(&NULL_ELEMENT),
                other => out.push(other),
            }
            return;
        };
        match value {
            Bson::Document(doc) => match doc.get(*head) {
                Some(inner) => descend(inner, rest, out),
                None => out.push(&NULL_ELEMENT),
            },
            Bson::Array(items) => {
                let before = out.len();
                for item in items {
                    if matches!(item, Bson::Document(_)) {
                        descend(item, parts, out);
                    }
                }
                if out.len() == before {
                    out.push(&NULL_ELEMENT);
                }
            }
            _ => out.push(&NULL_ELEMENT),
        }
    }
    match parts.split_first() {
        Some((head, rest)) => match value.get(*head) {
            Some(inner) => descend(inner, rest, out),
            None => out.push(&NULL_ELEMENT),
        },
        None => out.push(&NULL_ELEMENT),
    }
}

/// Suggested cursor movement, computed from the key the scanner sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// No further keys are in range; stop scanning.
    Done,
    /// Step to the immediately next key; no skip hint is available. The
    /// current key may still fail the residual filter.
    Next,
    /// Seek: build a target from the first `r` elements of the current key
    /// followed by `cmp()[r..]` (inclusivity per `inc()[r..]`), and jump to
    /// it — or just past it when `after()` is set.
    Seek(usize),
}

/// Drives skip/seek navigation through a sorted index.
///
/// Borrows its [`FieldRangeVector`] for its whole life; state is the
/// per-field interval position plus the scratch seek target exposed through
/// [`cmp`](Cursor::cmp), [`inc`](Cursor::inc) and [`after`](Cursor::after).
#[derive(Debug)]
pub struct Cursor<'a> {
    v: &'a FieldRangeVector,
    i: Vec<i64>,
    cmp: Vec<Option<&'a Bson>>,
    inc: Vec<bool>,
    after: bool,
}

impl<'a> Cursor<'a> {
    fn new(v: &'a FieldRangeVector) -> Self {
        let n = v.ranges.len();
        Self { v, i: vec![-1; n], cmp: vec![None; n], inc: vec![false; n], after: false }
    }

    /// Reset to the first interval of every field, priming the scratch
    /// target with each field's first interval start — the state from which
    /// the first seek lands on `start_key()`.
    pub fn prep_dive(&mut self) {
        self.after = false;
        for j in 0..self.i.len() {
            self.i[j] = 0;
            match self.v.ranges[j].intervals().first() {
                Some(fi) => {
                    self.cmp[j] = Some(fi.lower().value());
                    self.inc[j] = fi.lower().inclusive();
                }
                None => {
                    self.cmp[j] = None;
                    self.inc[j] = false;
                }
            }
        }
    }

    /// Scratch seek values, one per key field.
    pub fn cmp(&self) -> &[Option<&'a Bson>] {
        &self.cmp
    }

    /// Scratch seek inclusivities, one per key field.
    pub fn inc(&self) -> &[bool] {
        &self.inc
    }

    /// True iff the pending seek target must be skipped past, not to.
    pub fn after(&self) -> bool {
        self.after
    }

    pub fn ok(&self) -> bool {
        match self.v.ranges.first() {
            Some(first) => self.i[0] < first.intervals().len() as i64,
            None => false,
        }
    }

    /// Reset interval positions from `from` on to the first interval.
    pub fn set_zero(&mut self, from: usize) {
        for j in from..self.i.len() {
            self.i[j] = 0;
        }
    }

    /// Reset interval positions from `from` on to before-the-first.
    pub fn set_minus(&mut self, from: usize) {
        for j in from..self.i.len() {
            self.i[j] = -1;
        }
    }

    /// Decide how to move given the composite key the scanner sits on.
    ///
    /// Walks key fields left to right, locating `curr[k]` within field k's
    /// intervals. In-range fields pass through; the first out-of-range
    /// field produces either a seek hint to the next valid region, a carry
    /// that advances the latest prefix field still short of its endpoint,
    /// or [`Advance::Done`] when nothing can advance. A key equal to an
    /// exclusive bound yields an `after` hint so the scanner steps past the
    /// forbidden boundary.
    pub fn advance(&mut self, curr: &[Bson]) -> Advance {
        let n = self.i.len();
        if self.v.size() == 0 {
            return Advance::Done;
        }
        // latest field whose current position is not its final endpoint;
        // a carry can advance the scan from the prefix ending there
        let mut latest_non_endpoint: Option<usize> = None;
        for k in 0..n {
            if k > 0 {
                let prev = &self.v.ranges[k - 1].intervals()[self.i[k - 1] as usize];
                if !prev.is_equality() {
                    // an inexact prefix bound caps the useful skip depth;
                    // let the scanner single-step and recheck
                    return Advance::Next;
                }
            }
            let forward = self.v.fields[k].1;
            let intervals = self.v.ranges[k].intervals();
            let (l, low_equality) = self.v.matching_low_element(&curr[k], k, forward);
            if l >= 0 && l % 2 == 0 {
                // inside an interval; remember whether this field could
                // still advance beyond the current key's value
                let within = (l / 2) as usize;
                self.i[k] = within as i64;
                let at_last = within + 1 == intervals.len();
                if !at_last
                    || canonical_cmp(intervals[within].upper().value(), &curr[k])
                        != Ordering::Equal
                {
                    latest_non_endpoint = Some(k);
                }
                continue;
            }
            if l == intervals.len() as isize * 2 - 1 {
                // past the last interval; carry into an earlier field
                let Some(carry) = latest_non_endpoint else {
                    return Advance::Done;
                };
                self.set_zero(carry + 1);
                for j in carry + 1..n {
                    self.cmp[j] = Some(self.v.superlative(j));
                    self.inc[j] = true;
                }
                self.after = true;
                return Advance::Seek(carry + 1);
            }
            let next = ((l + 1) / 2) as usize;
            self.i[k] = next as i64;
            self.set_zero(k + 1);
            if low_equality {
                // sitting exactly on an exclusive interval start: skip past
                // every key carrying this prefix value
                self.cmp[k] = Some(intervals[next].lower().value());
                self.inc[k] = false;
                for j in k + 1..n {
                    self.cmp[j] = Some(self.v.superlative(j));
                    self.inc[j] = true;
                }
                self.after = true;
                return Advance::Seek(k);
            }
            // in a gap: seek to the next interval's start, tail fields at
            // their first interval starts
            self.cmp[k] = Some(intervals[next].lower().value());
            self.inc[k] = intervals[next].lower().inclusive();
            for j in k + 1..n {
                let first = &self.v.ranges[j].intervals()[0];
                self.cmp[j] = Some(first.lower().value());
                self.inc[j] = first.lower().inclusive();
            }
            self.after = false;
            return Advance::Seek(k);
        }
        // every field in range: the current key is within bounds
        Advance::Next
    }
}
