use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::ops::{BitAndAssign, SubAssign};

use bson::{Bson, Document};
use tracing::debug;

use crate::error::BoundsError;
use crate::pattern::{PatternType, QueryPattern};
use crate::range::{FieldRange, QueryOp, trivial_range};

/// A composite index key: per-field values in key-pattern order, names
/// excluded.
pub type IndexKey = Vec<Bson>;

/// Inclusive `(start, end)` key pairs in traversal order, the legacy output
/// consumed by shard-key range calculation.
pub type BoundList = Vec<(IndexKey, IndexKey)>;

/// Per-field value ranges derived from a query predicate.
///
/// A field absent from the map is unconstrained (trivial range). If any
/// contained range is empty the whole predicate is unsatisfiable —
/// [`FieldRangeSet::match_possible`] reports this and callers must check it
/// before extracting extreme values.
#[derive(Debug, Clone)]
pub struct FieldRangeSet {
    ns: String,
    ranges: BTreeMap<String, FieldRange>,
    /// Clauses that cannot constrain a scan (`$where`, `$text`), re-emitted
    /// verbatim by `simplified_query`.
    residuals: Vec<(String, Bson)>,
}

impl FieldRangeSet {
    /// Derive ranges from a predicate document against namespace `ns`.
    ///
    /// Never fails: operands with an unusable shape degrade the affected
    /// field to the trivial range and the residual document filter picks
    /// them up.
    pub fn new(ns: &str, query: &Document) -> Self {
        let mut set = Self {
            ns: ns.to_string(),
            ranges: BTreeMap::new(),
            residuals: Vec::new(),
        };
        for (key, value) in query {
            set.process_top_level(key, value);
        }
        set
    }

    fn process_top_level(&mut self, key: &str, value: &Bson) {
        match key {
            "$and" => match value {
                Bson::Array(clauses) => {
                    for clause in clauses {
                        if let Bson::Document(doc) = clause {
                            for (k, v) in doc {
                                self.process_top_level(k, v);
                            }
                        }
                    }
                }
                _ => debug!(ns = %self.ns, "$and operand is not an array; ignored for bounds"),
            },
            // $or is expanded clause by clause by FieldRangeOrSet
            "$or" => {}
            "$where" | "$text" => self.residuals.push((key.to_string(), value.clone())),
            _ if key.starts_with('$') => {
                debug!(ns = %self.ns, op = key, "unrecognized top-level operator ignored for bounds");
            }
            field => self.process_query_field(field, value),
        }
    }

    /// Fold one `field: value` entry into the field's range.
    fn process_query_field(&mut self, field: &str, value: &Bson) {
        if let Bson::Document(ops) = value
            && ops.iter().next().is_some_and(|(k, _)| k.starts_with('$'))
        {
            let options = ops.get_str("$options").ok();
            for (op_name, operand) in ops {
                self.process_op_element(field, op_name, operand, options, false);
            }
            return;
        }
        self.intersect_field(field, FieldRange::from_value(value, false));
    }

    /// Fold one operator clause into the field's range. `negated` is true
    /// inside `$not`.
    fn process_op_element(
        &mut self,
        field: &str,
        op_name: &str,
        operand: &Bson,
        options: Option<&str>,
        negated: bool,
    ) {
        let Some(op) = QueryOp::parse(op_name) else {
            debug!(field, op = op_name, "unknown operator degrades to trivial range");
            self.intersect_field(field, FieldRange::universal());
            return;
        };
        match op {
            QueryOp::Options => {}
            QueryOp::Not => match operand {
                Bson::Document(inner) => {
                    let inner_options = inner.get_str("$options").ok();
                    for (k, v) in inner {
                        self.process_op_element(field, k, v, inner_options, !negated);
                    }
                }
                // a negated regex cannot be turned into a range
                _ => self.intersect_field(field, FieldRange::universal()),
            },
            QueryOp::Regex => {
                let range = match operand {
                    Bson::String(pattern) => {
                        FieldRange::from_regex(pattern, options.unwrap_or(""), negated)
                    }
                    Bson::RegularExpression(re) => {
                        FieldRange::from_regex(&re.pattern, &re.options, negated)
                    }
                    _ => {
                        debug!(field, "$regex operand is not a pattern; using trivial range");
                        FieldRange::universal()
                    }
                };
                self.intersect_field(field, range);
            }
            QueryOp::Near | QueryOp::Within => {
                let mut range = FieldRange::universal();
                range.set_special("2d");
                self.intersect_field(field, range);
            }
            _ => self.intersect_field(field, FieldRange::from_op(op, operand, negated)),
        }
    }

    fn intersect_field(&mut self, field: &str, range: FieldRange) {
        match self.ranges.entry(field.to_string()) {
            Entry::Occupied(entry) => *entry.into_mut() &= &range,
            Entry::Vacant(entry) => {
                entry.insert(range);
            }
        }
    }

    pub fn ns(&self) -> &str {
        &self.ns
    }

    /// True iff the query references the field at all.
    pub fn has_range(&self, field: &str) -> bool {
        self.ranges.contains_key(field)
    }

    /// The field's range, or the shared trivial range when unconstrained.
    pub fn range(&self, field: &str) -> &FieldRange {
        self.ranges.get(field).unwrap_or_else(|| trivial_range())
    }

    pub fn n_nontrivial_ranges(&self) -> usize {
        self.ranges.values().filter(|r| r.nontrivial()).count()
    }

    /// False iff some field's range is empty, i.e. the predicate matches
    /// zero documents.
    pub fn match_possible(&self) -> bool {
        self.ranges.values().all(|r| !r.is_empty())
    }

    /// Name of the special index handler required by the query, if any.
    pub fn get_special(&self) -> Option<&str> {
        self.ranges.values().find_map(|r| r.special())
    }

    pub(crate) fn make_empty(&mut self) {
        for range in self.ranges.values_mut() {
            range.make_empty();
        }
    }

    /// A predicate document equivalent to the derived bounds: each
    /// nontrivial field reduced to its extreme values (a bare value for
    /// equalities), recorded non-indexable clauses re-emitted verbatim.
    ///
    /// With `fields` given, only those fields appear and in that order.
    /// Callers must check [`match_possible`](Self::match_possible) first.
    pub fn simplified_query(&self, fields: Option<&[&str]>) -> Document {
        let mut out = Document::new();
        match fields {
            Some(names) => {
                for name in names {
                    self.append_simplified(&mut out, name);
                }
            }
            None => {
                let names: Vec<String> = self.ranges.keys().cloned().collect();
                for name in &names {
                    self.append_simplified(&mut out, name);
                }
                for (key, value) in &self.residuals {
                    out.insert(key.clone(), value.clone());
                }
            }
        }
        out
    }

    fn append_simplified(&self, out: &mut Document, name: &str) {
        let range = self.range(name);
        assert!(!range.is_empty(), "simplified_query() on an unsatisfiable set");
        if range.equality() {
            out.insert(name, range.min().clone());
        } else if range.nontrivial() {
            let mut clause = Document::new();
            if !matches!(range.min(), Bson::MinKey) {
                let op = if range.min_inclusive() { "$gte" } else { "$gt" };
                clause.insert(op, range.min().clone());
            }
            if !matches!(range.max(), Bson::MaxKey) {
                let op = if range.max_inclusive() { "$lte" } else { "$lt" };
                clause.insert(op, range.max().clone());
            }
            out.insert(name, clause);
        }
    }

    /// Classify each bounded field for plan caching. Callers must check
    /// [`match_possible`](Self::match_possible) first.
    pub fn pattern(&self, sort: &Document) -> QueryPattern {
        let mut field_types = BTreeMap::new();
        for (name, range) in &self.ranges {
            assert!(!range.is_empty(), "pattern() on an unsatisfiable set");
            if range.equality() {
                field_types.insert(name.clone(), PatternType::Equality);
            } else if range.nontrivial() {
                let lower = !matches!(range.min(), Bson::MinKey);
                let upper = !matches!(range.max(), Bson::MaxKey);
                let kind = match (lower, upper) {
                    (true, true) => PatternType::UpperAndLowerBound,
                    (true, false) => PatternType::LowerBound,
                    (false, true) => PatternType::UpperBound,
                    // e.g. $ne: spans from MinKey to MaxKey with a hole
                    (false, false) => continue,
                };
                field_types.insert(name.clone(), kind);
            }
        }
        QueryPattern::new(field_types, sort)
    }

    /// A new set restricted to the named fields; only their nontrivial
    /// ranges carry over, everything else reverts to trivial.
    pub fn subset(&self, fields: &Document) -> FieldRangeSet {
        let mut ret = FieldRangeSet {
            ns: self.ns.clone(),
            ranges: BTreeMap::new(),
            residuals: self.residuals.clone(),
        };
        for (name, _) in fields {
            let range = self.range(name);
            if range.nontrivial() {
                ret.ranges.insert(name.clone(), range.clone());
            }
        }
        ret
    }

    /// Ordered `(start, end)` bounds for a key pattern and traversal
    /// direction. Equality and `$in` prefixes multiply out into separate
    /// bound pairs; from the first genuine inequality on, each remaining
    /// field contributes only its overall extremes.
    pub fn index_bounds(
        &self,
        key_pattern: &Document,
        direction: i32,
    ) -> Result<BoundList, BoundsError> {
        let direction = if direction >= 0 { 1 } else { -1 };
        let mut builders: Vec<(IndexKey, IndexKey)> = vec![(Vec::new(), Vec::new())];
        let mut inequality_seen = false;
        for (name, dir_value) in key_pattern {
            let range = self.range(name);
            if range.is_empty() {
                return Ok(Vec::new());
            }
            let key_dir = if crate::compare::number_or_zero(dir_value) >= 0.0 { 1 } else { -1 };
            let forward = key_dir * direction > 0;
            if inequality_seen {
                for (start, end) in &mut builders {
                    if forward {
                        start.push(range.min().clone());
                        end.push(range.max().clone());
                    } else {
                        start.push(range.max().clone());
                        end.push(range.min().clone());
                    }
                }
                continue;
            }
            if range.equality() {
                for (start, end) in &mut builders {
                    start.push(range.min().clone());
                    end.push(range.min().clone());
                }
                continue;
            }
            if !range.in_query() {
                inequality_seen = true;
            }
            let mut expanded = Vec::new();
            let intervals = range.intervals();
            for (start, end) in &builders {
                let ordered: Vec<_> = if forward {
                    intervals.iter().collect()
                } else {
                    intervals.iter().rev().collect()
                };
                for interval in ordered {
                    if expanded.len() >= 1_000_000 {
                        return Err(BoundsError::CombinatorialLimit);
                    }
                    let (lo, hi) = if forward {
                        (interval.lower().value(), interval.upper().value())
                    } else {
                        (interval.upper().value(), interval.lower().value())
                    };
                    let mut new_start = start.clone();
                    let mut new_end = end.clone();
                    new_start.push(lo.clone());
                    new_end.push(hi.clone());
                    expanded.push((new_start, new_end));
                }
            }
            builders = expanded;
        }
        Ok(builders)
    }
}

impl BitAndAssign<&FieldRangeSet> for FieldRangeSet {
    /// Field-wise intersection; fields present in only one operand carry
    /// through unchanged.
    fn bitand_assign(&mut self, other: &FieldRangeSet) {
        for (name, range) in &other.ranges {
            match self.ranges.get_mut(name) {
                Some(mine) => *mine &= range,
                None => {
                    self.ranges.insert(name.clone(), range.clone());
                }
            }
        }
        self.residuals.extend(other.residuals.iter().cloned());
    }
}

impl SubAssign<&FieldRangeSet> for FieldRangeSet {
    /// Approximate multi-dimensional box subtraction.
    ///
    /// The scan region of a composite index is a box (per-field interval
    /// product). Subtracting another box yields a box only when it covers
    /// this one in every dimension but at most one, so:
    /// zero uncovered dimensions → this set becomes empty; exactly one →
    /// subtract along that dimension; anything else, or `other`
    /// constraining a field this set does not → unchanged. The result is
    /// always a superset of the true difference.
    fn sub_assign(&mut self, other: &FieldRangeSet) {
        let mut uncovered: Option<String> = None;
        let mut theirs = other.ranges.iter().peekable();
        for (name, range) in &self.ranges {
            while let Some((their_name, their_range)) = theirs.peek() {
                match their_name.as_str().cmp(name.as_str()) {
                    // other constrains a field we do not; not representable
                    std::cmp::Ordering::Less => return,
                    std::cmp::Ordering::Greater => break,
                    std::cmp::Ordering::Equal => {
                        if !range.is_subset_of(their_range) {
                            if uncovered.is_some() {
                                return;
                            }
                            uncovered = Some(name.clone());
                        }
                        theirs.next();
                        break;
                    }
                }
            }
        }
        if theirs.peek().is_some() {
            return;
        }
        match uncovered {
            None => self.make_empty(),
            Some(name) => {
                if let (Some(mine), Some(their)) =
                    (self.ranges.get_mut(&name), other.ranges.get(&name))
                {
                    *mine -= their;
                }
                self.residuals.extend(other.residuals.iter().cloned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn set(query: Document) -> FieldRangeSet {
        FieldRangeSet::new("test.things", &query)
    }

    #[test]
    fn equality_and_range_fields() {
        let s = set(doc! { "a": 5, "b": { "$gt": 10, "$lte": 20 } });
        assert!(s.range("a").equality());
        let b = s.range("b");
        assert_eq!(b.min(), &Bson::Int32(10));
        assert!(!b.min_inclusive());
        assert_eq!(b.max(), &Bson::Int32(20));
        assert!(b.max_inclusive());
        assert_eq!(s.n_nontrivial_ranges(), 2);
        assert!(s.match_possible());
    }

    #[test]
    fn unconstrained_field_is_trivial() {
        let s = set(doc! { "a": 1 });
        assert!(!s.has_range("zzz"));
        assert!(!s.range("zzz").nontrivial());
    }

    #[test]
    fn and_intersects_per_field() {
        let s = set(doc! { "$and": [ { "a": { "$gt": 1 } }, { "a": { "$lt": 9 } } ] });
        let a = s.range("a");
        assert_eq!(a.min(), &Bson::Int32(1));
        assert_eq!(a.max(), &Bson::Int32(9));
    }

    #[test]
    fn contradictory_bounds_are_unsatisfiable() {
        let s = set(doc! { "a": { "$gt": 10, "$lt": 5 } });
        assert!(s.range("a").is_empty());
        assert!(!s.match_possible());
    }

    #[test]
    fn or_contributes_nothing_here() {
        let s = set(doc! { "$or": [ { "a": 1 }, { "a": 2 } ] });
        assert!(!s.has_range("a"));
    }

    #[test]
    fn not_negates_inner_operators() {
        let s = set(doc! { "a": { "$not": { "$lt": 5 } } });
        let a = s.range("a");
        assert_eq!(a.min(), &Bson::Int32(5));
        assert!(a.min_inclusive());
        assert!(matches!(a.max(), Bson::MaxKey));
    }

    #[test]
    fn exists_and_mod_stay_trivial_but_record_the_field() {
        let s = set(doc! { "a": { "$exists": true }, "b": { "$mod": [2, 0] } });
        assert!(s.has_range("a"));
        assert!(!s.range("a").nontrivial());
        assert!(!s.range("b").nontrivial());
    }

    #[test]
    fn where_is_recorded_and_reemitted() {
        let s = set(doc! { "a": 3, "$where": "this.a > 2" });
        let simplified = s.simplified_query(None);
        assert_eq!(simplified, doc! { "a": 3, "$where": "this.a > 2" });
    }

    #[test]
    fn simplified_query_round_trips_bounds() {
        let s = set(doc! { "a": 5, "b": { "$gt": 10, "$lte": 20 } });
        assert_eq!(
            s.simplified_query(None),
            doc! { "a": 5, "b": { "$gt": 10, "$lte": 20 } }
        );
    }

    #[test]
    fn simplified_query_honors_field_order() {
        let s = set(doc! { "a": 1, "b": 2 });
        let simplified = s.simplified_query(Some(&["b", "a"]));
        let keys: Vec<_> = simplified.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn regex_clause_simplifies_to_prefix_bounds() {
        let s = set(doc! { "s": { "$regex": "^foo" } });
        assert_eq!(
            s.simplified_query(None),
            doc! { "s": { "$gte": "foo", "$lt": "fop" } }
        );
    }

    #[test]
    fn pattern_classifies_bound_kinds() {
        let s = set(doc! {
            "eq": 1,
            "lo": { "$gt": 1 },
            "hi": { "$lt": 1 },
            "both": { "$gt": 1, "$lt": 9 },
        });
        let p = s.pattern(&doc! {});
        assert_eq!(p.field_type("eq"), Some(PatternType::Equality));
        assert_eq!(p.field_type("lo"), Some(PatternType::LowerBound));
        assert_eq!(p.field_type("hi"), Some(PatternType::UpperBound));
        assert_eq!(p.field_type("both"), Some(PatternType::UpperAndLowerBound));
    }

    #[test]
    fn equivalent_shapes_share_a_pattern() {
        let a = set(doc! { "x": 1, "y": { "$gt": 0 } }).pattern(&doc! { "x": 1 });
        let b = set(doc! { "x": 99, "y": { "$gt": 123 } }).pattern(&doc! { "x": 1 });
        assert_eq!(a, b);
        let c = set(doc! { "x": 99, "y": { "$lt": 123 } }).pattern(&doc! { "x": 1 });
        assert_ne!(a, c);
    }

    #[test]
    fn intersection_carries_unshared_fields() {
        let mut a = set(doc! { "x": { "$gt": 1 } });
        let b = set(doc! { "x": { "$lt": 9 }, "y": 5 });
        a &= &b;
        assert_eq!(a.range("x").min(), &Bson::Int32(1));
        assert_eq!(a.range("x").max(), &Bson::Int32(9));
        assert!(a.range("y").equality());
    }

    #[test]
    fn subtraction_covered_in_all_dimensions_empties() {
        let mut a = set(doc! { "x": { "$gt": 2, "$lt": 4 } });
        let b = set(doc! { "x": { "$gt": 1, "$lt": 9 } });
        a -= &b;
        assert!(!a.match_possible());
    }

    #[test]
    fn subtraction_along_one_dimension() {
        let mut a = set(doc! { "x": { "$lt": 10 } });
        let b = set(doc! { "x": { "$lt": 5 } });
        a -= &b;
        let x = a.range("x");
        assert_eq!(x.min(), &Bson::Int32(5));
        assert!(x.min_inclusive());
        assert_eq!(x.max(), &Bson::Int32(10));
        assert!(!x.max_inclusive());
    }

    #[test]
    fn subtraction_with_two_uncovered_dimensions_is_identity() {
        let mut a = set(doc! { "x": { "$lt": 10 }, "y": { "$lt": 10 } });
        let before = a.clone();
        let b = set(doc! { "x": { "$lt": 5 }, "y": { "$lt": 5 } });
        a -= &b;
        assert_eq!(a.range("x"), before.range("x"));
        assert_eq!(a.range("y"), before.range("y"));
    }

    #[test]
    fn subtraction_bails_when_other_constrains_more_fields() {
        let mut a = set(doc! { "x": { "$lt": 10 } });
        let before = a.clone();
        let b = set(doc! { "x": { "$lt": 5 }, "y": 1 });
        a -= &b;
        assert_eq!(a.range("x"), before.range("x"));
    }

    #[test]
    fn subset_keeps_only_named_nontrivial_fields() {
        let s = set(doc! { "a": 1, "b": { "$gt": 2 }, "c": { "$exists": true } });
        let sub = s.subset(&doc! { "a": 1, "c": 1 });
        assert!(sub.has_range("a"));
        assert!(!sub.has_range("b"));
        assert!(!sub.has_range("c"));
    }

    #[test]
    fn index_bounds_expands_in_prefixes() {
        let s = set(doc! { "a": { "$in": [1, 2] }, "b": { "$gt": 5, "$lt": 9 } });
        let bounds = s.index_bounds(&doc! { "a": 1, "b": 1 }, 1).unwrap();
        assert_eq!(bounds.len(), 2);
        assert_eq!(bounds[0].0, vec![Bson::Int32(1), Bson::Int32(5)]);
        assert_eq!(bounds[0].1, vec![Bson::Int32(1), Bson::Int32(9)]);
        assert_eq!(bounds[1].0, vec![Bson::Int32(2), Bson::Int32(5)]);
    }

    #[test]
    fn index_bounds_after_inequality_uses_extremes() {
        let s = set(doc! { "a": { "$gt": 1 }, "b": { "$in": [1, 2] } });
        let bounds = s.index_bounds(&doc! { "a": 1, "b": 1 }, 1).unwrap();
        // the inequality on `a` stops prefix expansion; `b` contributes
        // its overall min/max only
        assert_eq!(bounds.len(), 1);
        assert_eq!(bounds[0].0, vec![Bson::Int32(1), Bson::Int32(1)]);
        assert_eq!(bounds[0].1, vec![Bson::MaxKey, Bson::Int32(2)]);
    }

    #[test]
    fn index_bounds_reverse_direction() {
        let s = set(doc! { "a": { "$gte": 1, "$lte": 3 } });
        let bounds = s.index_bounds(&doc! { "a": 1 }, -1).unwrap();
        assert_eq!(bounds.len(), 1);
        assert_eq!(bounds[0].0, vec![Bson::Int32(3)]);
        assert_eq!(bounds[0].1, vec![Bson::Int32(1)]);
    }

    #[test]
    fn index_bounds_on_unsatisfiable_set_is_empty() {
        let s = set(doc! { "a": { "$gt": 10, "$lt": 5 } });
        assert!(s.index_bounds(&doc! { "a": 1 }, 1).unwrap().is_empty());
    }

    #[test]
    fn special_range_is_reported() {
        let s = set(doc! { "loc": { "$near": [1, 2] } });
        assert_eq!(s.get_special(), Some("2d"));
    }

    #[test]
    fn bare_regex_value_behaves_like_regex_operator() {
        let s = set(doc! { "s": Bson::RegularExpression(bson::Regex {
            pattern: "^bar".to_string(),
            options: String::new(),
        }) });
        let r = s.range("s");
        assert_eq!(r.min(), &Bson::String("bar".into()));
        assert_eq!(r.max(), &Bson::String("bas".into()));
    }
}
