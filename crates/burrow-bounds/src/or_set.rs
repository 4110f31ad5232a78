use std::collections::VecDeque;

use bson::{Bson, Document};

use crate::error::BoundsError;
use crate::index_spec::IndexSpec;
use crate::set::FieldRangeSet;

/// Clause queue for a top-level `$or`.
///
/// Each disjunct is planned and scanned independently; after a clause
/// finishes, its index-projected region is subtracted from the remaining
/// clauses so later scans skip keys already visited. Two parallel queues
/// are kept: the refined bounds actually scanned, and the untouched
/// originals — looser, but made of fewer intervals and cheaper to combine.
#[derive(Debug, Clone)]
pub struct FieldRangeOrSet {
    base_set: FieldRangeSet,
    or_sets: VecDeque<FieldRangeSet>,
    original_or_sets: VecDeque<FieldRangeSet>,
    or_found: bool,
}

impl FieldRangeOrSet {
    pub fn new(ns: &str, query: &Document) -> Result<Self, BoundsError> {
        let base_set = FieldRangeSet::new(ns, query);
        let mut or_sets = VecDeque::new();
        let mut original_or_sets = VecDeque::new();
        let mut or_found = false;
        for (key, value) in query {
            if key != "$or" {
                continue;
            }
            let clauses = match value {
                Bson::Array(clauses) if !clauses.is_empty() => clauses,
                _ => return Err(BoundsError::OrRequiresNonEmptyArray),
            };
            for clause in clauses {
                let Bson::Document(doc) = clause else {
                    return Err(BoundsError::OrClauseNotDocument);
                };
                let frs = FieldRangeSet::new(ns, doc);
                if frs.get_special().is_some() {
                    return Err(BoundsError::OrClauseSpecial);
                }
                or_sets.push_back(frs.clone());
                original_or_sets.push_back(frs);
            }
            or_found = true;
        }
        Ok(Self { base_set, or_sets, original_or_sets, or_found })
    }

    /// True iff a `$or` was present and every clause has been popped.
    pub fn or_finished(&self) -> bool {
        self.or_found && self.or_sets.is_empty()
    }

    pub fn more_or_clauses(&self) -> bool {
        !self.or_sets.is_empty()
    }

    /// Bounds for the current clause: the conjunction outside the `$or`
    /// intersected with the clause's refined ranges.
    pub fn top_frs(&self) -> FieldRangeSet {
        let mut ret = self.base_set.clone();
        if let Some(front) = self.or_sets.front() {
            ret &= front;
        }
        ret
    }

    /// Like [`top_frs`](Self::top_frs) but with the clause's original,
    /// unrefined ranges.
    pub fn top_frs_original(&self) -> FieldRangeSet {
        let mut ret = self.base_set.clone();
        if let Some(front) = self.original_or_sets.front() {
            ret &= front;
        }
        ret
    }

    /// Finish the current clause. When an index spec is given, the
    /// clause's ranges projected onto that index are subtracted from every
    /// remaining clause (conservatively — see `FieldRangeSet::sub_assign`),
    /// and clauses that become unsatisfiable are dropped.
    pub fn pop_or_clause(&mut self, index_spec: Option<&IndexSpec>) -> Result<(), BoundsError> {
        let Some(finished) = self.original_or_sets.front() else {
            return Err(BoundsError::NoOrClauseToPop);
        };
        let to_diff = match index_spec {
            Some(spec) if finished.match_possible() => finished.subset(spec.key_pattern()),
            _ => finished.clone(),
        };
        let mut k = 1;
        while k < self.or_sets.len() {
            self.or_sets[k] -= &to_diff;
            if self.or_sets[k].match_possible() {
                k += 1;
            } else {
                self.or_sets.remove(k);
                self.original_or_sets.remove(k);
            }
        }
        self.or_sets.pop_front();
        self.original_or_sets.pop_front();
        Ok(())
    }

    /// Simplified queries of the remaining satisfiable clauses.
    pub fn all_clauses_simplified(&self) -> Vec<Document> {
        self.or_sets
            .iter()
            .filter(|frs| frs.match_possible())
            .map(|frs| frs.simplified_query(None))
            .collect()
    }

    pub fn get_special(&self) -> Option<&str> {
        self.base_set.get_special()
    }
}
