use std::collections::BTreeMap;

use bson::Document;

use crate::compare::number_or_zero;

/// The kind of bound a query places on one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PatternType {
    Equality,
    LowerBound,
    UpperBound,
    UpperAndLowerBound,
}

/// Shape fingerprint of a query: per-field bound kinds plus a normalized
/// sort. Two queries with equal patterns are planned the same way, so the
/// pattern serves as the plan-cache key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct QueryPattern {
    field_types: BTreeMap<String, PatternType>,
    sort: Vec<(String, i32)>,
}

impl QueryPattern {
    pub(crate) fn new(field_types: BTreeMap<String, PatternType>, sort: &Document) -> Self {
        Self { field_types, sort: normalize_sort(sort) }
    }

    pub fn field_type(&self, field: &str) -> Option<PatternType> {
        self.field_types.get(field).copied()
    }
}

/// Canonicalize a sort spec so that a sort and its exact reverse produce
/// the same pattern: flip every direction by the sign that makes the first
/// component negative.
fn normalize_sort(spec: &Document) -> Vec<(String, i32)> {
    let mut iter = spec.iter();
    let Some((_, first)) = iter.next() else {
        return Vec::new();
    };
    let flip = if number_or_zero(first) >= 0.0 { 1 } else { -1 };
    spec.iter()
        .map(|(name, value)| {
            let dir = if number_or_zero(value) >= 0.0 { -1 } else { 1 };
            (name.clone(), flip * dir)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn empty_sort_normalizes_to_nothing() {
        assert!(normalize_sort(&doc! {}).is_empty());
    }

    #[test]
    fn sort_and_its_reverse_normalize_identically() {
        let forward = normalize_sort(&doc! { "a": 1, "b": -1 });
        let backward = normalize_sort(&doc! { "a": -1, "b": 1 });
        assert_eq!(forward, backward);
        assert_eq!(forward[0], ("a".to_string(), -1));
        assert_eq!(forward[1], ("b".to_string(), 1));
    }

    #[test]
    fn differing_sort_shapes_differ() {
        assert_ne!(
            normalize_sort(&doc! { "a": 1, "b": 1 }),
            normalize_sort(&doc! { "a": 1, "b": -1 })
        );
    }
}
