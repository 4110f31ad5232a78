use std::cmp::Ordering;

use bson::{Bson, Document};
use burrow_bounds::{Advance, FieldRangeVector, canonical_cmp};

/// Compare two composite keys in traversal order: per-field canonical
/// comparison, reversed for fields scanned against their index direction.
pub fn traversal_cmp(a: &[Bson], b: &[Bson], v: &FieldRangeVector) -> Ordering {
    for (i, (_, forward)) in v.fields().iter().enumerate() {
        let mut cmp = canonical_cmp(&a[i], &b[i]);
        if !forward {
            cmp = cmp.reverse();
        }
        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    Ordering::Equal
}

/// True iff `key` is at or past the seek target under the hint's
/// inclusivity flags (or strictly past it when `after` is set).
fn passes(key: &[Bson], target: &[Bson], inc: &[bool], after: bool, v: &FieldRangeVector) -> bool {
    for (i, (_, forward)) in v.fields().iter().enumerate() {
        let mut cmp = canonical_cmp(&key[i], &target[i]);
        if !forward {
            cmp = cmp.reverse();
        }
        match cmp {
            Ordering::Greater => return true,
            Ordering::Less => return false,
            Ordering::Equal => {
                if !after && !inc[i] {
                    return false;
                }
            }
        }
    }
    !after
}

/// Walk a simulated sorted index with the cursor-skip protocol and return
/// the keys the scanner yields, in visit order.
///
/// This is the storage engine's side of the contract: seek to `start_key`,
/// then follow each [`Advance`] hint — step on `Next`, jump on `Seek`,
/// stop on `Done`.
pub fn drive_scan(v: &FieldRangeVector, keys: &[Vec<Bson>]) -> Vec<Vec<Bson>> {
    if v.size() == 0 {
        return Vec::new();
    }
    let mut sorted = keys.to_vec();
    sorted.sort_by(|a, b| traversal_cmp(a, b, v));

    let mut cursor = v.cursor();
    cursor.prep_dive();
    assert!(cursor.ok());

    let start = v.start_key();
    let mut pos = sorted.partition_point(|k| traversal_cmp(k, &start, v) == Ordering::Less);
    let mut visited = Vec::new();
    let mut rounds = 0;
    while pos < sorted.len() {
        rounds += 1;
        assert!(rounds < 100_000, "scan failed to terminate");
        match cursor.advance(&sorted[pos]) {
            Advance::Done => break,
            Advance::Next => {
                visited.push(sorted[pos].clone());
                pos += 1;
            }
            Advance::Seek(r) => {
                let target: Vec<Bson> = sorted[pos][..r]
                    .iter()
                    .cloned()
                    .chain(
                        cursor.cmp()[r..]
                            .iter()
                            .map(|c| c.expect("seek hint left cmp unset").clone()),
                    )
                    .collect();
                let inc = cursor.inc().to_vec();
                let after = cursor.after();
                let mut next_pos = pos;
                while next_pos < sorted.len()
                    && !passes(&sorted[next_pos], &target, &inc, after, v)
                {
                    next_pos += 1;
                }
                assert!(next_pos > pos, "skip hint did not advance the scan");
                pos = next_pos;
            }
        }
    }
    visited
}

/// Build the document whose index keys are exactly `key` for the vector's
/// (non-dotted) key fields.
pub fn key_doc(v: &FieldRangeVector, key: &[Bson]) -> Document {
    let mut doc = Document::new();
    for (i, (name, _)) in v.fields().iter().enumerate() {
        doc.insert(name.clone(), key[i].clone());
    }
    doc
}

/// Every composite key from the cross product of per-field values.
pub fn key_grid(fields: &[Vec<i32>]) -> Vec<Vec<Bson>> {
    let mut keys: Vec<Vec<Bson>> = vec![Vec::new()];
    for values in fields {
        let mut next = Vec::with_capacity(keys.len() * values.len());
        for key in &keys {
            for value in values {
                let mut k = key.clone();
                k.push(Bson::Int32(*value));
                next.push(k);
            }
        }
        keys = next;
    }
    keys
}
