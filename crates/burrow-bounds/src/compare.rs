//! Total ordering over BSON values, field names excluded.
//!
//! Cross-type comparison follows the canonical type ranks used by index key
//! ordering: `MinKey < Null < Number < String < Object < Array < Binary <
//! ObjectId < Boolean < Date < Timestamp < Regex < MaxKey`. Within the
//! numeric class, Int32/Int64/Double compare by mathematical value; NaN is
//! equal to itself and below every other number.

use std::cmp::Ordering;

use bson::Bson;

/// Canonical rank of a value's type. Values of different ranks never
/// interleave in index order.
fn type_rank(value: &Bson) -> i32 {
    match value {
        Bson::MinKey => 0,
        Bson::Undefined => 3,
        Bson::Null => 5,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 10,
        Bson::String(_) | Bson::Symbol(_) => 15,
        Bson::Document(_) => 20,
        Bson::Array(_) => 25,
        Bson::Binary(_) => 30,
        Bson::ObjectId(_) => 35,
        Bson::Boolean(_) => 40,
        Bson::DateTime(_) => 45,
        Bson::Timestamp(_) => 47,
        Bson::RegularExpression(_) => 50,
        Bson::DbPointer(_) => 55,
        Bson::JavaScriptCode(_) => 60,
        Bson::JavaScriptCodeWithScope(_) => 65,
        Bson::MaxKey => 127,
    }
}

/// Compare two values under the total cross-type order.
pub fn canonical_cmp(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Bson::MinKey, Bson::MinKey)
        | (Bson::MaxKey, Bson::MaxKey)
        | (Bson::Null, Bson::Null)
        | (Bson::Undefined, Bson::Undefined) => Ordering::Equal,
        (Bson::Int32(x), Bson::Int32(y)) => x.cmp(y),
        (Bson::Int64(x), Bson::Int64(y)) => x.cmp(y),
        (Bson::Int32(x), Bson::Int64(y)) => (*x as i64).cmp(y),
        (Bson::Int64(x), Bson::Int32(y)) => x.cmp(&(*y as i64)),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::String(x), Bson::String(y)) => x.as_str().cmp(y.as_str()),
        (Bson::Symbol(x), Bson::String(y)) => x.as_str().cmp(y.as_str()),
        (Bson::String(x), Bson::Symbol(y)) => x.as_str().cmp(y.as_str()),
        (Bson::Symbol(x), Bson::Symbol(y)) => x.as_str().cmp(y.as_str()),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            x.timestamp_millis().cmp(&y.timestamp_millis())
        }
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            x.time.cmp(&y.time).then(x.increment.cmp(&y.increment))
        }
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Binary(x), Bson::Binary(y)) => x
            .bytes
            .len()
            .cmp(&y.bytes.len())
            .then_with(|| u8::from(x.subtype).cmp(&u8::from(y.subtype)))
            .then_with(|| x.bytes.cmp(&y.bytes)),
        (Bson::RegularExpression(x), Bson::RegularExpression(y)) => x
            .pattern
            .as_str()
            .cmp(y.pattern.as_str())
            .then_with(|| x.options.as_str().cmp(y.options.as_str())),
        (Bson::Document(x), Bson::Document(y)) => {
            let mut xi = x.iter();
            let mut yi = y.iter();
            loop {
                match (xi.next(), yi.next()) {
                    (None, None) => return Ordering::Equal,
                    (None, Some(_)) => return Ordering::Less,
                    (Some(_), None) => return Ordering::Greater,
                    (Some((xk, xv)), Some((yk, yv))) => {
                        let cmp = type_rank(xv)
                            .cmp(&type_rank(yv))
                            .then_with(|| xk.as_str().cmp(yk.as_str()))
                            .then_with(|| canonical_cmp(xv, yv));
                        if cmp != Ordering::Equal {
                            return cmp;
                        }
                    }
                }
            }
        }
        (Bson::Array(x), Bson::Array(y)) => {
            for (xv, yv) in x.iter().zip(y.iter()) {
                let cmp = canonical_cmp(xv, yv);
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::JavaScriptCode(x), Bson::JavaScriptCode(y)) => x.as_str().cmp(y.as_str()),
        (Bson::JavaScriptCodeWithScope(x), Bson::JavaScriptCodeWithScope(y)) => {
            x.code.as_str().cmp(y.code.as_str())
        }
        // Remaining same-rank pairs are numeric cross-type comparisons.
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => cmp_numbers(x, y),
            _ => Ordering::Equal,
        },
    }
}

/// Numeric comparison mirroring the document model's convention: NaN equals
/// NaN and sorts below every other number.
fn cmp_numbers(a: f64, b: f64) -> Ordering {
    if a.is_nan() {
        return if b.is_nan() { Ordering::Equal } else { Ordering::Less };
    }
    if b.is_nan() {
        return Ordering::Greater;
    }
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        Bson::Decimal128(v) => Some(v.to_string().parse::<f64>().unwrap_or(f64::NAN)),
        _ => None,
    }
}

/// Numeric value of a key-pattern element; non-numeric (e.g. `"2d"`) reads
/// as zero, which downstream treats as forward.
pub(crate) fn number_or_zero(value: &Bson) -> f64 {
    as_f64(value).unwrap_or(0.0)
}
