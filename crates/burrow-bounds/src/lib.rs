mod compare;
mod error;
mod index_spec;
mod interval;
mod or_set;
mod pattern;
mod range;
mod regex_prefix;
mod set;
mod vector;

pub use bson::{Bson, Document};
pub use compare::canonical_cmp;
pub use error::BoundsError;
pub use index_spec::IndexSpec;
pub use interval::{FieldBound, FieldInterval};
pub use or_set::FieldRangeOrSet;
pub use pattern::{PatternType, QueryPattern};
pub use range::{FieldRange, QueryOp};
pub use regex_prefix::{simple_regex, simple_regex_end};
pub use set::{BoundList, FieldRangeSet, IndexKey};
pub use vector::{Advance, Cursor, FieldRangeVector};
