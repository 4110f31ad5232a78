use bson::{Bson, Document};

use crate::compare::number_or_zero;

/// Description of one index: its key pattern plus catalog flags. Bound
/// derivation only consumes the key pattern; the flags ride along for the
/// executor.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    key_pattern: Document,
    name: String,
    unique: bool,
    sparse: bool,
}

impl IndexSpec {
    pub fn new(key_pattern: Document) -> Self {
        let name = default_name(&key_pattern);
        Self { key_pattern, name, unique: false, sparse: false }
    }

    /// Read a catalog index description: `{keyPattern: {...}, name, unique,
    /// sparse, ...}`. Unknown flags are ignored.
    pub fn from_document(spec: &Document) -> Self {
        let key_pattern = match spec.get("keyPattern").or_else(|| spec.get("key")) {
            Some(Bson::Document(d)) => d.clone(),
            _ => Document::new(),
        };
        let name = spec
            .get_str("name")
            .map(str::to_string)
            .unwrap_or_else(|_| default_name(&key_pattern));
        Self {
            key_pattern,
            name,
            unique: spec.get_bool("unique").unwrap_or(false),
            sparse: spec.get_bool("sparse").unwrap_or(false),
        }
    }

    pub fn key_pattern(&self) -> &Document {
        &self.key_pattern
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique(&self) -> bool {
        self.unique
    }

    pub fn sparse(&self) -> bool {
        self.sparse
    }

    /// Key fields in index order with their direction sign (+1 or −1).
    pub fn fields(&self) -> impl Iterator<Item = (&str, i32)> {
        self.key_pattern.iter().map(|(name, value)| {
            let dir = if number_or_zero(value) >= 0.0 { 1 } else { -1 };
            (name.as_str(), dir)
        })
    }
}

fn default_name(key_pattern: &Document) -> String {
    let mut parts = Vec::with_capacity(key_pattern.len());
    for (name, value) in key_pattern {
        let dir = if number_or_zero(value) >= 0.0 { 1 } else { -1 };
        parts.push(format!("{name}_{dir}"));
    }
    parts.join("_")
}
