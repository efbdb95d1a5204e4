//! Response flattening
//!
//! Turns an arbitrarily nested Solr JSON response into an ordered map of
//! delimiter-joined key paths to scalar leaves. Object keys keep their
//! declaration order (`serde_json` is built with `preserve_order`), array
//! elements are addressed by their zero-based index.
//!
//! ```text
//! {"status":{"core1":{"numDocs":42}}}   --(".")-->   status.core1.numDocs = 42
//! ```

use std::borrow::Cow;
use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

/// Maximum nesting depth followed before a subtree is abandoned
pub const MAX_DEPTH: usize = 128;

/// Ordered, unique mapping of flattened key path to scalar leaf
///
/// Leaves are borrowed from the response tree, so a `FlatMap` never outlives
/// the response it was built from.
#[derive(Debug, Clone, Default)]
pub struct FlatMap<'a> {
    entries: Vec<(String, &'a Value)>,
    index: HashMap<String, usize>,
}

impl<'a> FlatMap<'a> {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, keeping the first value seen for a key
    ///
    /// Returns `false` when the key was already present.
    pub fn insert(&mut self, key: String, value: &'a Value) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        true
    }

    /// Look up a leaf by its full key path
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.index.get(key).map(|&i| self.entries[i].1)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in traversal order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &'a Value)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Iterate keys in traversal order
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

/// Flatten a response tree into a [`FlatMap`]
///
/// A scalar at the top level produces a single entry with the empty key.
/// Empty objects and arrays produce nothing. Subtrees deeper than
/// [`MAX_DEPTH`] are skipped with a warning while their siblings are still
/// flattened.
pub fn flatten<'a>(node: &'a Value, delimiter: &str) -> FlatMap<'a> {
    let mut flat = FlatMap::new();
    let mut path: Vec<Cow<'a, str>> = Vec::new();
    walk(node, delimiter, &mut path, &mut flat);
    flat
}

fn walk<'a>(node: &'a Value, delimiter: &str, path: &mut Vec<Cow<'a, str>>, out: &mut FlatMap<'a>) {
    match node {
        Value::Object(_) | Value::Array(_) if path.len() >= MAX_DEPTH => {
            warn!(
                depth = path.len(),
                prefix = %path[..8.min(path.len())].join(delimiter),
                "Response nested too deeply, skipping subtree"
            );
        }
        Value::Object(map) => {
            for (key, child) in map {
                path.push(Cow::Borrowed(key.as_str()));
                walk(child, delimiter, path, out);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                path.push(Cow::Owned(i.to_string()));
                walk(child, delimiter, path, out);
                path.pop();
            }
        }
        scalar => {
            let key = path.join(delimiter);
            if !out.insert(key, scalar) {
                debug!(key = %path.join(delimiter), "Duplicate flattened key, keeping first value");
            }
        }
    }
}
