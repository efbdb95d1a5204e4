//! Metric and label name sanitization
//!
//! Solr keys contain dots, slashes, dashes and spaces (`QUERY./select`,
//! `G1-Young-Generation`, `soft autocommits`). Everything that ends up in a
//! metric name goes through [`sanitize`] first.

/// Sanitize a raw string into an exposition-safe metric name
///
/// Every character outside `[a-zA-Z0-9:_]` becomes `_`, runs of `_` are
/// collapsed into one, and leading/trailing `_` are removed.
/// The function is idempotent.
///
/// # Example
///
/// ```ignore
/// use rsolr_exporter::transformer::sanitize;
///
/// assert_eq!(sanitize("solr.jvm/memory..heap"), "solr_jvm_memory_heap");
/// ```
pub fn sanitize(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut last_underscore = true;

    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == ':' {
            result.push(c);
            last_underscore = false;
        } else if !last_underscore {
            result.push('_');
            last_underscore = true;
        }
    }

    while result.ends_with('_') {
        result.pop();
    }

    result
}

/// Check that a label name is usable in the exposition format
///
/// Label names must match `[a-zA-Z_][a-zA-Z0-9_]*` and must not start
/// with the reserved `__` prefix.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    !name.starts_with("__") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
