//! Namespace name normalisation and the namespace manifest

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-z0-9.\-]+").unwrap();
}

/// Lower-case `name` and collapse each run of characters outside
/// `[a-z0-9.-]` into a single `-`.
pub fn sanitize(name: &str) -> String {
    let lowered = name.to_lowercase();
    INVALID_NAME_CHARS.replace_all(&lowered, "-").into_owned()
}

/// Manifest applied to make sure `namespace` exists.
pub fn namespace_manifest(namespace: &str) -> String {
    format!("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: {namespace}\n")
}
